//! Outbound integrations.

pub mod catalog;

pub use catalog::{CatalogClient, CatalogError, MusicTrack};
