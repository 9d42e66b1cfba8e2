//! Request handlers.

pub mod health;
pub mod merge;
pub mod music;

pub use health::*;
pub use merge::*;
pub use music::*;
