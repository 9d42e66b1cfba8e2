//! Delivery encoding configuration.

use serde::{Deserialize, Serialize};

/// Default audio codec for the delivered file
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate for the delivered file
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Codec of the mixed-down scratch track (lossless, re-encoded once at mux time)
pub const MIX_AUDIO_CODEC: &str = "pcm_s16le";
/// Container of the mixed-down scratch track
pub const MIX_CONTAINER: &str = "wav";
/// Container of the delivered file
pub const DELIVERY_CONTAINER: &str = "mp4";

/// Encoding settings applied by the mux stage.
///
/// Video is always stream-copied; only the audio is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEncoding {
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Move the moov atom to the front for progressive playback
    #[serde(default = "default_faststart")]
    pub faststart: bool,
}

fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_faststart() -> bool {
    true
}

impl Default for DeliveryEncoding {
    fn default() -> Self {
        Self {
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            faststart: true,
        }
    }
}

impl DeliveryEncoding {
    /// Convert to FFmpeg output arguments for the audio stream.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];
        if self.faststart {
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }
        args
    }
}
