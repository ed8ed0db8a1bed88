//! Encoder capability.
//!
//! The orchestration core only sees the [`Encoder`] trait: a source, a
//! destination and settings go in; a stream of percentage signals and a
//! terminal result come out. [`ffmpeg::FfmpegEncoder`] is the production
//! implementation.

pub mod ffmpeg;

#[cfg(test)]
pub mod fake;

use crate::classify::MediaCategory;
use crate::config::EncodeConfig;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use ffmpeg::{build_ffmpeg_command, parse_progress_line, probe_duration, FfmpegEncoder};

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder binary could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder exited with non-zero status
    #[error("{program} failed with exit code {code}: {detail}")]
    Failed {
        program: String,
        code: i32,
        detail: String,
    },

    /// The encoder was terminated by a signal
    #[error("{0} process was terminated by signal")]
    Terminated(String),

    /// Live progress could not be obtained for this file
    #[error("Progress unavailable: {0}")]
    ProgressUnavailable(String),

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hardware acceleration mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HwAccel {
    /// Let the encoder pick; software codec names are used unchanged.
    #[default]
    Auto,
    /// Software encoding only.
    Disabled,
    /// A named hardware API, e.g. `nvenc`, `vaapi`, `qsv`.
    Api(String),
}

impl FromStr for HwAccel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Ok(match s.as_str() {
            "" | "auto" => HwAccel::Auto,
            "none" | "off" | "software" => HwAccel::Disabled,
            _ => HwAccel::Api(s),
        })
    }
}

impl std::fmt::Display for HwAccel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HwAccel::Auto => f.write_str("auto"),
            HwAccel::Disabled => f.write_str("none"),
            HwAccel::Api(api) => f.write_str(api),
        }
    }
}

/// Target codecs and format for one encode.
///
/// `None` for a codec strips that stream from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub hwaccel: HwAccel,
    pub pixel_format: String,
}

impl EncodeSettings {
    pub fn from_config(cfg: &EncodeConfig) -> Self {
        Self {
            video_codec: parse_codec(&cfg.video_codec),
            audio_codec: parse_codec(&cfg.audio_codec),
            hwaccel: cfg.hwaccel.parse().unwrap_or_default(),
            pixel_format: cfg.pixel_format.trim().to_string(),
        }
    }

    /// Settings narrowed to what a category needs.
    ///
    /// Audio tasks never carry a video stream.
    pub fn for_category(&self, category: MediaCategory) -> Self {
        let mut settings = self.clone();
        if category == MediaCategory::Audio {
            settings.video_codec = None;
        }
        settings
    }

    /// Video codec as passed to the encoder, with the hardware API suffix.
    ///
    /// `h264` with `nvenc` becomes `h264_nvenc`. A codec that already names
    /// the API is left alone.
    pub fn effective_video_codec(&self) -> Option<String> {
        let codec = self.video_codec.as_deref()?;
        match &self.hwaccel {
            HwAccel::Api(api) if !codec.ends_with(&format!("_{}", api)) => {
                Some(format!("{}_{}", codec, api))
            }
            _ => Some(codec.to_string()),
        }
    }
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::from_config(&EncodeConfig::default())
    }
}

/// `"none"` or an empty string disables a stream.
fn parse_codec(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

/// One encode invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub settings: EncodeSettings,
}

/// External transcoding capability.
///
/// Implementations block for the duration of one encode. They are called from
/// worker threads, never from the async runtime.
pub trait Encoder: Send + Sync {
    /// Encode while streaming progress.
    ///
    /// `on_progress` receives raw percentages as the encoder reports them:
    /// possibly regressing, possibly never reaching 100. An error here means
    /// either progress could not be tracked or the encode itself failed; the
    /// caller cannot tell which and falls back to [`Encoder::encode_direct`].
    fn encode_with_progress(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError>;

    /// Encode with no live progress.
    fn encode_direct(&self, request: &EncodeRequest) -> Result<(), EncodeError>;
}
