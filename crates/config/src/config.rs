//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Configuration parsed but is not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Run-level behaviour: parallelism, overwrite policy, copy pass, error log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Maximum concurrent encode jobs (0 = auto-derive)
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Re-encode even when the planned output already exists
    #[serde(default)]
    pub overwrite: bool,
    /// Mirror non-media files into the output tree
    #[serde(default)]
    pub copy_files: bool,
    /// Append-only per-file failure log
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
}

fn default_max_workers() -> u32 {
    2
}

fn default_error_log() -> PathBuf {
    PathBuf::from("mediabatch-errors.txt")
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            overwrite: false,
            copy_files: false,
            error_log: default_error_log(),
        }
    }
}

/// Encoder settings shared by every task of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    /// Target video codec ("none" strips the video stream)
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Target audio codec ("none" strips the audio stream)
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Hardware API suffix: auto, none, or an API name such as nvenc
    #[serde(default = "default_hwaccel")]
    pub hwaccel: String,
    /// Pixel format applied whenever a video stream is kept
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

fn default_video_codec() -> String {
    "h264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_hwaccel() -> String {
    "auto".to_string()
}

fn default_pixel_format() -> String {
    "yuv420p10le".to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            hwaccel: default_hwaccel(),
            pixel_format: default_pixel_format(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

/// Extension tables used by the classifier (no leading dot, any case)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionsConfig {
    #[serde(default = "default_video_extensions")]
    pub video: Vec<String>,
    #[serde(default = "default_audio_extensions")]
    pub audio: Vec<String>,
}

fn default_video_extensions() -> Vec<String> {
    [
        "mp4", "mkv", "avi", "mov", "m4v", "webm", "flv", "wmv", "ts", "m2ts", "mts", "mpg",
        "mpeg", "3gp", "vob", "ogv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_audio_extensions() -> Vec<String> {
    [
        "mp3", "wav", "flac", "aac", "m4a", "ogg", "oga", "opus", "wma", "aiff", "aif", "alac",
        "ape", "ac3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            video: default_video_extensions(),
            audio: default_audio_extensions(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

/// Lowercase an extension and strip any leading dots.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - MEDIABATCH_MAX_WORKERS -> run.max_workers
    /// - MEDIABATCH_OVERWRITE -> run.overwrite
    /// - MEDIABATCH_COPY_FILES -> run.copy_files
    /// - MEDIABATCH_ERROR_LOG -> run.error_log
    /// - MEDIABATCH_VIDEO_CODEC -> encode.video_codec
    /// - MEDIABATCH_AUDIO_CODEC -> encode.audio_codec
    /// - MEDIABATCH_HWACCEL -> encode.hwaccel
    /// - MEDIABATCH_PIXEL_FORMAT -> encode.pixel_format
    /// - MEDIABATCH_FFMPEG -> encode.ffmpeg_path
    /// - MEDIABATCH_FFPROBE -> encode.ffprobe_path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIABATCH_MAX_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.run.max_workers = workers;
            }
        }

        if let Some(overwrite) = env::var("MEDIABATCH_OVERWRITE").ok().and_then(|v| parse_bool(&v)) {
            self.run.overwrite = overwrite;
        }

        if let Some(copy) = env::var("MEDIABATCH_COPY_FILES").ok().and_then(|v| parse_bool(&v)) {
            self.run.copy_files = copy;
        }

        if let Ok(val) = env::var("MEDIABATCH_ERROR_LOG") {
            if !val.is_empty() {
                self.run.error_log = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_VIDEO_CODEC") {
            self.encode.video_codec = val;
        }

        if let Ok(val) = env::var("MEDIABATCH_AUDIO_CODEC") {
            self.encode.audio_codec = val;
        }

        if let Ok(val) = env::var("MEDIABATCH_HWACCEL") {
            self.encode.hwaccel = val;
        }

        if let Ok(val) = env::var("MEDIABATCH_PIXEL_FORMAT") {
            self.encode.pixel_format = val;
        }

        if let Ok(val) = env::var("MEDIABATCH_FFMPEG") {
            if !val.is_empty() {
                self.encode.ffmpeg_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_FFPROBE") {
            if !val.is_empty() {
                self.encode.ffprobe_path = PathBuf::from(val);
            }
        }
    }

    /// Check invariants the classifier relies on
    ///
    /// The video and audio extension sets must be disjoint and contain no
    /// empty entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let video: Vec<String> = self
            .extensions
            .video
            .iter()
            .map(|e| normalize_extension(e))
            .collect();

        for ext in self.extensions.audio.iter().chain(&self.extensions.video) {
            if normalize_extension(ext).is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty extension entry {:?}",
                    ext
                )));
            }
        }

        if let Some(shared) = self
            .extensions
            .audio
            .iter()
            .map(|e| normalize_extension(e))
            .find(|e| video.contains(e))
        {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' is listed as both video and audio",
                shared
            )));
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
