//! Startup checks.
//!
//! Preflight checks run before any file is touched:
//! - ffmpeg must run (`ffmpeg -version`); its version is logged
//! - ffprobe is probed; without it every task falls back to direct runs
//! - configured encoders are looked up in `ffmpeg -encoders`

use crate::config::EncodeConfig;
use crate::encode::EncodeSettings;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{program} not available: {reason}")]
    EncoderUnavailable { program: String, reason: String },
}

/// Version reported by `ffmpeg -version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegVersion {
    /// Version token as printed, without an `n` prefix, e.g. `7.1.2` or `8.0-5-g1234567`.
    pub version: String,
    pub major: Option<u32>,
}

/// Parse the first `ffmpeg version ...` line.
///
/// Handles plain (`7.1.2`) and git-style `n`-prefixed (`n8.0-123-gabcdef`)
/// versions. Builds from a snapshot (`N-112345-g...`) have no major version.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<FfmpegVersion> {
    let line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?
        .to_lowercase();

    let token = line
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .trim_start_matches('n')
        .to_string();
    if token.is_empty() {
        return None;
    }

    let major = token
        .split(|c| c == '.' || c == '-')
        .next()
        .and_then(|s| s.parse().ok());

    Some(FfmpegVersion {
        version: token,
        major,
    })
}

/// Whether `codec` appears as an encoder name in `ffmpeg -encoders` output.
///
/// Encoder lines look like ` V....D libx264   libx264 H.264 ...`: a flags
/// column, then the name.
pub fn encoder_listed(encoders_output: &str, codec: &str) -> bool {
    encoders_output.lines().any(|line| {
        let mut fields = line.split_whitespace();
        matches!(
            (fields.next(), fields.next()),
            (Some(flags), Some(name)) if flags.len() == 6 && name == codec
        )
    })
}

/// Run `ffmpeg -version` and return the parsed version, if any.
pub fn check_ffmpeg_available(ffmpeg: &Path) -> Result<Option<FfmpegVersion>, StartupError> {
    let unavailable = |reason: String| StartupError::EncoderUnavailable {
        program: ffmpeg.display().to_string(),
        reason,
    };

    let output = Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| unavailable(format!("-version failed; is it installed and in PATH? Error: {}", e)))?;

    if !output.status.success() {
        return Err(unavailable(format!("-version exited with {}", output.status)));
    }

    Ok(parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout)))
}

/// Whether ffprobe runs. Missing ffprobe is not fatal.
pub fn check_ffprobe_available(ffprobe: &Path) -> bool {
    Command::new(ffprobe)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Warn about configured encoders ffmpeg does not list.
fn check_encoders(ffmpeg: &Path, settings: &EncodeSettings) {
    let Ok(output) = Command::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-encoders")
        .stdin(Stdio::null())
        .output()
    else {
        return;
    };
    let listing = String::from_utf8_lossy(&output.stdout);

    let codecs = [settings.effective_video_codec(), settings.audio_codec.clone()];
    for codec in codecs.iter().flatten() {
        if !encoder_listed(&listing, codec) {
            warn!(codec = %codec, "encoder not listed by ffmpeg -encoders; encodes may fail");
        }
    }
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. ffmpeg availability (fatal)
/// 2. ffprobe availability (warning)
/// 3. configured encoders (warning)
pub fn run_startup_checks(cfg: &EncodeConfig) -> Result<(), StartupError> {
    match check_ffmpeg_available(&cfg.ffmpeg_path)? {
        Some(version) => info!(version = %version.version, "ffmpeg found"),
        None => info!("ffmpeg found, version not recognised"),
    }

    if !check_ffprobe_available(&cfg.ffprobe_path) {
        warn!(
            ffprobe = %cfg.ffprobe_path.display(),
            "ffprobe not available; encodes will run without live progress"
        );
    }

    check_encoders(&cfg.ffmpeg_path, &EncodeSettings::from_config(cfg));
    Ok(())
}
