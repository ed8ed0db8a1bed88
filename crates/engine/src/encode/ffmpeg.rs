//! ffmpeg-backed encoder.
//!
//! Progress is read from ffmpeg's `-progress pipe:1` key/value stream and
//! turned into a percentage against the duration reported by ffprobe.

use super::{EncodeError, EncodeRequest, Encoder};
use crate::config::EncodeConfig;
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Number of trailing stderr lines kept as failure detail.
const STDERR_TAIL_LINES: usize = 5;

/// Containers that get `+faststart` metadata placement.
const FASTSTART_EXTENSIONS: [&str; 2] = ["mp4", "m4a"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Build an ffmpeg command for one request.
///
/// Layout: `-y -i <src>`, video codec (or `-vn`), audio codec (or `-an`),
/// `-pix_fmt` when video is kept, `-movflags +faststart` for mp4/m4a, the
/// progress flags when `track_progress` is set, then the destination.
pub fn build_ffmpeg_command(program: &Path, request: &EncodeRequest, track_progress: bool) -> Command {
    let settings = &request.settings;
    let mut cmd = Command::new(program);

    cmd.arg("-hide_banner").arg("-nostdin");
    cmd.arg("-loglevel").arg("error");
    cmd.arg("-y").arg("-i").arg(&request.source);

    match settings.effective_video_codec() {
        Some(codec) => {
            cmd.arg("-c:v").arg(codec);
            if !settings.pixel_format.is_empty() {
                cmd.arg("-pix_fmt").arg(&settings.pixel_format);
            }
        }
        None => {
            cmd.arg("-vn");
        }
    }

    match &settings.audio_codec {
        Some(codec) => {
            cmd.arg("-c:a").arg(codec);
        }
        None => {
            cmd.arg("-an");
        }
    }

    let faststart = request
        .destination
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FASTSTART_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if faststart {
        cmd.arg("-movflags").arg("+faststart");
    }

    if track_progress {
        cmd.arg("-progress").arg("pipe:1").arg("-nostats");
    }

    cmd.arg(&request.destination);
    cmd
}

/// Percentage encoded from one `-progress` line, if the line carries one.
///
/// `total_us` is the media duration in microseconds. `progress=end` maps to
/// 100. Values are clamped to `[0, 100]`; ffmpeg may report a negative start
/// time or overshoot the probed duration.
pub fn parse_progress_line(line: &str, total_us: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is microseconds too, despite the name.
        "out_time_us" | "out_time_ms" => {
            if total_us <= 0.0 {
                return None;
            }
            let us: f64 = value.trim().parse().ok()?;
            Some((us / total_us * 100.0).clamp(0.0, 100.0))
        }
        "progress" if value.trim() == "end" => Some(100.0),
        _ => None,
    }
}

/// Duration from `ffprobe -of json` output.
pub fn parse_probe_duration(json: &str) -> Option<Duration> {
    let probe: ProbeOutput = serde_json::from_str(json).ok()?;
    let secs: f64 = probe.format?.duration?.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Ask ffprobe for the media duration of `source`.
///
/// Any failure is [`EncodeError::ProgressUnavailable`]: without a duration
/// there is nothing to measure progress against.
pub fn probe_duration(ffprobe: &Path, source: &Path) -> Result<Duration, EncodeError> {
    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("json")
        .arg(source)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            EncodeError::ProgressUnavailable(format!(
                "failed to run {}: {}",
                ffprobe.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(EncodeError::ProgressUnavailable(format!(
            "{} exited with {}: {}",
            ffprobe.display(),
            output.status,
            summarize_stderr(&output.stderr)
        )));
    }

    parse_probe_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        EncodeError::ProgressUnavailable(format!("no duration reported for {}", source.display()))
    })
}

/// Last few non-empty stderr lines, joined into one.
fn summarize_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return "no diagnostic output".to_string();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Drain a reader, keeping only the trailing lines.
fn read_tail<R: Read>(reader: R) -> String {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail.into_iter().collect::<Vec<_>>().join(" | ")
    }
}

fn check_status(program: &str, status: ExitStatus, detail: String) -> Result<(), EncodeError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(EncodeError::Failed {
            program: program.to_string(),
            code,
            detail,
        }),
        None => Err(EncodeError::Terminated(program.to_string())),
    }
}

/// Encoder that shells out to ffmpeg and ffprobe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(cfg: &EncodeConfig) -> Self {
        Self::new(&cfg.ffmpeg_path, &cfg.ffprobe_path)
    }


    fn program_name(&self) -> String {
        self.ffmpeg.display().to_string()
    }

    fn spawn_error(&self, source: std::io::Error) -> EncodeError {
        EncodeError::Spawn {
            program: self.program_name(),
            source,
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode_with_progress(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError> {
        let duration = probe_duration(&self.ffprobe, &request.source)?;
        let total_us = duration.as_micros() as f64;
        debug!(file = %request.source.display(), ?duration, "probed duration");

        let mut cmd = build_ffmpeg_command(&self.ffmpeg, request, true);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        // stderr is drained on its own thread so a chatty encoder cannot fill
        // the pipe while we block on stdout.
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || read_tail(stderr)));

        let read_result = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout)
                .lines()
                .try_for_each(|line| {
                    if let Some(percent) = parse_progress_line(&line?, total_us) {
                        on_progress(percent);
                    }
                    Ok::<(), std::io::Error>(())
                })
                .map_err(EncodeError::from),
            None => Err(EncodeError::ProgressUnavailable(
                "progress pipe was not captured".to_string(),
            )),
        };

        if read_result.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let detail = stderr_tail
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        read_result?;
        check_status(&self.program_name(), status, detail)
    }

    fn encode_direct(&self, request: &EncodeRequest) -> Result<(), EncodeError> {
        let mut cmd = build_ffmpeg_command(&self.ffmpeg, request, false);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let output = cmd.output().map_err(|e| self.spawn_error(e))?;
        check_status(
            &self.program_name(),
            output.status,
            summarize_stderr(&output.stderr),
        )
    }
}
