//! CLI entry point for mediabatch
//!
//! Parses command line arguments, layers them over the configuration file and
//! environment, and runs one batch.

mod banner;
mod logging;

use clap::Parser;
use indicatif::{HumanDuration, MultiProgress};
use mediabatch::{Batch, Config, ProgressHub, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

/// mediabatch - encode a tree of video and audio files with ffmpeg
#[derive(Parser, Debug)]
#[command(name = "mediabatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input directory or single file
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (default: encoded_<input> beside the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Video codec, or "none" to drop video
    #[arg(long = "codec-video", value_name = "CODEC")]
    codec_video: Option<String>,

    /// Audio codec, or "none" to drop audio
    #[arg(long = "codec-audio", value_name = "CODEC")]
    codec_audio: Option<String>,

    /// Hardware acceleration: auto, none, or an API such as nvenc, vaapi, qsv
    #[arg(long, value_name = "API")]
    hwaccel: Option<String>,

    /// Pixel format for video streams
    #[arg(long, value_name = "FORMAT")]
    pixel_format: Option<String>,

    /// Maximum parallel encodes (0 = derive from CPU count)
    #[arg(short = 'j', long)]
    workers: Option<u32>,

    /// Re-encode files whose output already exists
    #[arg(long)]
    overwrite: bool,

    /// Copy non-media files into the output tree
    #[arg(long)]
    copy_files: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to append per-file failures
    #[arg(long, value_name = "FILE")]
    error_log: Option<PathBuf>,

    /// Skip startup checks (ffmpeg availability)
    #[arg(long)]
    skip_checks: bool,

    /// Log lines only, no progress bars
    #[arg(long)]
    no_progress: bool,

    /// Do not print the banner
    #[arg(long)]
    no_banner: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags override file and environment settings.
    fn apply(&self, config: &mut Config) {
        if let Some(codec) = &self.codec_video {
            config.encode.video_codec = codec.clone();
        }
        if let Some(codec) = &self.codec_audio {
            config.encode.audio_codec = codec.clone();
        }
        if let Some(hwaccel) = &self.hwaccel {
            config.encode.hwaccel = hwaccel.clone();
        }
        if let Some(format) = &self.pixel_format {
            config.encode.pixel_format = format.clone();
        }
        if let Some(workers) = self.workers {
            config.run.max_workers = workers;
        }
        if self.overwrite {
            config.run.overwrite = true;
        }
        if self.copy_files {
            config.run.copy_files = true;
        }
        if let Some(log) = &self.error_log {
            config.run.error_log = log.clone();
        }
    }

    fn load_config(&self) -> Result<Config, mediabatch::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::from_env()?,
        };
        self.apply(&mut config);
        Ok(config)
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Done in {}: {} encoded or copied, {} skipped, {} failed ({} files)",
        HumanDuration(summary.elapsed),
        summary.succeeded(),
        summary.skipped(),
        summary.failed(),
        summary.total()
    );
    println!("Output: {}", summary.output_root.display());
    if summary.has_failures() {
        println!("Failures logged to {}", summary.error_log.display());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let multi = MultiProgress::new();
    logging::init(&multi, args.verbose);

    if !args.no_banner {
        eprintln!("{}", banner::render(env!("CARGO_PKG_VERSION")));
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let progress = if args.no_progress {
        ProgressHub::hidden()
    } else {
        ProgressHub::new(multi.clone())
    };

    let batch_result = if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Batch::new_without_checks(config, progress)
    } else {
        Batch::new(config, progress)
    };

    let batch = match batch_result {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("Failed to initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match batch.run(&args.input, args.output.as_deref()).await {
        Ok(summary) => {
            let _ = multi.clear();
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
