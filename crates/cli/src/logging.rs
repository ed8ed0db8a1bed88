//! Console logging that does not tear progress bars.

use indicatif::MultiProgress;
use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// `MakeWriter` that prints each event while the progress bars are hidden.
#[derive(Clone)]
pub struct SuspendingWriter {
    multi: MultiProgress,
}

impl SuspendingWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

/// Buffers one formatted event and flushes it to stderr on drop.
pub struct SuspendedLine {
    multi: MultiProgress,
    buf: Vec<u8>,
}

impl Write for SuspendedLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SuspendedLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let buf = std::mem::take(&mut self.buf);
        self.multi.suspend(|| {
            let _ = io::stderr().write_all(&buf);
        });
    }
}

impl<'a> MakeWriter<'a> for SuspendingWriter {
    type Writer = SuspendedLine;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedLine {
            multi: self.multi.clone(),
            buf: Vec::new(),
        }
    }
}

/// Filter from `RUST_LOG`, defaulting to `info`; `verbose` forces debug for
/// this program's crates.
pub fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("mediabatch=debug,mediabatch_cli=debug,info");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(multi: &MultiProgress, verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .with_writer(SuspendingWriter::new(multi.clone()))
        .init();
}
