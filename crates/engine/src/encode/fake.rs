//! Scripted encoder for tests.
//!
//! Each source file name maps to a [`Script`]: the progress signals to replay
//! and the outcome of the tracked and direct phases. Successful phases write
//! the destination file so skip and idempotence checks see real outputs.

use super::{EncodeError, EncodeRequest, Encoder};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeOutcome {
    Succeed,
    Fail,
    Unavailable,
    Panic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub signals: Vec<f64>,
    pub tracked: FakeOutcome,
    pub direct: FakeOutcome,
}

impl Script {
    pub fn succeed(signals: Vec<f64>) -> Self {
        Self {
            signals,
            tracked: FakeOutcome::Succeed,
            direct: FakeOutcome::Succeed,
        }
    }

    pub fn fail() -> Self {
        Self {
            signals: vec![10.0],
            tracked: FakeOutcome::Fail,
            direct: FakeOutcome::Fail,
        }
    }

    /// Progress is unavailable; the direct run succeeds.
    pub fn no_progress() -> Self {
        Self {
            signals: Vec::new(),
            tracked: FakeOutcome::Unavailable,
            direct: FakeOutcome::Succeed,
        }
    }

    pub fn panic() -> Self {
        Self {
            signals: Vec::new(),
            tracked: FakeOutcome::Panic,
            direct: FakeOutcome::Panic,
        }
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::succeed(vec![25.0, 50.0, 100.0])
    }
}

#[derive(Debug, Default)]
pub struct FakeEncoder {
    scripts: HashMap<String, Script>,
    tracked_calls: AtomicUsize,
    direct_calls: AtomicUsize,
    encoded: Mutex<Vec<PathBuf>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the file whose name is `file_name`; others use [`Script::default`].
    pub fn with_script(mut self, file_name: &str, script: Script) -> Self {
        self.scripts.insert(file_name.to_string(), script);
        self
    }

    /// Hold each encode for `delay` so concurrent runs overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of encodes observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn tracked_calls(&self) -> usize {
        self.tracked_calls.load(Ordering::SeqCst)
    }

    pub fn direct_calls(&self) -> usize {
        self.direct_calls.load(Ordering::SeqCst)
    }

    /// Total encoder invocations across both phases.
    pub fn invocations(&self) -> usize {
        self.tracked_calls() + self.direct_calls()
    }

    /// Sources that were encoded successfully.
    pub fn encoded(&self) -> Vec<PathBuf> {
        self.encoded
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    fn script_for(&self, request: &EncodeRequest) -> Script {
        request
            .source
            .file_name()
            .and_then(|name| self.scripts.get(&*name.to_string_lossy()))
            .cloned()
            .unwrap_or_default()
    }

    fn finish(&self, request: &EncodeRequest, outcome: &FakeOutcome) -> Result<(), EncodeError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            FakeOutcome::Succeed => {
                fs::write(
                    &request.destination,
                    format!("encoded {}", request.source.display()),
                )?;
                if let Ok(mut list) = self.encoded.lock() {
                    list.push(request.source.clone());
                }
                Ok(())
            }
            FakeOutcome::Fail => Err(EncodeError::Failed {
                program: "fake".to_string(),
                code: 1,
                detail: "scripted failure".to_string(),
            }),
            FakeOutcome::Unavailable => Err(EncodeError::ProgressUnavailable(
                "scripted".to_string(),
            )),
            FakeOutcome::Panic => panic!("scripted panic for {}", request.source.display()),
        }
    }
}

impl Encoder for FakeEncoder {
    fn encode_with_progress(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), EncodeError> {
        self.tracked_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(request);
        if script.tracked != FakeOutcome::Unavailable {
            for signal in &script.signals {
                on_progress(*signal);
            }
        }
        self.finish(request, &script.tracked)
    }

    fn encode_direct(&self, request: &EncodeRequest) -> Result<(), EncodeError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(request);
        self.finish(request, &script.direct)
    }
}
