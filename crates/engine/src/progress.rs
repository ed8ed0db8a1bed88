//! Per-task progress display.
//!
//! Encoder signals are raw percentages that may regress or repeat. The
//! [`ProgressTracker`] only ever moves forward by the non-negative delta, and
//! the [`ProgressReporter`] mirrors that onto an indicatif bar inside a shared
//! [`MultiProgress`]. Tasks that never produce a signal get a started/finished
//! log line instead of a bar.

use indicatif::{HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{error, info};

const BAR_TEMPLATE: &str =
    "{prefix} {bar:30.cyan/blue} {pos:>3}% [{elapsed_precise} < {eta_precise}] {msg}";

/// Final state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Succeeded,
    Skipped,
    Failed,
}

/// Displayed progress for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    /// Last displayed percentage, 0..=100, never decreasing.
    pub percent: u64,
    pub last_updated: Instant,
    pub terminal: Option<TerminalState>,
}

/// Clamps a raw signal stream into a monotonic display value.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: ProgressState,
    signals: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: ProgressState {
                percent: 0,
                last_updated: Instant::now(),
                terminal: None,
            },
            signals: 0,
        }
    }

    /// Apply one raw signal and return the delta added to the display.
    ///
    /// Regressions, repeats, non-finite values and signals after a terminal
    /// state add nothing.
    pub fn apply(&mut self, signal: f64) -> u64 {
        if self.state.terminal.is_some() || !signal.is_finite() {
            return 0;
        }
        self.signals += 1;
        let target = signal.clamp(0.0, 100.0) as u64;
        let delta = target.saturating_sub(self.state.percent);
        if delta > 0 {
            self.state.percent += delta;
            self.state.last_updated = Instant::now();
        }
        delta
    }

    pub fn percent(&self) -> u64 {
        self.state.percent
    }

    /// Whether any usable signal has arrived.
    pub fn has_signal(&self) -> bool {
        self.signals > 0
    }

    /// Enter a terminal state. The first call wins.
    pub fn finish(&mut self, terminal: TerminalState) {
        if self.state.terminal.is_none() {
            self.state.terminal = Some(terminal);
            self.state.last_updated = Instant::now();
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the terminal's progress area.
#[derive(Clone)]
pub struct ProgressHub {
    multi: MultiProgress,
    show_bars: bool,
}

impl ProgressHub {
    /// Draw bars into `multi`.
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            show_bars: true,
        }
    }

    /// Log lines only, no bars.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            show_bars: false,
        }
    }

    /// Start reporting a task labelled `label`.
    pub fn start(&self, label: impl Into<String>) -> ProgressReporter {
        let label = label.into();
        info!(file = %label, "started");
        ProgressReporter {
            label,
            hub: self.clone(),
            bar: None,
            tracker: ProgressTracker::new(),
            started: Instant::now(),
            live: true,
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

/// Progress for one running task. Owned by the worker running it.
pub struct ProgressReporter {
    label: String,
    hub: ProgressHub,
    bar: Option<ProgressBar>,
    tracker: ProgressTracker,
    started: Instant,
    live: bool,
}

impl ProgressReporter {
    /// Feed one raw signal from the encoder.
    pub fn update(&mut self, signal: f64) {
        if !self.live {
            return;
        }
        let delta = self.tracker.apply(signal);
        if !self.hub.show_bars {
            return;
        }
        // The bar appears with the first signal, so files without progress
        // never show an empty bar.
        if self.bar.is_none() {
            self.bar = Some(
                self.hub.multi.add(
                    ProgressBar::new(100)
                        .with_style(bar_style())
                        .with_prefix(self.label.clone())
                        .with_elapsed(self.started.elapsed()),
                ),
            );
        }
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    /// Drop live progress; later signals are ignored.
    pub fn fall_back(&mut self) {
        self.live = false;
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            self.hub.multi.remove(&bar);
        }
    }

    /// Displayed percentage.
    pub fn percent(&self) -> u64 {
        self.tracker.percent()
    }

    pub fn bar_position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }

    /// Settle into the final state and return the task's elapsed time.
    ///
    /// A failed task's bar stays at its last real position.
    pub fn finish(mut self, terminal: TerminalState) -> Duration {
        self.tracker.finish(terminal);
        let elapsed = self.started.elapsed();
        match terminal {
            TerminalState::Failed => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon_with_message("failed");
                }
                error!(
                    file = %self.label,
                    percent = self.tracker.percent(),
                    elapsed = %HumanDuration(elapsed),
                    "failed"
                );
            }
            TerminalState::Succeeded | TerminalState::Skipped => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                    self.hub.multi.remove(&bar);
                }
                info!(file = %self.label, elapsed = %HumanDuration(elapsed), "finished");
            }
        }
        elapsed
    }

    pub fn state(&self) -> &ProgressState {
        self.tracker.state()
    }
}

impl Drop for ProgressReporter {
    // Reached with a bar still attached only when the worker unwinds.
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon_with_message("aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn offscreen_hub() -> ProgressHub {
        ProgressHub::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    #[test]
    fn test_regressions_are_clamped() {
        let mut tracker = ProgressTracker::new();
        let displayed: Vec<u64> = [10.0, 5.0, 40.0, 38.0, 100.0]
            .iter()
            .map(|s| {
                tracker.apply(*s);
                tracker.percent()
            })
            .collect();
        assert_eq!(displayed, vec![10, 10, 40, 40, 100]);
    }

    #[test]
    fn test_out_of_range_and_nan_signals() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.apply(f64::NAN), 0);
        assert!(!tracker.has_signal());
        assert_eq!(tracker.apply(-20.0), 0);
        assert_eq!(tracker.apply(250.0), 100);
        assert_eq!(tracker.percent(), 100);
    }

    #[test]
    fn test_terminal_state_freezes_progress() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(30.0);
        tracker.finish(TerminalState::Failed);
        tracker.finish(TerminalState::Succeeded);
        assert_eq!(tracker.apply(90.0), 0);
        assert_eq!(tracker.percent(), 30);
        assert_eq!(tracker.state().terminal, Some(TerminalState::Failed));
    }

    #[test]
    fn test_bar_follows_clamped_display() {
        let hub = offscreen_hub();
        let mut reporter = hub.start("a/clip.mkv");
        assert_eq!(reporter.bar_position(), None);

        for signal in [10.0, 5.0, 40.0, 38.0] {
            reporter.update(signal);
        }
        assert_eq!(reporter.bar_position(), Some(40));
        assert_eq!(reporter.percent(), 40);
    }

    #[test]
    fn test_fall_back_ignores_later_signals() {
        let hub = offscreen_hub();
        let mut reporter = hub.start("clip.mkv");
        reporter.update(20.0);
        reporter.fall_back();
        reporter.update(80.0);
        assert_eq!(reporter.bar_position(), None);
        assert_eq!(reporter.percent(), 20);
    }

    #[test]
    fn test_hidden_hub_has_no_bars() {
        let hub = ProgressHub::hidden();
        let mut reporter = hub.start("song.flac");
        reporter.update(50.0);
        assert_eq!(reporter.bar_position(), None);
        assert_eq!(reporter.percent(), 50);
        reporter.finish(TerminalState::Succeeded);
    }

    #[test]
    fn test_failed_task_does_not_show_complete() {
        let hub = offscreen_hub();
        let mut reporter = hub.start("clip.mkv");
        reporter.update(35.0);
        let bar = reporter.bar.clone().unwrap();
        reporter.finish(TerminalState::Failed);
        assert_eq!(bar.position(), 35);
        assert!(bar.is_finished());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_display_is_monotonic(signals in proptest::collection::vec(-50.0f64..150.0, 0..40)) {
            let mut tracker = ProgressTracker::new();
            let mut last = 0u64;
            let mut total_delta = 0u64;
            for signal in signals {
                total_delta += tracker.apply(signal);
                prop_assert!(tracker.percent() >= last);
                prop_assert!(tracker.percent() <= 100);
                last = tracker.percent();
            }
            prop_assert_eq!(total_delta, tracker.percent());
        }
    }
}
