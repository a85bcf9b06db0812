use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const ENV_PROGRESS: &str = "BIDSFETCH_PROGRESS";

pub(crate) fn progress_enabled() -> bool {
    match env::var(ENV_PROGRESS) {
        Ok(value) => value != "0",
        Err(_) => io::stderr().is_terminal(),
    }
}

/// Single-line stderr spinner with an optional `[current/total]` counter.
///
/// Rendering happens on a helper thread so transfers never block on the
/// terminal. A disabled reporter is inert.
pub(crate) struct ProgressReporter {
    current: Arc<AtomicUsize>,
    stop: Option<Arc<AtomicBool>>,
    handle: Option<thread::JoinHandle<()>>,
    enabled: bool,
}

impl ProgressReporter {
    pub(crate) fn disabled() -> Self {
        Self {
            current: Arc::new(AtomicUsize::new(0)),
            stop: None,
            handle: None,
            enabled: false,
        }
    }

    pub(crate) fn spinner(label: impl Into<String>, wanted: bool) -> Self {
        Self::start(label, None, wanted)
    }

    pub(crate) fn bar(label: impl Into<String>, total: usize, wanted: bool) -> Self {
        if total == 0 {
            return Self::spinner(label, wanted);
        }
        Self::start(label, Some(total), wanted)
    }

    fn start(label: impl Into<String>, total: Option<usize>, wanted: bool) -> Self {
        if !wanted || !progress_enabled() {
            return Self::disabled();
        }

        let label = label.into();
        let stop = Arc::new(AtomicBool::new(false));
        let current = Arc::new(AtomicUsize::new(0));
        let thread_stop = Arc::clone(&stop);
        let thread_current = Arc::clone(&current);
        let handle = thread::spawn(move || {
            ProgressReporter::run(&label, total, &thread_current, &thread_stop);
        });

        Self {
            current,
            stop: Some(stop),
            handle: Some(handle),
            enabled: true,
        }
    }

    pub(crate) fn increment(&self) {
        if self.enabled {
            self.current.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Clears the line and prints `message` when the reporter was visible.
    pub(crate) fn finish(mut self, message: impl Into<String>) {
        if self.enabled {
            self.stop();
            eprintln!("bidsfetch ▸ {}", message.into());
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, AtomicOrdering::Relaxed);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if self.enabled {
            let _ = io::stderr().write_all(b"\r\x1b[2K");
            let _ = io::stderr().flush();
            self.enabled = false;
        }
    }

    fn run(label: &str, total: Option<usize>, current: &AtomicUsize, stop: &AtomicBool) {
        const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let mut idx = 0;
        while !stop.load(AtomicOrdering::Relaxed) {
            let frame = FRAMES[idx % FRAMES.len()];
            idx += 1;
            let line = if let Some(total) = total {
                let current = current.load(AtomicOrdering::Relaxed).min(total);
                format!("\r\x1b[2Kbidsfetch ▸ {label} [{current}/{total}] {frame}")
            } else {
                format!("\r\x1b[2Kbidsfetch ▸ {label} {frame}")
            };
            let _ = io::stderr().write_all(line.as_bytes());
            let _ = io::stderr().flush();
            thread::sleep(Duration::from_millis(80));
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_switch_disables_rendering() {
        env::set_var(ENV_PROGRESS, "0");
        assert!(!progress_enabled());
        let reporter = ProgressReporter::bar("Copying", 3, true);
        assert!(!reporter.enabled);
        reporter.increment();
        reporter.finish("done");
        env::remove_var(ENV_PROGRESS);
    }

    #[test]
    #[serial]
    fn unwanted_reporter_stays_inert() {
        env::set_var(ENV_PROGRESS, "1");
        let reporter = ProgressReporter::spinner("Listing", false);
        assert!(!reporter.enabled);
        assert!(reporter.handle.is_none());
        env::remove_var(ENV_PROGRESS);
    }
}
