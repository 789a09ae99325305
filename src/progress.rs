use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Timestamped stderr log shared by the pipeline stages.
#[derive(Clone, Debug)]
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit("", msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit("[warn] ", msg.as_ref());
    }

    /// Logs a finished stage with its wall-clock duration in milliseconds.
    pub fn timed(&self, label: &str, elapsed: Duration) {
        self.emit("", &format!("{label} in {}ms", elapsed.as_millis()));
    }

    fn emit(&self, level: &str, msg: &str) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {level}{msg}");
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
