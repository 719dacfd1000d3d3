//! Memory and timing checkpoints for the build
//!
//! - Memory: RSS (Resident Set Size) from /proc/self/status, 0 where unavailable
//! - Timing: `std::time::Instant`
//!
//! Checkpoints are emitted at debug level under the `memprof` target, so
//! `RUST_LOG=memprof=debug` shows them without the rest of the debug output.

use std::fs;
use std::time::Instant;

/// Current RSS in bytes
pub fn rss_bytes() -> u64 {
    let Ok(status) = fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        // Format: "VmRSS:    123456 kB"
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

pub fn rss_mb() -> f64 {
    rss_bytes() as f64 / (1024.0 * 1024.0)
}

/// Running profile of one build: start time, last section start and last RSS
#[derive(Debug, Clone)]
pub struct Profile {
    start: Instant,
    section: Instant,
    last_rss_mb: f64,
}

impl Profile {
    pub fn start(label: &str) -> Self {
        let rss = rss_mb();
        tracing::debug!(target: "memprof", "[{:.2} MB] {} ...", rss, label);
        let now = Instant::now();
        Profile {
            start: now,
            section: now,
            last_rss_mb: rss,
        }
    }

    /// Log RSS delta and section/total elapsed time, then start a new section
    pub fn checkpoint(&mut self, label: &str) {
        let rss = rss_mb();
        tracing::debug!(
            target: "memprof",
            "[{:.2} MB] (delta: {:+.2} MB) {} [+{:.3}s, total: {:.3}s]",
            rss,
            rss - self.last_rss_mb,
            label,
            self.section.elapsed().as_secs_f64(),
            self.start.elapsed().as_secs_f64()
        );
        self.last_rss_mb = rss;
        self.section = Instant::now();
    }

    pub fn total_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_advances() {
        let mut profile = Profile::start("test");
        let first = profile.section;
        profile.checkpoint("step");
        assert!(profile.section >= first);
        assert!(profile.total_secs() >= 0.0);
    }
}
