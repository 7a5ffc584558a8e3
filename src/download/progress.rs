// src/download/progress.rs

/// Rate limiter for progress callbacks.
///
/// A report is due once at least `interval` bytes have arrived since the
/// previous one, where `interval = max(total / 100, min_interval)`. Unlike a
/// `downloaded % interval == 0` test, this never skips reports when the chunk
/// size does not divide the interval.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: u64,
    last_reported: u64,
}

impl ProgressThrottle {
    /// `start` is the byte offset already on disk (non-zero when resuming).
    pub fn new(total: u64, min_interval: u64, start: u64) -> Self {
        Self {
            interval: (total / 100).max(min_interval).max(1),
            last_reported: start,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Returns true (and records the report) if `downloaded` warrants one.
    pub fn should_report(&mut self, downloaded: u64) -> bool {
        if downloaded.saturating_sub(self.last_reported) >= self.interval {
            self.last_reported = downloaded;
            true
        } else {
            false
        }
    }

    /// Returns true if `downloaded` has not been reported yet.
    pub fn finish(&mut self, downloaded: u64) -> bool {
        if downloaded != self.last_reported {
            self.last_reported = downloaded;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn small_files_use_the_minimum_interval() {
        let throttle = ProgressThrottle::new(10 * MIB, MIB, 0);
        assert_eq!(throttle.interval(), MIB);
    }

    #[test]
    fn large_files_report_every_percent() {
        let throttle = ProgressThrottle::new(1000 * MIB, MIB, 0);
        assert_eq!(throttle.interval(), 10 * MIB);
    }

    #[test]
    fn uneven_chunks_still_report() {
        // 3000-byte chunks never land on a multiple of 1 MiB exactly.
        let mut throttle = ProgressThrottle::new(0, MIB, 0);
        let mut reports = 0;
        let mut downloaded = 0;
        while downloaded < 4 * MIB {
            downloaded += 3000;
            if throttle.should_report(downloaded) {
                reports += 1;
            }
        }
        assert_eq!(reports, 4);
    }

    #[test]
    fn resume_offset_counts_as_reported() {
        let mut throttle = ProgressThrottle::new(0, MIB, 5 * MIB);
        assert!(!throttle.should_report(5 * MIB + 10));
        assert!(throttle.should_report(6 * MIB));
    }

    #[test]
    fn finish_reports_only_unreported_tail() {
        let mut throttle = ProgressThrottle::new(0, MIB, 0);
        assert!(throttle.should_report(MIB));
        assert!(!throttle.finish(MIB));
        assert!(throttle.finish(MIB + 1));
    }
}
