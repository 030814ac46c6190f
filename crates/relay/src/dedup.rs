use std::collections::HashMap;
use std::time::{Duration, Instant};

use codetrack_core::domain::{Platform, Submission, SubmissionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    platform: Platform,
    problem: String,
    language: String,
    status: SubmissionStatus,
}

impl Fingerprint {
    fn of(submission: &Submission) -> Self {
        Self {
            platform: submission.platform,
            problem: submission.problem_key().to_string(),
            language: submission.language.to_ascii_lowercase(),
            status: submission.status,
        }
    }
}

/// Drops repeat reports of the same verdict seen within `window`.
#[derive(Debug)]
pub struct DuplicateFilter {
    window: Duration,
    seen: HashMap<Fingerprint, Instant>,
}

impl DuplicateFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records `submission` and reports whether it is new at `now`.
    ///
    /// A duplicate does not extend the window of the original report.
    pub fn admit(&mut self, submission: &Submission, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);

        let fingerprint = Fingerprint::of(submission);
        if self.seen.contains_key(&fingerprint) {
            return false;
        }
        self.seen.insert(fingerprint, now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}
