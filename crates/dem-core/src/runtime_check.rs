//! Fail-soft runtime range checks
//!
//! Index violations are reported through the development error channel
//! (`tracing::error!`) and counted. Callers that want to react use the
//! `Result` returning [`RuntimeCheck::check_index`]; internal callers use
//! [`RuntimeCheck::index_or_default`], which substitutes index 0 so an
//! out-of-bounds access never reaches raw storage.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::error;

use crate::error::RangeError;

/// Violation counter shared by all bounded tables of one instance
#[derive(Debug, Default)]
pub struct RuntimeCheck {
    violations: AtomicU32,
}

impl RuntimeCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `index` against `len`
    pub fn check_index(
        &self,
        what: &'static str,
        index: usize,
        len: usize,
    ) -> Result<usize, RangeError> {
        if index < len {
            Ok(index)
        } else {
            let err = RangeError { what, index, len };
            self.report(err);
            Err(err)
        }
    }

    /// Validate `index`, substituting 0 on violation
    pub fn index_or_default(&self, what: &'static str, index: usize, len: usize) -> usize {
        self.check_index(what, index, len).unwrap_or(0)
    }

    /// Number of violations seen so far
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Record a violation detected outside [`Self::check_index`]
    pub fn report(&self, err: RangeError) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        error!(table = err.what, index = err.index, len = err.len, "Runtime check failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_passes_through() {
        let check = RuntimeCheck::new();
        assert_eq!(check.check_index("events", 3, 4), Ok(3));
        assert_eq!(check.index_or_default("events", 3, 4), 3);
        assert_eq!(check.violations(), 0);
    }

    #[test]
    fn test_violation_substitutes_zero() {
        let check = RuntimeCheck::new();
        assert_eq!(check.index_or_default("events", 4, 4), 0);
        assert_eq!(
            check.check_index("events", 9, 4),
            Err(RangeError {
                what: "events",
                index: 9,
                len: 4
            })
        );
        assert_eq!(check.violations(), 2);
    }
}
