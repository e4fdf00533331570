//! Normalization of free-form engine run statuses.
//!
//! The engine reports run statuses as free-form strings with case and
//! separator variants (`awaiting-review`, `AWAITING_REVIEW`, ...). The
//! lock never matches raw strings: everything is lower-cased with `-`
//! collapsed to `_`, then classified into a closed vocabulary. Unknown
//! inputs classify as still-in-progress and drive no transition.

/// Closed classification of a normalized run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Run finished, successfully or not; the lock collapses to idle.
    Terminal,
    /// Produced changes await an apply/discard decision.
    AwaitingReview,
    /// Run is executing or queued to execute.
    Running,
    /// Unrecognized; hold the current lock state steady.
    Unknown,
}

const TERMINAL_STATUSES: &[&str] = &[
    "completed",
    "done",
    "applied",
    "failed",
    "error",
    "canceled",
    "cancelled",
    "discarded",
    "terminated",
];

const RUNNING_STATUSES: &[&str] = &["running", "executing", "doing", "queued", "starting"];

/// Lower-case and collapse `-` to `_`.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', "_")
}

/// Classify a raw engine status into the lock's vocabulary.
pub fn classify(raw: &str) -> StatusClass {
    let status = normalize(raw);

    if TERMINAL_STATUSES.contains(&status.as_str()) {
        StatusClass::Terminal
    } else if status.contains("awaiting_review") {
        StatusClass::AwaitingReview
    } else if RUNNING_STATUSES.contains(&status.as_str()) {
        StatusClass::Running
    } else {
        StatusClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_collapses_separators() {
        assert_eq!(normalize("AWAITING-REVIEW"), "awaiting_review");
        assert_eq!(normalize("Awaiting_Review"), "awaiting_review");
        assert_eq!(normalize("  running "), "running");
    }

    #[test]
    fn test_terminal_statuses_classify_terminal() {
        for s in &[
            "completed",
            "Done",
            "APPLIED",
            "failed",
            "error",
            "canceled",
            "cancelled",
            "DISCARDED",
            "terminated",
        ] {
            assert_eq!(classify(s), StatusClass::Terminal, "status: {}", s);
        }
    }

    #[test]
    fn test_awaiting_review_variants() {
        assert_eq!(classify("awaiting-review"), StatusClass::AwaitingReview);
        assert_eq!(classify("AWAITING_REVIEW"), StatusClass::AwaitingReview);
        // Token containment is enough
        assert_eq!(
            classify("run_awaiting_review_2"),
            StatusClass::AwaitingReview
        );
    }

    #[test]
    fn test_running_family() {
        for s in &["running", "Executing", "doing", "QUEUED", "starting"] {
            assert_eq!(classify(s), StatusClass::Running, "status: {}", s);
        }
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        assert_eq!(classify("paused"), StatusClass::Unknown);
        assert_eq!(classify(""), StatusClass::Unknown);
        assert_eq!(classify("warming-up"), StatusClass::Unknown);
    }

    #[test]
    fn test_classification_ignores_case_and_separators() {
        assert_eq!(classify("Can-Celled"), StatusClass::Unknown);
        assert_eq!(classify("CANCELLED"), StatusClass::Terminal);
    }
}
