//! Retryable-versus-fatal classification.
//!
//! A case-insensitive substring match against known-transient failure
//! signatures. Anything unrecognized aborts the outer retry loop: an unknown
//! error most likely means the remote workflow changed shape, and repeating
//! the attempt would only mask that.

use crate::errors::WorkflowError;

/// Known-transient failure signatures, matched case-insensitively.
const RETRYABLE_SIGNATURES: &[&str] = &[
    "execution context was destroyed",
    "surface closed",
    "navigation timeout",
    "net::err_internet_disconnected",
    "net::err_connection_reset",
    "net::err_connection_refused",
    "protocol error",
    "target closed",
    "session closed",
    "connection closed",
    "page crashed",
    "browser launch failed",
    "interstitial blocked",
    "element not found",
    "was not validated",
];

/// Whether the outer loop should try the workflow again after this failure.
pub fn is_retryable(error: &WorkflowError) -> bool {
    let message = error.to_string().to_lowercase();
    RETRYABLE_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_adapter::SurfaceError;

    fn other(message: &str) -> WorkflowError {
        WorkflowError::Surface(SurfaceError::Other(message.to_string()))
    }

    #[test]
    fn transient_infrastructure_is_retryable() {
        for message in [
            "Execution context was destroyed",
            "Navigation timeout of 120000 ms exceeded",
            "net::ERR_CONNECTION_RESET",
            "Protocol error (Runtime.evaluate): Target closed",
            "Session closed. Most likely the page has been closed.",
            "Page crashed!",
        ] {
            assert!(is_retryable(&other(message)), "{message} should retry");
        }
    }

    #[test]
    fn engine_level_failures_are_retryable() {
        assert!(is_retryable(&WorkflowError::ElementNotFound {
            target: "Avançar".into(),
            waited_ms: 10_000,
        }));
        assert!(is_retryable(&WorkflowError::Validation(
            "property sequential number".into()
        )));
        assert!(is_retryable(&WorkflowError::InterstitialBlocked(
            "map".into()
        )));
        assert!(is_retryable(&WorkflowError::Surface(SurfaceError::Launch(
            "spawn: chromium not found".into()
        ))));
    }

    #[test]
    fn unknown_errors_are_fatal() {
        assert!(!is_retryable(&other("the option layout changed")));
        assert!(!is_retryable(&WorkflowError::Internal(
            "attempt panicked".into()
        )));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_retryable(&other("TARGET CLOSED")));
        assert!(is_retryable(&other("Cloudflare: INTERSTITIAL BLOCKED the map surface")));
    }
}
