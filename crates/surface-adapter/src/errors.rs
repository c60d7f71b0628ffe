//! Error types for the surface adapter.

use thiserror::Error;

/// Failure talking to or acting on a browsing surface.
///
/// Display strings double as classification signatures: the workflow-level
/// retry classifier matches on substrings of these messages, so the wording
/// of the transient variants is load-bearing.
#[derive(Debug, Error, Clone)]
pub enum SurfaceError {
    /// The surface was closed before the named operation.
    #[error("surface closed before: {0}")]
    Closed(String),

    /// The execution context behind the surface was torn down, typically by
    /// an unexpected navigation.
    #[error("execution context was destroyed before: {0}")]
    ContextLost(String),

    /// Navigation did not reach the requested readiness in time.
    #[error("navigation timeout after {0} ms")]
    NavigationTimeout(u64),

    /// A required element never appeared.
    #[error("element not found: '{selector}' within {waited_ms} ms")]
    SelectorTimeout { selector: String, waited_ms: u64 },

    /// The browser process could not be started.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// CDP-level failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Screenshot or PDF rendering failed.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A failure whose message is passed through verbatim. The message is
    /// what the retry classifier sees, nothing is prepended.
    #[error("{0}")]
    Other(String),
}

impl SurfaceError {
    pub(crate) fn protocol(err: impl ToString) -> Self {
        SurfaceError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_messages_carry_signatures() {
        let err = SurfaceError::ContextLost("type character 'a'".into());
        assert!(err
            .to_string()
            .contains("execution context was destroyed"));

        let err = SurfaceError::SelectorTimeout {
            selector: "#CpfSocio".into(),
            waited_ms: 10_000,
        };
        assert!(err.to_string().contains("element not found"));

        let err = SurfaceError::NavigationTimeout(120_000);
        assert!(err.to_string().to_lowercase().contains("navigation timeout"));
    }
}
