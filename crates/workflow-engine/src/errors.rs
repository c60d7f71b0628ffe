//! Workflow error taxonomy.
//!
//! Display strings are classification input: the retry decision is a
//! substring match over the rendered message (see [`crate::classify`]), so
//! each variant's wording decides whether the outer loop tries again.

use surface_adapter::SurfaceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// The resolver exhausted its full window without activating the target.
    #[error("element not found: '{target}' after {waited_ms} ms")]
    ElementNotFound { target: String, waited_ms: u64 },

    /// A dropdown had no option containing the wanted label.
    #[error("element not found: option containing '{label}' in '{select}'")]
    OptionNotFound { select: String, label: String },

    /// A required confirmation never reached its validated visual state.
    #[error("{0} was not validated")]
    Validation(String),

    /// The anti-bot guard exhausted every degradation path.
    #[error("interstitial blocked the {0} surface")]
    InterstitialBlocked(String),

    /// The dynamically spawned form surface never stabilized.
    #[error("form surface did not stabilize after {attempts} attempts: {last}")]
    FormAcquisition { attempts: u32, last: SurfaceError },

    /// An attempt died in a way the engine did not anticipate.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_expose_signatures() {
        let err = WorkflowError::ElementNotFound {
            target: "Enviar".into(),
            waited_ms: 5000,
        };
        assert!(err.to_string().contains("element not found"));

        let err = WorkflowError::Validation("property sequential number".into());
        assert_eq!(
            err.to_string(),
            "property sequential number was not validated"
        );

        let err = WorkflowError::FormAcquisition {
            attempts: 5,
            last: SurfaceError::SelectorTimeout {
                selector: "#drpListaMucinicpios".into(),
                waited_ms: 5000,
            },
        };
        assert!(err.to_string().contains("element not found"));
    }
}
