//! Page health monitoring.
//!
//! The primary defense against "ghost" interactions on a destroyed context:
//! called immediately before every text entry and before risky multi-step
//! sequences. A live, unchanged surface passes any number of consecutive
//! checks without side effects.

use tracing::debug;

use crate::errors::SurfaceError;
use crate::surface::Surface;

/// Fail with a descriptive error if the surface is closed or its execution
/// context no longer evaluates scripts.
pub async fn ensure_active(surface: &dyn Surface, operation: &str) -> Result<(), SurfaceError> {
    if surface.is_closed() {
        return Err(SurfaceError::Closed(operation.to_string()));
    }
    match surface.probe().await {
        Ok(()) => {
            debug!(operation, surface = %surface.id(), "surface healthy");
            Ok(())
        }
        Err(err) => {
            debug!(operation, error = %err, "surface probe failed");
            Err(SurfaceError::ContextLost(operation.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSurface;

    #[tokio::test]
    async fn healthy_surface_passes_twice() {
        let surface = MockSurface::lenient();
        assert!(ensure_active(&surface, "first check").await.is_ok());
        assert!(ensure_active(&surface, "second check").await.is_ok());
        // No observable side effect: nothing was clicked or typed.
        assert!(surface.recorded_clicks().is_empty());
        assert!(surface.typed_text().is_empty());
    }

    #[tokio::test]
    async fn closed_surface_is_reported() {
        let surface = MockSurface::lenient();
        surface.mark_closed();
        let err = ensure_active(&surface, "fill city").await.unwrap_err();
        assert!(err.to_string().contains("surface closed before: fill city"));
    }

    #[tokio::test]
    async fn dead_context_is_reported() {
        let surface = MockSurface::lenient();
        surface.poison("Execution context was destroyed");
        let err = ensure_active(&surface, "type character").await.unwrap_err();
        assert!(err
            .to_string()
            .contains("execution context was destroyed before: type character"));
    }
}
