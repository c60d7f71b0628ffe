//! Element resolution strategies.
//!
//! Four strategies in fixed priority order:
//! 1. NativeText - the browser's own text search
//! 2. ExactText  - structural query for a node with exactly this text
//! 3. PartialText - structural query relaxed to substring containment
//! 4. Similarity - case-insensitive caption match over clickable elements

use surface_adapter::{Surface, SurfaceError};
use tracing::debug;

/// One independent technique for locating a UI target from free text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolutionStrategy {
    NativeText,
    ExactText,
    PartialText,
    Similarity,
}

impl ResolutionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionStrategy::NativeText => "native-text",
            ResolutionStrategy::ExactText => "exact-text",
            ResolutionStrategy::PartialText => "partial-text",
            ResolutionStrategy::Similarity => "similarity",
        }
    }

    /// The fixed priority order strategies are attempted in each round.
    pub fn fallback_chain() -> [ResolutionStrategy; 4] {
        [
            ResolutionStrategy::NativeText,
            ResolutionStrategy::ExactText,
            ResolutionStrategy::PartialText,
            ResolutionStrategy::Similarity,
        ]
    }

    /// Run this strategy once. `Ok(true)` means the target was activated.
    pub async fn attempt(
        &self,
        surface: &dyn Surface,
        target: &str,
    ) -> Result<bool, SurfaceError> {
        match self {
            ResolutionStrategy::NativeText => surface.click_text(target).await,
            ResolutionStrategy::ExactText => surface.click_exact_text(target).await,
            ResolutionStrategy::PartialText => surface.click_partial_text(target).await,
            ResolutionStrategy::Similarity => similarity_attempt(surface, target).await,
        }
    }
}

/// Clickable tags the similarity heuristic considers.
fn is_actionable_tag(tag: &str) -> bool {
    matches!(tag.to_ascii_uppercase().as_str(), "BUTTON" | "A" | "INPUT")
}

/// An element matches when its caption is a case-insensitive substring of
/// the target or vice versa; first match wins.
async fn similarity_attempt(surface: &dyn Surface, target: &str) -> Result<bool, SurfaceError> {
    let wanted = target.to_lowercase();
    let inventory = surface.clickable_inventory().await?;
    for (index, element) in inventory.iter().enumerate() {
        if !is_actionable_tag(&element.tag) {
            continue;
        }
        let caption = element.caption().to_lowercase();
        if caption.is_empty() {
            continue;
        }
        if caption.contains(&wanted) || wanted.contains(&caption) {
            debug!(
                target,
                caption = %element.caption(),
                index,
                "similarity match"
            );
            return surface.click_clickable(index).await;
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_adapter::mock::MockSurface;
    use surface_adapter::ClickableElement;

    fn clickable(tag: &str, text: &str) -> ClickableElement {
        ClickableElement {
            tag: tag.to_string(),
            text: text.to_string(),
            ..ClickableElement::default()
        }
    }

    #[test]
    fn chain_order_is_fixed() {
        let chain = ResolutionStrategy::fallback_chain();
        assert_eq!(chain[0], ResolutionStrategy::NativeText);
        assert_eq!(chain[3], ResolutionStrategy::Similarity);
        assert_eq!(chain[1].name(), "exact-text");
    }

    #[tokio::test]
    async fn similarity_matches_either_direction() {
        let surface = MockSurface::new().with_clickables(vec![
            clickable("DIV", "Avançar"),
            clickable("BUTTON", "Avançar para a próxima etapa"),
        ]);
        // Div is skipped; the button caption contains the target.
        assert!(similarity_attempt(&surface, "Avançar").await.unwrap());
        assert_eq!(
            surface.recorded_clicks(),
            vec!["Avançar para a próxima etapa".to_string()]
        );
    }

    #[tokio::test]
    async fn similarity_matches_caption_inside_target() {
        let surface =
            MockSurface::new().with_clickables(vec![clickable("INPUT", "ok")]);
        assert!(similarity_attempt(&surface, "Clique OK para continuar")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn similarity_without_candidates_is_false() {
        let surface = MockSurface::new();
        assert!(!similarity_attempt(&surface, "Enviar").await.unwrap());
    }
}
