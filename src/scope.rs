//! Per-turn binding of the active portfolio source
//!
//! Tools resolve their data source from the enclosing turn rather than from a
//! process-wide slot, so concurrent turns for different users never observe
//! each other's source. The binding is dropped when the scoped future
//! completes, fails, panics or is cancelled.
//!
//! Tool execution must stay on the task that entered the scope; a
//! `tokio::spawn` inside a runtime adapter would lose the binding.

use crate::client::PortfolioSource;
use crate::error::OrchestrationError;
use crate::Result;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static ACTIVE_SOURCE: Arc<dyn PortfolioSource>;
}

/// Run `fut` with `source` bound as the active portfolio source
pub async fn with_source<F>(source: Arc<dyn PortfolioSource>, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE_SOURCE.scope(source, fut).await
}

/// The source bound to the current turn
pub fn current_source() -> Result<Arc<dyn PortfolioSource>> {
    ACTIVE_SOURCE.try_with(Arc::clone).map_err(|_| {
        OrchestrationError::ToolError("No portfolio data source is bound to this turn".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPortfolio;

    #[test]
    fn test_no_source_outside_scope() {
        let err = tokio_test::block_on(async { current_source().err() });
        assert!(matches!(err, Some(OrchestrationError::ToolError(_))));
    }

    #[tokio::test]
    async fn test_scoped_source_is_visible_then_released() {
        let source: Arc<dyn PortfolioSource> = Arc::new(MockPortfolio::new());
        let inside = with_source(source.clone(), async {
            current_source().map(|s| Arc::ptr_eq(&s, &source))
        })
        .await;
        assert!(matches!(inside, Ok(true)));
        assert!(current_source().is_err());
    }

    #[tokio::test]
    async fn test_nested_scopes_restore_outer() {
        let outer: Arc<dyn PortfolioSource> = Arc::new(MockPortfolio::new());
        let inner: Arc<dyn PortfolioSource> = Arc::new(MockPortfolio::new());

        let restored = with_source(outer.clone(), async {
            let saw_inner = with_source(inner.clone(), async {
                current_source().map(|s| Arc::ptr_eq(&s, &inner))
            })
            .await;
            let back = current_source().map(|s| Arc::ptr_eq(&s, &outer));
            (saw_inner, back)
        })
        .await;

        assert!(matches!(restored, (Ok(true), Ok(true))));
    }
}
