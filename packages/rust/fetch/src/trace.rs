//! Indentation-scoped progress trace.
//!
//! Every nested operation logs a start line, then a success or failure line,
//! indented four spaces per level. The depth is shared by everything holding
//! the same [`Trace`].

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, info};

/// Hierarchical progress trace for one run.
#[derive(Debug, Default)]
pub struct Trace {
    depth: AtomicUsize,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Log an informational line at the current depth.
    pub fn info(&self, message: impl Display) {
        let depth = self.depth();
        info!(depth, "{}{message}", indent(depth));
    }

    /// Run `fut` one level deeper, logging its start and outcome.
    pub async fn step<T, E, F>(&self, message: impl Display, fut: F) -> Result<T, E>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let depth = self.depth();
        info!(depth, "{}> {message}", indent(depth));

        let result = {
            let _guard = DepthGuard::enter(&self.depth);
            fut.await
        };

        match &result {
            Ok(_) => info!(depth, "{}succeeded", indent(depth)),
            Err(e) => error!(depth, error = %e, "{}failed: {e}", indent(depth)),
        }
        result
    }
}

/// Restores the depth even if the step is dropped mid-flight.
struct DepthGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

fn indent(depth: usize) -> String {
    " ".repeat(depth * 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_steps_track_depth() {
        let trace = Trace::new();
        let inner_depth = trace
            .step("outer", async {
                trace
                    .step("inner", async { Ok::<_, String>(trace.depth()) })
                    .await
            })
            .await
            .unwrap();

        assert_eq!(inner_depth, 2);
        assert_eq!(trace.depth(), 0);
    }

    #[tokio::test]
    async fn failed_step_restores_depth() {
        let trace = Trace::new();
        let result: Result<(), String> = trace.step("boom", async { Err("bad".into()) }).await;
        assert!(result.is_err());
        assert_eq!(trace.depth(), 0);
    }

    #[test]
    fn indentation_is_four_spaces_per_level() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2).len(), 8);
    }
}
