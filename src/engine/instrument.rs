// src/engine/instrument.rs

//! Tracing around individual task executions.

use std::future::Future;
use std::time::Instant;

use tokio::task::JoinError;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::engine::TaskEvent;
use crate::tasks::TaskKey;

/// Run `fut` inside a `task` span and log how it ended.
pub async fn instrumented<F>(key: &TaskKey, type_name: &str, fut: F) -> TaskEvent
where
    F: Future<Output = TaskEvent>,
{
    let span = info_span!("task", task = %key, action_type = %type_name);
    async move {
        let start = Instant::now();
        debug!("task started");
        let event = fut.await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &event {
            TaskEvent::Completed { result, .. } if result.is_failed() => warn!(
                elapsed_ms,
                error = result.error.as_deref().unwrap_or("unknown error"),
                "task failed"
            ),
            TaskEvent::Completed { result, .. } => info!(
                elapsed_ms,
                state = %result.state,
                version = result.version.as_deref().unwrap_or("-"),
                "task completed"
            ),
            TaskEvent::NeedsDependencies { dependencies, .. } => debug!(
                elapsed_ms,
                discovered = dependencies.len(),
                "task needs more dependencies"
            ),
        }
        event
    }
    .instrument(span)
    .await
}

/// `spawn_blocking` that keeps the caller's span, so events logged by `f`
/// still carry the task fields.
pub async fn spawn_blocking_in_span<F, T>(f: F) -> Result<T, JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f)).await
}
