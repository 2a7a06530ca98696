use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{Dispatch, Span};

use docex_core::error::{DocexError, Result};

/// Tracing state of a call site: the active subscriber and the current span.
///
/// Pool threads have neither; a job dispatched without this would log outside
/// of the run and item spans it belongs to.
#[derive(Clone)]
pub struct AmbientState {
    dispatch: Dispatch,
    span: Span,
}

impl AmbientState {
    pub fn capture() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            span: Span::current(),
        }
    }

    /// Run `f` with the captured subscriber installed and the captured span entered.
    pub fn restore<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }
}

/// Bounded thread pool for CPU-bound stages (read, convert, evaluate).
///
/// Owned by a single orchestrator run; dropping it lets idle threads exit once
/// their queued jobs have finished.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(DocexError::Config(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("docex-worker-{i}"))
            .build()
            .map_err(|e| DocexError::Worker(format!("failed to build worker pool: {e}")))?;

        Ok(Self {
            pool,
            size: max_workers,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Execute `job` on a pool thread and await its result.
    ///
    /// The caller's [`AmbientState`] is captured here and restored around the job.
    /// A panicking job surfaces as [`DocexError::Worker`].
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ambient = AmbientState::capture();
        let (tx, rx) = oneshot::channel();

        self.pool.spawn(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(|| ambient.restore(job))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(DocexError::Worker(format!(
                    "worker task panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };
            // The receiver is gone only when the awaiting item was dropped.
            let _ = tx.send(outcome);
        });

        rx.await.map_err(|_| {
            DocexError::Worker("worker pool shut down before the task completed".to_string())
        })?
    }
}

/// Await one item's future, turning a panic into that item's [`DocexError::Worker`].
pub(crate) async fn isolate_panics<F, T>(item: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(item).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(DocexError::Worker(format!(
            "item panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
