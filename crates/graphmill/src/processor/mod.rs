//! Runs one phase's pipelines concurrently on the runtime's worker pool.
//!
//! Every pipeline gets its own task. A worker starts its pipeline, pulls the
//! emitter's stream and walks each produced emitable against its own sink
//! session, yielding to the scheduler between top-level elements. Workers
//! hold a [`WaitGuard`] for their whole lifetime so the processor learns
//! about every exit, including panics.

mod wait_group;

pub use wait_group::*;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::{
    Error, Phase, Result,
    context::RuntimeContext,
    emit::{WalkStats, Walker},
    handler::{Disposition, ErrorContext, ErrorHandler},
    pipeline::Pipeline,
};

/// What a finished phase did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSummary {
    pub phase: Phase,
    /// Number of pipelines that ran.
    pub pipelines: usize,
    /// Emitables written across all workers.
    pub emitted: u64,
    /// Failures that were skipped under the `continue` policy.
    pub failed: u64,
}

/// State shared by the workers of one phase.
struct Shared {
    handler: Arc<dyn ErrorHandler>,
    /// Cancelled by `RunningPhase::abort` or, through its parent, by a
    /// runtime-wide abort.
    phase_token: CancellationToken,
    run_token: CancellationToken,
    first_error: Mutex<Option<Error>>,
}

impl Shared {
    /// Records `error` as fatal and stops every phase of the run.
    fn abort_run(&self, error: Error, ctx: &ErrorContext) {
        debug!(phase = %ctx.phase, slot = ctx.slot, "Cancelling run");
        self.first_error.lock().get_or_insert(error);
        self.run_token.cancel();
    }

    /// Routes a worker-level failure.
    fn route(&self, error: Error, ctx: &ErrorContext) {
        match self.handler.handle(&error, ctx) {
            Disposition::Continue => {}
            Disposition::Abort => self.abort_run(error, ctx),
        }
    }
}

pub(crate) struct ParallelStreamProcessor {
    phase: Phase,
    pipelines: Vec<Arc<Pipeline>>,
    context: Arc<RuntimeContext>,
    shared: Arc<Shared>,
}

impl ParallelStreamProcessor {
    pub(crate) fn new(
        phase: Phase,
        pipelines: Vec<Arc<Pipeline>>,
        context: Arc<RuntimeContext>,
        handler: Arc<dyn ErrorHandler>,
        phase_token: CancellationToken,
        run_token: CancellationToken,
    ) -> Self {
        Self {
            phase,
            pipelines,
            context,
            shared: Arc::new(Shared {
                handler,
                phase_token,
                run_token,
                first_error: Mutex::new(None),
            }),
        }
    }

    /// Runs every pipeline to completion.
    ///
    /// Must be polled inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the phase, [`Error::WorkerPanicked`]
    /// when a worker panicked, or [`Error::Aborted`] when the phase was
    /// cancelled from outside.
    pub(crate) async fn run(self) -> Result<PhaseSummary> {
        let phase = self.phase;
        let group = WaitGroup::new();
        let mut handles = Vec::with_capacity(self.pipelines.len());

        for pipeline in &self.pipelines {
            let guard = group.add();
            let worker = Worker {
                pipeline: Arc::clone(pipeline),
                shared: Arc::clone(&self.shared),
            };
            let handle = tokio::spawn(async move {
                let _guard = guard;
                worker.run().await
            });
            handles.push((pipeline.slot(), handle));
        }

        group.wait().await;

        let mut stats = WalkStats::default();
        for (slot, handle) in handles {
            match handle.await {
                Ok(worker_stats) => stats += worker_stats,
                Err(e) => {
                    error!(%phase, slot, "Worker failed: {e}");
                    self.shared
                        .first_error
                        .lock()
                        .get_or_insert(Error::WorkerPanicked { slot });
                }
            }
        }

        if let Err(e) = self.context.release_work_driver(phase) {
            error!(%phase, "Failed to release work chunk driver: {e}");
        }

        let summary = PhaseSummary {
            phase,
            pipelines: self.pipelines.len(),
            emitted: stats.emitted,
            failed: stats.failed,
        };
        if let Some(e) = self.shared.first_error.lock().take() {
            return Err(e);
        }
        if self.shared.phase_token.is_cancelled() {
            info!(%phase, emitted = summary.emitted, "Phase aborted");
            return Err(Error::Aborted);
        }
        info!(
            %phase,
            emitted = summary.emitted,
            failed = summary.failed,
            "Phase finished"
        );
        Ok(summary)
    }
}

struct Worker {
    pipeline: Arc<Pipeline>,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(self) -> WalkStats {
        let pipeline = &self.pipeline;
        let phase = pipeline.phase();
        let slot = pipeline.slot();
        let ctx = ErrorContext { phase, slot };
        trace!("Worker {slot} started");

        if let Err(e) = pipeline.start() {
            self.shared.route(e, &ctx);
            return WalkStats {
                emitted: 0,
                failed: 1,
            };
        }

        let token = &self.shared.phase_token;
        let mut session = pipeline.session();
        let mut stats = {
            let mut walker = Walker::new(&mut session, self.shared.handler.as_ref(), ctx, token);
            let mut stream = pipeline.emitter().stream(pipeline.driver(), phase);
            loop {
                if token.is_cancelled() {
                    debug!("Worker {slot} cancelled");
                    break;
                }
                let Some(next) = stream.next() else {
                    break;
                };
                let outcome = match next {
                    Ok(root) => walker.walk(root),
                    Err(e) => walker.reject(e),
                };
                match outcome {
                    Ok(()) => {}
                    Err(Error::Aborted) => break,
                    Err(e) => {
                        self.shared.abort_run(e, &ctx);
                        break;
                    }
                }
                tokio::task::yield_now().await;
            }
            walker.stats()
        };

        if let Err(e) = session.close() {
            stats.failed += 1;
            self.shared.route(e, &ctx);
        }
        trace!(
            emitted = stats.emitted,
            failed = stats.failed,
            "Worker {slot} stopped"
        );
        stats
    }
}
