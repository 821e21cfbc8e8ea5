use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    Error, Phase, Result, context::RuntimeContext, pipeline::Pipeline, processor::PhaseSummary,
};

/// Sink metrics of one pipeline slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub slot: usize,
    pub metrics: BTreeMap<String, u64>,
}

/// Handle to a phase running on a [`Runtime`](crate::Runtime).
///
/// The phase keeps running whether or not the handle is polled. Waiting
/// through [`Self::get`] or [`Self::join`] yields the same cached result on
/// every call. Dropping a handle that was never closed closes it, blocking
/// until the phase has stopped.
#[derive(Debug)]
pub struct RunningPhase {
    phase: Phase,
    pipelines: Vec<Arc<Pipeline>>,
    context: Arc<RuntimeContext>,
    abort: CancellationToken,
    handle: Option<JoinHandle<Result<PhaseSummary>>>,
    result: Option<Result<PhaseSummary>>,
    closed: bool,
}

fn joined(joined: core::result::Result<Result<PhaseSummary>, JoinError>) -> Result<PhaseSummary> {
    joined.unwrap_or_else(|e| {
        Err(Error::Runtime {
            reason: format!("phase task failed: {e}"),
        })
    })
}

impl RunningPhase {
    pub(crate) fn new(
        phase: Phase,
        pipelines: Vec<Arc<Pipeline>>,
        context: Arc<RuntimeContext>,
        abort: CancellationToken,
        handle: JoinHandle<Result<PhaseSummary>>,
    ) -> Self {
        Self {
            phase,
            pipelines,
            context,
            abort,
            handle: Some(handle),
            result: None,
            closed: false,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns `true` once every worker of the phase has stopped.
    pub fn is_done(&self) -> bool {
        self.result.is_some() || self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Blocks until the phase has stopped and returns its outcome.
    ///
    /// Must not be called from one of the runtime's worker threads; use
    /// [`Self::join`] there.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the phase.
    pub fn get(&mut self) -> Result<PhaseSummary> {
        if let Some(handle) = self.handle.take() {
            self.result = Some(joined(futures::executor::block_on(handle)));
        }
        self.cached()
    }

    /// Async counterpart of [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the phase.
    pub async fn join(&mut self) -> Result<PhaseSummary> {
        if let Some(handle) = self.handle.take() {
            self.result = Some(joined(handle.await));
        }
        self.cached()
    }

    fn cached(&self) -> Result<PhaseSummary> {
        self.result.clone().unwrap_or_else(|| {
            Err(Error::Runtime {
                reason: "phase result unavailable".to_string(),
            })
        })
    }

    /// Current sink metrics of every slot, read lazily.
    pub fn status(&self) -> impl Iterator<Item = SlotStatus> + '_ {
        self.pipelines.iter().map(|pipeline| SlotStatus {
            slot: pipeline.slot(),
            metrics: pipeline.output().metrics(),
        })
    }

    /// Sums [`Self::status`] across slots.
    pub fn totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for status in self.status() {
            for (name, value) in status.metrics {
                *totals.entry(name).or_insert(0) += value;
            }
        }
        totals
    }

    /// Stops this phase's workers at their next element boundary. Other
    /// phases keep running.
    pub fn abort(&self) {
        tracing::debug!(phase = %self.phase, "Phase abort requested");
        self.abort.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits for the phase to stop, aborting it first if it is still running,
    /// then closes every pipeline and clears the phase's shared state.
    ///
    /// Calling it again does nothing. The phase outcome stays available
    /// through [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns the first failure to close a pipeline or release the phase's
    /// drivers.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.is_done() {
            self.abort();
        }
        // The outcome is cached for later `get` calls.
        let _ = self.get();
        self.closed = true;

        let mut first = None;
        for pipeline in &self.pipelines {
            if let Err(e) = pipeline.close() {
                tracing::warn!(phase = %self.phase, slot = pipeline.slot(), "Failed to close pipeline: {e}");
                first.get_or_insert(e);
            }
        }
        if let Err(e) = self.context.clear_phase(self.phase) {
            first.get_or_insert(e);
        }
        tracing::info!(phase = %self.phase, "Phase closed");
        first.map_or(Ok(()), Err)
    }
}

impl Drop for RunningPhase {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(phase = %self.phase, "Failed to close phase on drop: {e}");
        }
    }
}
