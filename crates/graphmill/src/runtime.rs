use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    Config, Error, Phase, Result, RunningPhase,
    adapter::Codecs,
    config::{RUNTIME_DEFAULTS, keys},
    context::RuntimeContext,
    handler::{ErrorHandler, LoggingErrorHandler},
    pipeline::Pipeline,
    processor::{ParallelStreamProcessor, PhaseSummary},
    registry::Registry,
};

/// Owns the worker pool and the shared state of a migration run.
///
/// Phases are started with [`Self::run_phase`] and run as tasks on the pool.
/// An abort decided by the error handler cancels [`Self::abort_token`],
/// which stops every phase of this runtime and makes later `run_phase` calls
/// fail with [`Error::Aborted`].
pub struct Runtime {
    pool: tokio::runtime::Runtime,
    parallelism: usize,
    registry: Arc<Registry>,
    context: Arc<RuntimeContext>,
    handler: Option<Arc<dyn ErrorHandler>>,
    abort: CancellationToken,
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("parallelism", &self.parallelism)
            .field("registry", &self.registry)
            .field("context", &self.context)
            .field("custom_handler", &self.handler.is_some())
            .field("aborted", &self.abort.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Builds a runtime with the built-in components.
    ///
    /// The pool has `runtime.parallelism` worker threads, defaulting to the
    /// number of CPUs. The same value is the default pipeline count of every
    /// phase.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero or malformed parallelism and
    /// [`Error::Runtime`] when the pool cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let parallelism = parallelism(config, num_cpus::get())?;
        let pool = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(parallelism)
            .thread_name("graphmill-worker")
            .enable_time()
            .build()
            .map_err(|e| Error::Runtime {
                reason: format!("failed to build worker pool: {e}"),
            })?;
        info!(parallelism, "Runtime started");

        Ok(Self {
            pool,
            parallelism,
            registry: Arc::new(Registry::default()),
            context: Arc::new(RuntimeContext::new()),
            handler: None,
            abort: CancellationToken::new(),
        })
    }

    /// Replaces the component registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Routes every failure to `handler` instead of a
    /// [`LoggingErrorHandler`] built from each phase's `runtime.on_error`.
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    /// The run-wide cancellation token.
    ///
    /// Cancelling it aborts every running phase; it is cancelled by the
    /// runtime whenever the error handler decides to abort.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Starts `phase` and returns immediately.
    ///
    /// Every component is built before any worker is launched, so
    /// configuration errors are returned here and leave nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] when the runtime has been aborted,
    /// [`Error::PhaseAlreadyRunning`] when a previous [`RunningPhase`] of
    /// `phase` has not been closed yet, or the configuration error that
    /// prevented the phase from starting.
    pub fn run_phase(&self, phase: Phase, config: &Config) -> Result<RunningPhase> {
        if self.is_aborted() {
            return Err(Error::Aborted);
        }
        // The live run owns the scope; it must not be cleared from here.
        if !self.context.is_clear(phase) {
            return Err(Error::PhaseAlreadyRunning { phase });
        }
        let config = config.for_phase(phase).with_defaults(RUNTIME_DEFAULTS);
        let (pipelines, handler) = match self.prepare(phase, &config) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(%phase, "Phase failed to start: {e}");
                if let Err(cleanup) = self.context.clear_phase(phase) {
                    error!(%phase, "Failed to clear phase: {cleanup}");
                }
                return Err(e);
            }
        };

        let token = self.abort.child_token();
        let processor = ParallelStreamProcessor::new(
            phase,
            pipelines.clone(),
            Arc::clone(&self.context),
            handler,
            token.clone(),
            self.abort.clone(),
        );
        info!(%phase, pipelines = pipelines.len(), "Phase started");
        let handle = self.pool.spawn(processor.run());

        Ok(RunningPhase::new(
            phase,
            pipelines,
            Arc::clone(&self.context),
            token,
            handle,
        ))
    }

    fn prepare(
        &self,
        phase: Phase,
        config: &Config,
    ) -> Result<(Vec<Arc<Pipeline>>, Arc<dyn ErrorHandler>)> {
        let count = parallelism(config, self.parallelism)?;
        let handler = match &self.handler {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(LoggingErrorHandler::from_config(config)?),
        };

        let encoder_name = config.require(keys::ENCODER)?;
        let decoder_name = config.require(keys::DECODER)?;
        let codecs = Codecs {
            encoder: self.context.load_encoder(phase, encoder_name, || {
                self.registry.encoder(encoder_name, config)
            })?,
            decoder: self.context.load_decoder(phase, decoder_name, || {
                self.registry.decoder(decoder_name, config)
            })?,
        };
        let ids_name = config.require(keys::ID_DRIVER)?;
        self.context
            .open_id_driver(phase, || self.registry.id_driver(ids_name, config))?;

        let pipelines = (0..count)
            .map(|slot| {
                Pipeline::create(
                    slot,
                    count,
                    phase,
                    config,
                    &codecs,
                    &self.registry,
                    &self.context,
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        if config.parse_or(keys::OUTPUT_DROP_STORAGE, false)? {
            for pipeline in &pipelines {
                pipeline.output().drop_storage()?;
            }
            info!(%phase, "Output storage dropped");
        }
        Ok((pipelines, handler))
    }

    /// Starts each of `phases` in order as the iterator is advanced.
    ///
    /// Phases are not waited for; a caller that needs phase one's vertices
    /// before phase two starts should wait on each handle before pulling the
    /// next one.
    pub fn run_phases<'a, I>(
        &'a self,
        phases: I,
        config: &'a Config,
    ) -> impl Iterator<Item = Result<RunningPhase>> + 'a
    where
        I: IntoIterator<Item = Phase>,
        I::IntoIter: 'a,
    {
        phases
            .into_iter()
            .map(move |phase| self.run_phase(phase, config))
    }

    /// Runs `phases` strictly one after another, closing each before the next
    /// starts.
    ///
    /// Must be called from outside the runtime's worker threads.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first phase that fails.
    pub fn run_to_completion<I>(&self, phases: I, config: &Config) -> Result<Vec<PhaseSummary>>
    where
        I: IntoIterator<Item = Phase>,
    {
        let mut summaries = Vec::new();
        for running in self.run_phases(phases, config) {
            let mut running = running?;
            let summary = running.get();
            running.close()?;
            summaries.push(summary?);
        }
        Ok(summaries)
    }
}

fn parallelism(config: &Config, default: usize) -> Result<usize> {
    match config.parse_or(keys::PARALLELISM, default)? {
        0 => Err(Error::InvalidConfig {
            key: keys::PARALLELISM.to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        }),
        n => Ok(n),
    }
}
