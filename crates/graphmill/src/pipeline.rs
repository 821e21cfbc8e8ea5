use core::fmt;
use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    Config, Error, Phase, Result,
    adapter::{Codecs, Emitter, Output, SinkSession},
    config::keys,
    context::RuntimeContext,
    driver::{WorkChunkDriver, id::OutputIdDriver},
    registry::Registry,
};

/// One worker slot's emitter and output for the lifetime of one phase.
///
/// A pipeline is single use: [`Self::start`] succeeds exactly once.
pub struct Pipeline {
    slot: usize,
    phase: Phase,
    config: Config,
    driver: Arc<dyn WorkChunkDriver>,
    ids: Arc<dyn OutputIdDriver>,
    emitter: Arc<dyn Emitter>,
    output: Arc<dyn Output>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("slot", &self.slot)
            .field("phase", &self.phase)
            .field("driver", &self.driver.name())
            .field("ids", &self.ids.name())
            .field("emitter", &self.emitter)
            .field("output", &self.output)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Builds the pipeline for `slot` out of `count`.
    ///
    /// `config` is the phase view of the run configuration (with runtime
    /// defaults applied). The phase's shared work chunk driver and output ID
    /// driver are taken from `context`, created on first use; the emitter and
    /// output are built for this slot and registered with `context`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a component is unknown, cannot be
    /// built from `config`, or the emitter does not support `phase`.
    pub fn create(
        slot: usize,
        count: usize,
        phase: Phase,
        config: &Config,
        codecs: &Codecs,
        registry: &Registry,
        context: &RuntimeContext,
    ) -> Result<Self> {
        let config = config.for_slot(slot, count);

        let driver_name = config.require(keys::WORK_DRIVER)?;
        let driver =
            context.load_work_driver(phase, || registry.work_driver(driver_name, &config))?;
        driver.init(&config)?;

        let ids_name = config.require(keys::ID_DRIVER)?;
        let ids = context.open_id_driver(phase, || registry.id_driver(ids_name, &config))?;

        let emitter_name = config.require(keys::EMITTER)?;
        let emitter = registry.emitter(emitter_name, &config, codecs)?;
        if !emitter.phases().contains(&phase) {
            return Err(Error::InvalidConfig {
                key: keys::EMITTER.to_string(),
                value: emitter_name.to_string(),
                reason: format!("does not support phase {phase}"),
            });
        }
        let output = registry.output(config.require(keys::OUTPUT)?, &config, codecs)?;

        context.register_emitter(phase, Arc::clone(&emitter));
        context.register_output(phase, Arc::clone(&output));
        tracing::trace!(slot, %phase, "Pipeline created");

        Ok(Self {
            slot,
            phase,
            config,
            driver,
            ids,
            emitter,
            output,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The slot's view of the configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &dyn WorkChunkDriver {
        self.driver.as_ref()
    }

    pub fn emitter(&self) -> &dyn Emitter {
        self.emitter.as_ref()
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    /// Marks the pipeline as started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineAlreadyStarted`] on every call after the
    /// first.
    pub fn start(&self) -> Result<()> {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::PipelineAlreadyStarted { slot: self.slot })
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Opens a session writing to this pipeline's output with the phase's
    /// output ID driver.
    pub fn session(&self) -> SinkSession {
        SinkSession::new(Arc::clone(&self.output), Arc::clone(&self.ids))
    }

    /// Closes the emitter and the output. Later calls do nothing.
    ///
    /// Both are closed even if the first fails; the first failure is
    /// returned.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let emitter = self.emitter.close();
        let output = self.output.close();
        tracing::trace!(slot = self.slot, phase = %self.phase, "Pipeline closed");
        emitter.and(output)
    }
}
