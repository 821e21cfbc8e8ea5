//! Phase-scoped shared state.
//!
//! A [`RuntimeContext`] belongs to one [`Runtime`](crate::Runtime) and keeps,
//! per phase, the singletons every pipeline of that phase shares: the work
//! chunk driver, the output ID driver, and the emitters, outputs and codecs
//! loaded for it. Tearing a phase down clears its scope, so a later run of the
//! same phase starts from fresh instances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    Phase, Result,
    adapter::{Decoder, Emitter, Encoder, Output},
    driver::{WorkChunkDriver, id::OutputIdDriver},
};

#[derive(Default)]
struct PhaseScope {
    work_driver: Option<Arc<dyn WorkChunkDriver>>,
    id_driver: Option<Arc<dyn OutputIdDriver>>,
    encoders: HashMap<String, Arc<dyn Encoder>>,
    decoders: HashMap<String, Arc<dyn Decoder>>,
    emitters: Vec<Arc<dyn Emitter>>,
    outputs: Vec<Arc<dyn Output>>,
}

impl PhaseScope {
    fn is_empty(&self) -> bool {
        self.work_driver.is_none()
            && self.id_driver.is_none()
            && self.encoders.is_empty()
            && self.decoders.is_empty()
            && self.emitters.is_empty()
            && self.outputs.is_empty()
    }
}

#[derive(Default)]
pub struct RuntimeContext {
    scopes: Mutex<HashMap<Phase, PhaseScope>>,
}

impl core::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut phases: Vec<Phase> = self.scopes.lock().keys().copied().collect();
        phases.sort_unstable();
        f.debug_struct("RuntimeContext")
            .field("active_phases", &phases)
            .finish()
    }
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the phase's work chunk driver, creating it with `load` on
    /// first use.
    ///
    /// Concurrent callers observe the same instance.
    pub fn load_work_driver<F>(&self, phase: Phase, load: F) -> Result<Arc<dyn WorkChunkDriver>>
    where
        F: FnOnce() -> Result<Arc<dyn WorkChunkDriver>>,
    {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(phase).or_default();
        if let Some(driver) = &scope.work_driver {
            return Ok(Arc::clone(driver));
        }
        let driver = load()?;
        tracing::debug!(%phase, driver = driver.name(), "Work chunk driver loaded");
        scope.work_driver = Some(Arc::clone(&driver));
        Ok(driver)
    }

    pub fn work_driver(&self, phase: Phase) -> Option<Arc<dyn WorkChunkDriver>> {
        self.scopes
            .lock()
            .get(&phase)
            .and_then(|scope| scope.work_driver.clone())
    }

    /// Closes and forgets the phase's work chunk driver.
    pub fn release_work_driver(&self, phase: Phase) -> Result<()> {
        let driver = self
            .scopes
            .lock()
            .get_mut(&phase)
            .and_then(|scope| scope.work_driver.take());
        match driver {
            Some(driver) => {
                tracing::debug!(%phase, driver = driver.name(), "Work chunk driver released");
                driver.close()
            }
            None => Ok(()),
        }
    }

    /// Returns the phase's output ID driver, opening it with `open` if the
    /// phase has none yet.
    pub fn open_id_driver<F>(&self, phase: Phase, open: F) -> Result<Arc<dyn OutputIdDriver>>
    where
        F: FnOnce() -> Result<Arc<dyn OutputIdDriver>>,
    {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(phase).or_default();
        if let Some(driver) = &scope.id_driver {
            return Ok(Arc::clone(driver));
        }
        let driver = open()?;
        tracing::debug!(%phase, driver = driver.name(), "Output id driver opened");
        scope.id_driver = Some(Arc::clone(&driver));
        Ok(driver)
    }

    pub fn id_driver(&self, phase: Phase) -> Option<Arc<dyn OutputIdDriver>> {
        self.scopes
            .lock()
            .get(&phase)
            .and_then(|scope| scope.id_driver.clone())
    }

    pub fn close_id_driver(&self, phase: Phase) {
        if let Some(scope) = self.scopes.lock().get_mut(&phase) {
            scope.id_driver = None;
        }
    }

    /// Returns the phase's encoder named `name`, building it with `load` on
    /// first use of that name.
    pub fn load_encoder<F>(&self, phase: Phase, name: &str, load: F) -> Result<Arc<dyn Encoder>>
    where
        F: FnOnce() -> Result<Arc<dyn Encoder>>,
    {
        let mut scopes = self.scopes.lock();
        let encoders = &mut scopes.entry(phase).or_default().encoders;
        if let Some(loaded) = encoders.get(name) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = load()?;
        encoders.insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Decoder counterpart of [`Self::load_encoder`].
    pub fn load_decoder<F>(&self, phase: Phase, name: &str, load: F) -> Result<Arc<dyn Decoder>>
    where
        F: FnOnce() -> Result<Arc<dyn Decoder>>,
    {
        let mut scopes = self.scopes.lock();
        let decoders = &mut scopes.entry(phase).or_default().decoders;
        if let Some(loaded) = decoders.get(name) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = load()?;
        decoders.insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn register_emitter(&self, phase: Phase, emitter: Arc<dyn Emitter>) {
        self.scopes.lock().entry(phase).or_default().emitters.push(emitter);
    }

    pub fn register_output(&self, phase: Phase, output: Arc<dyn Output>) {
        self.scopes.lock().entry(phase).or_default().outputs.push(output);
    }

    /// Outputs registered for `phase`, in registration order.
    pub fn outputs(&self, phase: Phase) -> Vec<Arc<dyn Output>> {
        self.scopes
            .lock()
            .get(&phase)
            .map(|scope| scope.outputs.clone())
            .unwrap_or_default()
    }

    /// Tears down everything held for `phase`.
    ///
    /// The work chunk driver is closed; every other instance is dropped.
    pub fn clear_phase(&self, phase: Phase) -> Result<()> {
        let released = self.release_work_driver(phase);
        if let Some(scope) = self.scopes.lock().remove(&phase) {
            tracing::debug!(
                %phase,
                emitters = scope.emitters.len(),
                outputs = scope.outputs.len(),
                "Phase scope cleared"
            );
        }
        released
    }

    /// Returns `true` when nothing is held for `phase`.
    pub fn is_clear(&self, phase: Phase) -> bool {
        self.scopes
            .lock()
            .get(&phase)
            .is_none_or(PhaseScope::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Error,
        adapter::{JsonDecoder, JsonEncoder, MemoryOutput},
        driver::{RangeDriver, id::RangedIdDriver},
    };

    #[test]
    fn first_loaded_work_driver_wins() {
        let context = RuntimeContext::new();
        let first = context
            .load_work_driver(Phase::One, || Ok(Arc::new(RangeDriver::with_range(0, 1, 1))))
            .unwrap();
        let second = context
            .load_work_driver(Phase::One, || panic!("loader called twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Phases are isolated from each other.
        let other = context
            .load_work_driver(Phase::Two, || Ok(Arc::new(RangeDriver::with_range(0, 1, 1))))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn releasing_closes_the_driver() {
        let context = RuntimeContext::new();
        let driver = context
            .load_work_driver(Phase::One, || Ok(Arc::new(RangeDriver::with_range(0, 10, 1))))
            .unwrap();
        context.release_work_driver(Phase::One).unwrap();
        assert!(driver.next_chunk().unwrap().is_none());
        assert!(context.work_driver(Phase::One).is_none());
        context.release_work_driver(Phase::One).unwrap();
    }

    #[test]
    fn id_driver_open_is_idempotent_until_closed() {
        let context = RuntimeContext::new();
        let open = || -> Result<Arc<dyn OutputIdDriver>> { Ok(Arc::new(RangedIdDriver::new(0, 10))) };
        let a = context.open_id_driver(Phase::One, open).unwrap();
        let b = context.open_id_driver(Phase::One, open).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        context.close_id_driver(Phase::One);
        let c = context.open_id_driver(Phase::One, open).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn failed_loads_leave_nothing_behind() {
        let context = RuntimeContext::new();
        let err = context
            .load_work_driver(Phase::One, || Err(Error::MissingConfig { key: "k".into() }))
            .unwrap_err();
        assert!(err.is_config());
        assert!(context.is_clear(Phase::One));
    }

    #[test]
    fn clear_phase_forgets_everything() {
        let context = RuntimeContext::new();
        context
            .load_work_driver(Phase::One, || Ok(Arc::new(RangeDriver::with_range(0, 1, 1))))
            .unwrap();
        context
            .open_id_driver(Phase::One, || Ok(Arc::new(RangedIdDriver::new(0, 1))))
            .unwrap();
        context
            .load_encoder(Phase::One, "json", || Ok(Arc::new(JsonEncoder)))
            .unwrap();
        context
            .load_decoder(Phase::One, "json", || Ok(Arc::new(JsonDecoder)))
            .unwrap();
        context.register_output(Phase::One, Arc::new(MemoryOutput::default()));
        context.register_output(Phase::Two, Arc::new(MemoryOutput::default()));
        assert!(!context.is_clear(Phase::One));

        context.clear_phase(Phase::One).unwrap();
        assert!(context.is_clear(Phase::One));
        assert_eq!(context.outputs(Phase::Two).len(), 1);
    }
}
