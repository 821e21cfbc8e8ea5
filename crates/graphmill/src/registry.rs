//! Named component factories.
//!
//! Components are selected by name in configuration (`work.driver`,
//! `id.driver`, `emitter`, `output`, `encoder`, `decoder`) and built by the
//! factory registered under that name. [`Registry::default`] registers the
//! built-in components; embedders add their own with the `register_*`
//! methods.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    Config, Error, Result,
    adapter::{
        Codecs, Decoder, Emitter, Encoder, JsonDecoder, JsonEncoder, JsonLinesEmitter,
        JsonLinesOutput, MemoryOutput, Output, SyntheticEmitter,
    },
    driver::{
        IteratorDriver, RangeDriver, WorkChunkDriver,
        id::{GeneratedIdDriver, OutputIdDriver, PassthroughIdDriver, RangedIdDriver},
    },
};

pub type WorkDriverFactory = Arc<dyn Fn(&Config) -> Result<Arc<dyn WorkChunkDriver>> + Send + Sync>;
pub type IdDriverFactory = Arc<dyn Fn(&Config) -> Result<Arc<dyn OutputIdDriver>> + Send + Sync>;
pub type EmitterFactory = Arc<dyn Fn(&Config, &Codecs) -> Result<Arc<dyn Emitter>> + Send + Sync>;
pub type OutputFactory = Arc<dyn Fn(&Config, &Codecs) -> Result<Arc<dyn Output>> + Send + Sync>;
pub type EncoderFactory = Arc<dyn Fn(&Config) -> Result<Arc<dyn Encoder>> + Send + Sync>;
pub type DecoderFactory = Arc<dyn Fn(&Config) -> Result<Arc<dyn Decoder>> + Send + Sync>;

#[derive(Clone)]
pub struct Registry {
    work_drivers: HashMap<String, WorkDriverFactory>,
    id_drivers: HashMap<String, IdDriverFactory>,
    emitters: HashMap<String, EmitterFactory>,
    outputs: HashMap<String, OutputFactory>,
    encoders: HashMap<String, EncoderFactory>,
    decoders: HashMap<String, DecoderFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<V>(map: &HashMap<String, V>) -> Vec<&str> {
            let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        }
        f.debug_struct("Registry")
            .field("work_drivers", &names(&self.work_drivers))
            .field("id_drivers", &names(&self.id_drivers))
            .field("emitters", &names(&self.emitters))
            .field("outputs", &names(&self.outputs))
            .field("encoders", &names(&self.encoders))
            .field("decoders", &names(&self.decoders))
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_work_driver("range", |_| Ok(Arc::new(RangeDriver::new())))
            .register_work_driver("directory", |_| Ok(Arc::new(IteratorDriver::directory())))
            .register_id_driver("ranged", |config| Ok(Arc::new(RangedIdDriver::from_config(config)?)))
            .register_id_driver("generated", |config| {
                Ok(Arc::new(GeneratedIdDriver::from_config(config)?))
            })
            .register_id_driver("passthrough", |_| Ok(Arc::new(PassthroughIdDriver)))
            .register_emitter("synthetic", |config, _| {
                Ok(Arc::new(SyntheticEmitter::from_config(config)?))
            })
            .register_emitter("jsonl", |config, codecs| {
                Ok(Arc::new(JsonLinesEmitter::from_config(config, codecs)))
            })
            .register_output("memory", |config, _| Ok(Arc::new(MemoryOutput::from_config(config))))
            .register_output("jsonl", |config, codecs| {
                Ok(Arc::new(JsonLinesOutput::from_config(config, codecs)?))
            })
            .register_encoder("json", |_| Ok(Arc::new(JsonEncoder)))
            .register_decoder("json", |_| Ok(Arc::new(JsonDecoder)));
        registry
    }
}

fn lookup<'a, V>(map: &'a HashMap<String, V>, kind: &'static str, name: &str) -> Result<&'a V> {
    map.get(name).ok_or_else(|| Error::UnknownComponent {
        kind,
        name: name.to_string(),
    })
}

impl Registry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            work_drivers: HashMap::new(),
            id_drivers: HashMap::new(),
            emitters: HashMap::new(),
            outputs: HashMap::new(),
            encoders: HashMap::new(),
            decoders: HashMap::new(),
        }
    }

    pub fn register_work_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Arc<dyn WorkChunkDriver>> + Send + Sync + 'static,
    {
        self.work_drivers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_id_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Arc<dyn OutputIdDriver>> + Send + Sync + 'static,
    {
        self.id_drivers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_emitter<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config, &Codecs) -> Result<Arc<dyn Emitter>> + Send + Sync + 'static,
    {
        self.emitters.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_output<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config, &Codecs) -> Result<Arc<dyn Output>> + Send + Sync + 'static,
    {
        self.outputs.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_encoder<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Arc<dyn Encoder>> + Send + Sync + 'static,
    {
        self.encoders.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_decoder<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Arc<dyn Decoder>> + Send + Sync + 'static,
    {
        self.decoders.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn work_driver(&self, name: &str, config: &Config) -> Result<Arc<dyn WorkChunkDriver>> {
        let factory = lookup(&self.work_drivers, "work driver", name)?;
        factory(config)
    }

    pub fn id_driver(&self, name: &str, config: &Config) -> Result<Arc<dyn OutputIdDriver>> {
        let factory = lookup(&self.id_drivers, "id driver", name)?;
        factory(config)
    }

    pub fn emitter(&self, name: &str, config: &Config, codecs: &Codecs) -> Result<Arc<dyn Emitter>> {
        let factory = lookup(&self.emitters, "emitter", name)?;
        factory(config, codecs)
    }

    pub fn output(&self, name: &str, config: &Config, codecs: &Codecs) -> Result<Arc<dyn Output>> {
        let factory = lookup(&self.outputs, "output", name)?;
        factory(config, codecs)
    }

    pub fn encoder(&self, name: &str, config: &Config) -> Result<Arc<dyn Encoder>> {
        let factory = lookup(&self.encoders, "encoder", name)?;
        factory(config)
    }

    pub fn decoder(&self, name: &str, config: &Config) -> Result<Arc<dyn Decoder>> {
        let factory = lookup(&self.decoders, "decoder", name)?;
        factory(config)
    }
}
