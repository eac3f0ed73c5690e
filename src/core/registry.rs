use std::sync::Arc;

use super::errors::{Result, UploadError};
use super::hooks::Hooks;
use super::traits::{ProgressGauge, RecordSink, Uploader};
use crate::config::Config;
use crate::uploaders::{LbryUploader, RumbleUploader};

/// Shared collaborators handed to every engine at construction.
#[derive(Clone)]
pub struct Services {
    pub sink: Arc<dyn RecordSink>,
    pub gauge: Arc<dyn ProgressGauge>,
    pub hooks: Hooks,
}

pub type UploaderConstructor =
    Box<dyn Fn(&Config, &Services) -> Result<Arc<dyn Uploader>> + Send + Sync>;

/// Maps destination names to engine constructors.
#[derive(Default)]
pub struct Registry {
    constructors: Vec<(String, UploaderConstructor)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every destination this crate ships.
    pub fn builtin() -> Self {
        Self::new()
            .register(LbryUploader::NAME, |config, services| {
                Ok(Arc::new(LbryUploader::new(&config.lbry, &config.thumbnail, services.clone())?))
            })
            .register(RumbleUploader::NAME, |config, services| {
                Ok(Arc::new(RumbleUploader::new(&config.rumble, services.clone())?))
            })
    }

    pub fn register<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn(&Config, &Services) -> Result<Arc<dyn Uploader>> + Send + Sync + 'static,
    {
        self.constructors.retain(|(existing, _)| existing != name);
        self.constructors.push((name.to_string(), Box::new(constructor)));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Constructs the named engines, in the order given.
    pub fn build(
        &self,
        names: &[String],
        config: &Config,
        services: &Services,
    ) -> Result<Vec<Arc<dyn Uploader>>> {
        names
            .iter()
            .map(|name| {
                let (_, constructor) = self
                    .constructors
                    .iter()
                    .find(|(registered, _)| registered == name)
                    .ok_or_else(|| UploadError::UnknownDestination(name.clone()))?;
                constructor(config, services)
            })
            .collect()
    }
}
