//! Registry mapping backend names to responders.
//!
//! Backends are normally built eagerly so the first request does not pay the
//! model-load cost, and a backend that fails to build aborts startup. The lazy
//! policy defers each build to the first request for that name and memoizes it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::backends::WorkerBridge;
use crate::catalog::BackendKind;
use crate::config::{BackendConfig, LoadPolicy, ServiceConfig};
use crate::error::{Error, Result};
use crate::fallback::FallbackResponder;
use crate::responder::{ModelResponder, Responder};

/// Builds a responder on demand.
pub type ResponderFactory = Box<dyn Fn() -> Result<Arc<dyn Responder>> + Send + Sync>;

struct Entry {
    responder: OnceCell<Arc<dyn Responder>>,
    factory: Option<ResponderFactory>,
}

#[derive(Default)]
pub struct ResponderRegistry {
    entries: HashMap<String, Arc<Entry>>,
    order: Vec<String>,
    /// Bridge shared by the model backends; stopped on
    /// [`ResponderRegistry::shutdown`] when it launched the worker.
    worker: Option<Arc<WorkerBridge>>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend named in the configuration.
    ///
    /// Blocking: with [`LoadPolicy::Eager`] this fetches tokenizers and waits
    /// for the worker to load each model.
    ///
    /// A worker launched along the way is stopped again if any backend fails.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        Self::with_worker(config, Arc::new(WorkerBridge::new(&config.worker)))
    }

    fn with_worker(config: &ServiceConfig, bridge: Arc<WorkerBridge>) -> Result<Self> {
        let mut registry = Self {
            worker: Some(bridge.clone()),
            ..Self::default()
        };

        if let Err(e) = registry.register_backends(config, &bridge) {
            if let Err(stop_err) = registry.shutdown() {
                warn!("Failed to stop generation worker: {}", stop_err);
            }
            return Err(e);
        }

        info!(
            "Registered backends ({:?}): {}",
            config.load_policy,
            registry.names().join(", ")
        );
        Ok(registry)
    }

    fn register_backends(&mut self, config: &ServiceConfig, bridge: &Arc<WorkerBridge>) -> Result<()> {
        let pb = match config.load_policy {
            LoadPolicy::Eager => {
                let pb = ProgressBar::new(config.backends.len() as u64);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
                {
                    pb.set_style(style);
                }
                Some(pb)
            }
            LoadPolicy::Lazy => None,
        };

        for backend in &config.backends {
            let factory = backend_factory(backend.clone(), config, bridge.clone());
            match &pb {
                Some(pb) => {
                    pb.set_message(format!("Loading {} ({})", backend.name, backend.kind));
                    let responder = factory().map_err(|e| {
                        pb.abandon_with_message(format!("Failed to load {}", backend.name));
                        e
                    })?;
                    self.register(backend.name.clone(), responder);
                    pb.inc(1);
                }
                None => self.register_lazy(backend.name.clone(), factory),
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message(format!("Loaded {} backends", self.len()));
        }
        Ok(())
    }

    /// Register a ready responder. Re-registering a name replaces it.
    pub fn register(&mut self, name: impl Into<String>, responder: Arc<dyn Responder>) {
        self.insert(
            name.into(),
            Entry {
                responder: OnceCell::new_with(Some(responder)),
                factory: None,
            },
        );
    }

    /// Register a responder built on its first resolution.
    pub fn register_lazy(&mut self, name: impl Into<String>, factory: ResponderFactory) {
        self.insert(
            name.into(),
            Entry {
                responder: OnceCell::new(),
                factory: Some(factory),
            },
        );
    }

    fn insert(&mut self, name: String, entry: Entry) {
        if self.entries.insert(name.clone(), Arc::new(entry)).is_some() {
            warn!("Backend '{}' registered twice; keeping the latest", name);
        } else {
            self.order.push(name);
        }
    }

    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Responder>> {
        let entry = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(name.to_string()))?;

        let responder = entry
            .responder
            .get_or_try_init(|| {
                let entry = entry.clone();
                let name = name.to_string();
                async move {
                    info!("Building backend '{}' on first use", name);
                    tokio::task::spawn_blocking(move || match &entry.factory {
                        Some(factory) => factory(),
                        None => Err(Error::Config(format!("Backend '{name}' has no factory"))),
                    })
                    .await
                    .map_err(|e| Error::Config(format!("Backend build task failed: {e}")))?
                }
            })
            .await?;

        Ok(responder.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stop the generation worker if this registry launched it. An externally
    /// managed worker is left running.
    pub fn shutdown(&self) -> Result<()> {
        let Some(bridge) = &self.worker else {
            return Ok(());
        };
        if !bridge.launched()? {
            return Ok(());
        }
        info!("Stopping generation worker");
        bridge.stop()
    }
}

fn backend_factory(
    backend: BackendConfig,
    config: &ServiceConfig,
    bridge: Arc<WorkerBridge>,
) -> ResponderFactory {
    let fallback_file: PathBuf = config.fallback_file.clone();
    let models_dir: PathBuf = config.models_dir.clone();
    let max_length = config.max_length;

    Box::new(move || {
        let responder: Arc<dyn Responder> = match backend.kind {
            BackendKind::Fallback => Arc::new(FallbackResponder::load(&fallback_file)?),
            _ => Arc::new(ModelResponder::load(
                &backend,
                &models_dir,
                bridge.clone(),
                max_length,
            )?),
        };

        if backend.serialize && backend.kind.is_model_backed() {
            Ok(Arc::new(Serialized::new(responder)))
        } else {
            Ok(responder)
        }
    })
}

/// Runs at most one `respond` call at a time on the wrapped responder, for
/// generation backends that are not reentrant.
pub struct Serialized {
    gate: Mutex<()>,
    inner: Arc<dyn Responder>,
}

impl Serialized {
    pub fn new(inner: Arc<dyn Responder>) -> Self {
        Self {
            gate: Mutex::new(()),
            inner,
        }
    }
}

impl Responder for Serialized {
    fn respond(&self, user_input: &str, history: &[String], personas: &[String]) -> Result<String> {
        // The gate guards no data, so a poisoned lock is still usable.
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.respond(user_input, history, personas)
    }
}
