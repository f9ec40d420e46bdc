//! Application state shared by the handlers

use std::sync::Arc;

use parley_core::{PersonaStore, ResponderRegistry};

#[derive(Clone)]
pub struct AppState {
    /// Backends by name; read-only after startup
    pub registry: Arc<ResponderRegistry>,
    pub personas: Arc<PersonaStore>,
}

impl AppState {
    pub fn new(registry: ResponderRegistry, personas: PersonaStore) -> Self {
        Self {
            registry: Arc::new(registry),
            personas: Arc::new(personas),
        }
    }
}
