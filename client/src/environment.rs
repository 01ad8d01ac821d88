//! Host services the session needs from its surroundings: navigation, user
//! alerts and a small persistent key/value store.

use crate::error::EnvironmentError;
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub trait Environment: Send {
    fn navigate(&mut self, path: &str);
    fn alert(&mut self, message: &str);
    fn get_item(&self, key: &str) -> Result<Option<String>, EnvironmentError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), EnvironmentError>;
}

/// Key/value store persisted as a JSON object on disk, so a host and a guest
/// running on the same machine share private room ids.
pub struct FileEnvironment {
    path: PathBuf,
    navigations: Vec<String>,
}

impl FileEnvironment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            navigations: Vec::new(),
        }
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    fn load(&self) -> Result<HashMap<String, String>, EnvironmentError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Environment for FileEnvironment {
    fn navigate(&mut self, path: &str) {
        info!("Navigating to {}", path);
        self.navigations.push(path.to_string());
    }

    fn alert(&mut self, message: &str) {
        warn!("{}", message);
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, EnvironmentError> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), EnvironmentError> {
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        std::fs::write(&self.path, serde_json::to_string_pretty(&items)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<String, String>,
    navigations: Vec<String>,
    alerts: Vec<String>,
}

/// In-memory environment. Clones share state, so a test can keep a handle
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvironment {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.with_state(|state| state.navigations.clone())
    }

    pub fn alerts(&self) -> Vec<String> {
        self.with_state(|state| state.alerts.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Environment for MemoryEnvironment {
    fn navigate(&mut self, path: &str) {
        self.with_state(|state| state.navigations.push(path.to_string()));
    }

    fn alert(&mut self, message: &str) {
        self.with_state(|state| state.alerts.push(message.to_string()));
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, EnvironmentError> {
        Ok(self.with_state(|state| state.items.get(key).cloned()))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), EnvironmentError> {
        self.with_state(|state| {
            state.items.insert(key.to_string(), value.to_string());
        });
        Ok(())
    }
}
