use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusty_bridge_core::{PortError, SessionStorePort};

/// Process-local key/value store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySessionStore {
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("session store lock poisoned: {e}")))
    }
}

impl SessionStorePort for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PortError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PortError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Key/value store persisted as one JSON object; survives restarts the way
/// browser local storage survives reloads.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, String>, PortError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                PortError::Validation(format!("{}: invalid session file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PortError::Transport(format!(
                "{}: read failed: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), PortError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PortError::Transport(format!("{}: mkdir failed: {e}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| PortError::Validation(format!("session encode failed: {e}")))?;
        fs::write(&self.path, raw).map_err(|e| {
            PortError::Transport(format!("{}: write failed: {e}", self.path.display()))
        })
    }

    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), PortError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|e| PortError::Transport(format!("session file lock poisoned: {e}")))?;
        let mut entries = self.read()?;
        change(&mut entries);
        self.write(&entries)
    }
}

impl SessionStorePort for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PortError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn delete(&self, key: &str) -> Result<(), PortError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
