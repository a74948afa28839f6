//! Session-scoped key/value context.
//!
//! Components receive a [`SessionContext`] instead of reaching for ambient
//! state. The CLI uses [`FileSession`] to remember each app's current page and
//! search query between invocations; `session clear` wipes it.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde_json::Value as JsonValue;

use crate::error::{AppError, Result};

pub const SESSION_FILE_NAME: &str = "session.json";

pub trait SessionContext {
    fn read(&self, key: &str) -> Result<Option<JsonValue>>;
    fn write(&self, key: &str, value: JsonValue) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

pub fn page_key(app: &str) -> String {
    format!("runtime.{app}.page")
}

pub fn query_key(app: &str) -> String {
    format!("runtime.{app}.query")
}

/// Reads a string entry, treating anything else as absent.
pub fn read_string(session: &dyn SessionContext, key: &str) -> Result<Option<String>> {
    Ok(session.read(key)?.and_then(|value| match value {
        JsonValue::String(s) => Some(s),
        _ => None,
    }))
}

#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<BTreeMap<String, JsonValue>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<String, JsonValue>) -> T) -> Result<T> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| AppError::storage("Session lock poisoned"))?;
        Ok(f(&mut values))
    }
}

impl SessionContext for MemorySession {
    fn read(&self, key: &str) -> Result<Option<JsonValue>> {
        self.with(|values| values.get(key).cloned())
    }

    fn write(&self, key: &str, value: JsonValue) -> Result<()> {
        self.with(|values| {
            values.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with(|values| {
            values.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.with(BTreeMap::clear)
    }
}

/// JSON object on disk, rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileSession {
    path: PathBuf,
}

impl FileSession {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, JsonValue>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&self.path)
            .map_err(|err| AppError::storage(format!("Opening {:?}: {err}", self.path)))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| AppError::storage(format!("Parsing {:?}: {err}", self.path)))
    }

    fn store(&self, values: &BTreeMap<String, JsonValue>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::storage(format!("Creating {parent:?}: {err}")))?;
        }
        let body = serde_json::to_vec_pretty(values)
            .map_err(|err| AppError::storage(format!("Serializing session: {err}")))?;
        fs::write(&self.path, body)
            .map_err(|err| AppError::storage(format!("Writing {:?}: {err}", self.path)))
    }
}

impl SessionContext for FileSession {
    fn read(&self, key: &str) -> Result<Option<JsonValue>> {
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: JsonValue) -> Result<()> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value);
        self.store(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.store(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::storage(format!(
                "Removing {:?}: {err}",
                self.path
            ))),
        }
    }
}
