use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use serde_json::{Map, Value};
use snafu::prelude::*;

/// Error when read or write persisted config
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConfigError {
    /// read or write config file failed
    #[snafu(display("access config file {} failed: {source}", path.display()))]
    Io {
        /// config file path
        path: PathBuf,
        /// source error
        source: std::io::Error,
    },

    /// config file content is not a flat json object
    #[snafu(display("config file {} is not a json object: {source}", path.display()))]
    Json {
        /// config file path
        path: PathBuf,
        /// source error
        source: serde_json::Error,
    },
}

/// A flat key-value config store.
///
/// Implementations must be cheap to read, the feed and reader session take a
/// fresh snapshot at the start of every attempt.
pub trait ConfigStore: Debug + Send + Sync {
    /// get raw value of key
    fn get(&self, key: &str) -> Option<Value>;

    /// set value of key
    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;

    /// remove key
    fn remove(&self, key: &str) -> Result<(), ConfigError>;

    /// set many keys together
    fn set_all(&self, entries: Vec<(&str, Value)>) -> Result<(), ConfigError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// check if key exists
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// get value of key as string
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)?.as_str().map(str::to_string)
    }

    /// get value of key as bool
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// get value of key as integer
    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }
}

/// In-process config store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Config store persisted as one flat json object file.
///
/// The whole file is rewritten after every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl FileStore {
    /// Open store at path, a missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let data = std::fs::read(&path).context(error::Io { path: &path })?;
            serde_json::from_slice(&data).context(error::Json { path: &path })?
        } else {
            log::debug!("Config file {} not exists, start empty", path.display());
            Map::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// file path of this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut values);

        let data = serde_json::to_vec_pretty(&*values).context(error::Json { path: &self.path })?;
        std::fs::write(&self.path, data).context(error::Io { path: &self.path })?;

        log::trace!("Config file {} written", self.path.display());

        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.mutate(|values| {
            values.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.mutate(|values| {
            values.remove(key);
        })
    }

    fn set_all(&self, entries: Vec<(&str, Value)>) -> Result<(), ConfigError> {
        self.mutate(|values| {
            for (key, value) in entries {
                values.insert(key.to_string(), value);
            }
        })
    }
}
