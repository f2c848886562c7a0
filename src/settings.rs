//! Persisted user settings
//!
//! A flat JSON object of string keys to primitive values. Every mutation is
//! written through immediately (temp file, then rename), so a crash never
//! leaves a half-written file behind.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::routines::PageKind;
use crate::schedule::Interval;

pub const AUTO_REFRESH_ENABLED: &str = "auto_refresh_enabled";
pub const INDICATOR_VISIBLE: &str = "indicator_visible";
pub const FULL_SCREEN_INTERVAL: &str = "full_screen_interval_secs";

pub fn interval_key(kind: PageKind) -> String {
    format!("{}_interval_secs", kind.key_prefix())
}

pub fn started_at_key(kind: PageKind) -> String {
    format!("{}_started_at", kind.key_prefix())
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Settings I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Settings file {path} is not a JSON object: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl SettingsStore {
    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, starting empty", path.display());
                Map::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value under `key`, or `None` when absent or of the wrong shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.lock().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring stored {}: {}", key, e);
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    /// Copy of every stored value
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.lock().clone()
    }

    /// Stored interval for `kind`, or `default` if none is stored or the
    /// stored one is out of range
    pub fn interval_for(&self, kind: PageKind, default: Interval) -> Interval {
        self.interval_at(&interval_key(kind), default)
    }

    fn interval_at(&self, key: &str, default: Interval) -> Interval {
        self.get::<u64>(key)
            .and_then(|secs| Interval::from_secs(secs).ok())
            .unwrap_or(default)
    }

    /// Stored full-screen upkeep interval, falling back like [`Self::interval_for`]
    pub fn full_screen_interval(&self, default: Interval) -> Interval {
        self.interval_at(FULL_SCREEN_INTERVAL, default)
    }

    pub fn set_full_screen_interval(&self, interval: Interval) -> Result<(), StoreError> {
        self.set(FULL_SCREEN_INTERVAL, interval.as_secs())
    }

    pub fn set_interval_for(&self, kind: PageKind, interval: Interval) -> Result<(), StoreError> {
        self.set(&interval_key(kind), interval.as_secs())
    }

    pub fn started_at_for(&self, kind: PageKind) -> Option<DateTime<Utc>> {
        self.get(&started_at_key(kind))
    }

    /// Record when `kind`'s countdown began; `None` clears it
    pub fn set_started_at_for(
        &self,
        kind: PageKind,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        match at {
            Some(at) => self.set(&started_at_key(kind), at),
            None => self.remove(&started_at_key(kind)),
        }
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(values).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}
