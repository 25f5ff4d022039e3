//! Durable settings for a node
//!
//! Settings live in a small byte region with a fixed layout:
//!
//! | offset | len | field |
//! |---|---|---|
//! | 0 | 1 | name length (`0xFF` = never written) |
//! | 1 | 31 | name bytes |
//! | 32 | 1 | rgb brightness |
//! | 33 | 1 | status brightness |
//!
//! Anything unreadable falls back to defaults instead of failing boot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tally_core::{truncate_utf8, LOCAL_NAME_MAX};
use thiserror::Error;

use crate::state::DEFAULT_NAME;

/// Size of the persisted region
pub const SETTINGS_LEN: usize = 1 + LOCAL_NAME_MAX + 2;

const UNWRITTEN: u8 = 0xFF;
const RGB_OFFSET: usize = 1 + LOCAL_NAME_MAX;
const STATUS_OFFSET: usize = RGB_OFFSET + 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A byte region read at boot and rewritten on every settings change
pub trait Storage: Send {
    /// Current contents; empty if nothing was ever stored
    fn load(&self) -> Result<Vec<u8>, StorageError>;

    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Settings that survive a power cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSettings {
    pub name: String,
    pub rgb_brightness: u8,
    pub status_brightness: u8,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            rgb_brightness: 255,
            status_brightness: 255,
        }
    }
}

impl PersistedSettings {
    pub fn encode(&self) -> [u8; SETTINGS_LEN] {
        let mut buf = [0u8; SETTINGS_LEN];
        let name = truncate_utf8(&self.name, LOCAL_NAME_MAX).as_bytes();
        buf[0] = name.len() as u8;
        buf[1..1 + name.len()].copy_from_slice(name);
        buf[RGB_OFFSET] = self.rgb_brightness;
        buf[STATUS_OFFSET] = self.status_brightness;
        buf
    }

    /// Parse a stored region, substituting defaults for anything missing
    pub fn decode(bytes: &[u8]) -> Self {
        let defaults = Self::default();
        let name = match bytes.first() {
            Some(&len) if len != UNWRITTEN && len != 0 && len as usize <= LOCAL_NAME_MAX => bytes
                .get(1..1 + len as usize)
                .map(|raw| {
                    // Replacement characters can grow a corrupt name past the cap
                    truncate_utf8(&String::from_utf8_lossy(raw), LOCAL_NAME_MAX).to_string()
                }),
            _ => None,
        };
        Self {
            name: name.unwrap_or(defaults.name),
            rgb_brightness: bytes.get(RGB_OFFSET).copied().unwrap_or(defaults.rgb_brightness),
            status_brightness: bytes
                .get(STATUS_OFFSET)
                .copied()
                .unwrap_or(defaults.status_brightness),
        }
    }
}

/// Settings kept in a single file
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Vec<u8>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

/// Volatile storage; clones share the same region
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    region: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(bytes: &[u8]) -> Self {
        Self {
            region: Arc::new(Mutex::new(bytes.to_vec())),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.region.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Vec<u8>, StorageError> {
        Ok(self.contents())
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.region.lock().unwrap_or_else(|e| e.into_inner()) = bytes.to_vec();
        Ok(())
    }
}
