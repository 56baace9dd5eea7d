//! Client-side state that survives between invocations.
//!
//! Everything lives in one JSON object in `.civic/storage.json`. The typed
//! containers below each own one key.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::UserId;
use crate::pipeline::{FilterState, ViewMode};

pub const STORAGE_FILE: &str = "storage.json";

pub const TOKEN_KEY: &str = "token";
pub const VIEW_MODE_KEY: &str = "ui.view_mode";
pub const FILTERS_KEY: &str = "ui.filters";

pub fn chat_key(user: UserId) -> String {
    format!("chat.{}", user)
}

#[derive(Debug, Default)]
pub struct LocalStorage {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Value>,
}

impl LocalStorage {
    pub fn open(civic_dir: &Path) -> Result<Self> {
        let path = civic_dir.join(STORAGE_FILE);
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "local storage is corrupt, starting empty");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(LocalStorage {
            path: Some(path),
            entries,
        })
    }

    /// Storage that is never written to disk.
    pub fn in_memory() -> Self {
        LocalStorage::default()
    }

    /// Typed read. A value that no longer matches its type reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable stored value");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("Failed to serialize stored value '{}'", key))?;
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// The session token of whoever is logged in on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub token: Option<String>,
}

impl AuthState {
    pub fn load(storage: &LocalStorage) -> Self {
        AuthState {
            token: storage.get(TOKEN_KEY),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn login(storage: &mut LocalStorage, token: &str) -> Result<Self> {
        storage.set(TOKEN_KEY, &token)?;
        Ok(AuthState {
            token: Some(token.to_string()),
        })
    }

    pub fn logout(storage: &mut LocalStorage) -> Result<()> {
        storage.remove(TOKEN_KEY)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPreferences {
    pub view_mode: ViewMode,
}

impl UiPreferences {
    pub fn load(storage: &LocalStorage) -> Self {
        UiPreferences {
            view_mode: storage.get(VIEW_MODE_KEY).unwrap_or_default(),
        }
    }

    pub fn save(&self, storage: &mut LocalStorage) -> Result<()> {
        storage.set(VIEW_MODE_KEY, &self.view_mode)
    }
}

/// Saved dashboard filters, or a fresh state with the given page size.
pub fn load_filters(storage: &LocalStorage, default_limit: usize) -> FilterState {
    storage
        .get(FILTERS_KEY)
        .unwrap_or_else(|| FilterState::with_limit(default_limit))
}

pub fn save_filters(storage: &mut LocalStorage, filters: &FilterState) -> Result<()> {
    storage.set(FILTERS_KEY, filters)
}

/// Monotonic counter used to discard responses to superseded requests.
#[derive(Debug, Default)]
pub struct Generation {
    current: u64,
}

/// Identifies the request a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Generation {
    pub fn new() -> Self {
        Generation::default()
    }

    /// Starts a new request; every earlier ticket becomes stale.
    pub fn next(&mut self) -> Ticket {
        self.current += 1;
        Ticket(self.current)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.current
    }

    /// Passes `value` through only if `ticket` is the latest one issued.
    pub fn accept<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            warn!(
                ticket = ticket.0,
                current = self.current,
                "dropping stale response"
            );
            None
        }
    }
}
