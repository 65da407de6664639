//! File-backed store mapping call sid to the callee's keypad response.
//!
//! The webhook handler writes entries as digits arrive; the coordinator
//! reads them when it finalizes a batch.  Both sides go through this store
//! rather than any shared global, and `get` always re-reads the file so
//! either side sees the other's writes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::Result;

/// One recorded response: who was called and what they pressed
/// (`confirmed`, `cancelled`, `timeout`, or `invalid_<digit>`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResponseEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub response: String,
}

#[derive(Clone)]
pub struct ResponseStore {
    path: PathBuf,
}

impl ResponseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, ResponseEntry> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "error loading responses");
                HashMap::new()
            }
        }
    }

    fn save(&self, map: &HashMap<String, ResponseEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map).unwrap_or_else(|_| "{}".to_string());
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn get(&self, call_sid: &str) -> Option<ResponseEntry> {
        self.load().get(call_sid).cloned()
    }

    /// Record a response for a call, preserving any previously stored name
    /// when the new entry leaves it empty.
    pub fn put(&self, call_sid: &str, mut entry: ResponseEntry) -> Result<()> {
        let mut map = self.load();
        if entry.name.is_empty() {
            if let Some(existing) = map.get(call_sid) {
                entry.name = existing.name.clone();
            }
        }
        map.insert(call_sid.to_string(), entry);
        self.save(&map)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&HashMap::new())?;
        info!("cleared all stored call responses");
        Ok(())
    }
}
