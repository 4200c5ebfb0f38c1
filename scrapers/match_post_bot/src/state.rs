//! Local match -> post mapping used to find posts for later cleanup.
//!
//! The file is read once, mutated in memory and rewritten whole. There is no
//! locking: overlapping runs can lose each other's updates.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{formatter::slugify, types::UrlMappingEntry};

/// Stable key for a fixture: hash of the normalised team names and date.
pub fn match_key(home_team: &str, away_team: &str, date: &str) -> String {
    let normalized = format!(
        "{}|{}|{}",
        slugify(home_team),
        slugify(away_team),
        date.trim()
    );
    // Non-Latin names slugify to nothing, so hash the lowercased raw names too.
    let raw = format!("{}|{}", home_team.trim().to_lowercase(), away_team.trim().to_lowercase());
    let digest = Sha256::digest(format!("{}#{}", normalized, raw).as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

#[derive(Debug)]
pub struct UrlMappingStore {
    path: PathBuf,
    entries: BTreeMap<String, UrlMappingEntry>,
}

impl UrlMappingStore {
    /// Missing file gives an empty store; a corrupt one is logged and ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read mapping file {:?}", path))?;
            match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring unreadable mapping file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        info!("Loaded {} mapping entries from {:?}", entries.len(), path);
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json).with_context(|| format!("Failed to write mapping file {:?}", self.path))?;
        info!("Saved {} mapping entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }

    pub fn upsert(&mut self, key: String, entry: UrlMappingEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<UrlMappingEntry> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&UrlMappingEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UrlMappingEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
