//! File ledger for incremental refresh
//!
//! One entry per tracked source file: its content hash, when it was analyzed,
//! and which graph entities it produced. Comparing a fresh hash with the entry
//! decides whether the file needs re-analysis; the entity list tells refresh
//! which nodes and embeddings go stale without re-parsing the old content.

use crate::types::NodeId;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Ledger record for one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub path: PathBuf,
    /// SHA256 of the file content, hex encoded
    pub content_hash: String,
    /// UTC seconds since UNIX_EPOCH
    pub analyzed_at: u64,
    pub size_bytes: u64,
    pub language: Option<String>,
    /// Entities derived from this file, sorted
    pub entities: Vec<NodeId>,
}

impl LedgerEntry {
    pub fn new(path: impl Into<PathBuf>, content: &[u8], mut entities: Vec<NodeId>) -> Self {
        let path = path.into();
        entities.sort();
        entities.dedup();
        Self {
            language: detect_language(&path),
            path,
            content_hash: calculate_hash(content),
            analyzed_at: get_utc_timestamp(),
            size_bytes: content.len() as u64,
            entities,
        }
    }

    /// Check if file content has changed based on hash
    pub fn has_changed(&self, content_hash: &str) -> bool {
        self.content_hash != content_hash
    }
}

/// Concurrent path → entry table
#[derive(Debug, Default)]
pub struct FileLedger {
    entries: DashMap<PathBuf, LedgerEntry>,
}

impl FileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let ledger = Self::new();
        ledger.extend(entries);
        ledger
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = LedgerEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn insert(&self, entry: LedgerEntry) -> Option<LedgerEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    pub fn get(&self, path: &Path) -> Option<LedgerEntry> {
        self.entries.get(path).map(|e| e.clone())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn remove(&self, path: &Path) -> Option<LedgerEntry> {
        self.entries.remove(path).map(|(_, entry)| entry)
    }

    /// True when the ledger holds `path` with exactly this hash.
    pub fn is_unchanged(&self, path: &Path, content_hash: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| !entry.has_changed(content_hash))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Tracked paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Snapshot of all entries, sorted by path.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Get current UTC timestamp in seconds since UNIX_EPOCH
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Best-effort language tag from the file extension.
pub fn detect_language(path: &Path) -> Option<String> {
    let language = match path.extension()?.to_str()? {
        "ex" | "exs" => "elixir",
        "erl" | "hrl" => "erlang",
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "php" => "php",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        _ => return None,
    };
    Some(language.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_calculation() {
        let hash1 = calculate_hash(b"Hello, World!");
        let hash2 = calculate_hash(b"Hello, World!");
        let hash3 = calculate_hash(b"Hello, world!");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_entry_tracks_entities_and_language() {
        let entry = LedgerEntry::new(
            "lib/billing.ex",
            b"defmodule Billing do end",
            vec![NodeId::module("Billing"), NodeId::module("Billing")],
        );

        assert_eq!(entry.language.as_deref(), Some("elixir"));
        assert_eq!(entry.size_bytes, 24);
        assert_eq!(entry.entities, vec![NodeId::module("Billing")]);
        assert!(!entry.has_changed(&calculate_hash(b"defmodule Billing do end")));
    }

    #[test]
    fn test_ledger_unchanged_check() {
        let ledger = FileLedger::new();
        let entry = LedgerEntry::new("a.ex", b"one", Vec::new());
        let hash = entry.content_hash.clone();
        ledger.insert(entry);

        assert!(ledger.is_unchanged(Path::new("a.ex"), &hash));
        assert!(!ledger.is_unchanged(Path::new("a.ex"), &calculate_hash(b"two")));
        assert!(!ledger.is_unchanged(Path::new("b.ex"), &hash));
    }
}
