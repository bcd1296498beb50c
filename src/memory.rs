//! Memory ledger: categorized, timestamped notes that outlive any task.

use crate::error::{Error, Result};
use crate::models::{MemoryCategory, MemoryEntry};
use crate::store::Store;

pub fn append(store: &Store, category: MemoryCategory, text: &str) -> Result<MemoryEntry> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Invalid("memory text must not be empty".to_string()));
    }
    let entry = store.append_memory(category, text)?;
    tracing::debug!(%category, "memory entry added");
    Ok(entry)
}

/// Entries of one category, or of all categories merged by timestamp.
pub fn list(store: &Store, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>> {
    let categories: Vec<MemoryCategory> = match category {
        Some(c) => vec![c],
        None => MemoryCategory::ALL.to_vec(),
    };
    let mut entries = Vec::new();
    for c in categories {
        entries.extend(store.read_memory(c)?);
    }
    // Stable: entries with equal timestamps keep their stream order.
    entries.sort_by_key(|e| e.timestamp);
    Ok(entries)
}
