//! Save and restore canonical document sets as a JSON array.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::CanonicalDocument;

/// Write `docs` to `path`, replacing any existing file.
pub fn backup_docs(docs: &[CanonicalDocument], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(docs)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write backup: {}", path.display()))?;
    Ok(())
}

/// Read documents written by [`backup_docs`]. A missing file is an empty set.
pub fn restore_docs(path: &Path) -> Result<Vec<CanonicalDocument>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup: {}", path.display()))?;
    let docs = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse backup: {}", path.display()))?;
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::{RawDocument, RawPayload};
    use crate::normalize::normalize;

    #[test]
    fn test_backup_and_restore() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("docs.json");
        let docs = vec![normalize(RawDocument {
            title: "Alice".to_string(),
            summary: "s".to_string(),
            url: "https://example.com/alice".to_string(),
            source: "wikipedia".to_string(),
            fetched_at: Utc::now(),
            raw: RawPayload::Wiki {
                snippet: "Alice is".to_string(),
                pageid: Some(7),
                timestamp: None,
            },
        })];

        backup_docs(&docs, &path).unwrap();
        assert_eq!(restore_docs(&path).unwrap(), docs);
    }

    #[test]
    fn test_restore_missing_file_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(restore_docs(&tmp.path().join("absent.json")).unwrap().is_empty());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(restore_docs(&path).is_err());
    }
}
