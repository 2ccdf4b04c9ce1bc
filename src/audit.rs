//! Append-only audit log with per-day Merkle roots.
//!
//! Events are serialized once, with object keys in sorted order, and the
//! resulting line is what gets hashed. Lines are grouped by the UTC calendar
//! day on which they were appended and are never modified or reordered.
//!
//! # Merkle root
//!
//! Each line is hashed with SHA-256 to form a leaf. Levels are folded
//! pairwise, `SHA-256(left || right)` over the raw 32-byte digests, until a
//! single digest remains. An odd node at the end of a level is paired with
//! itself. A day with no events has the empty string as its root. The root
//! is recomputed on every call, so it always covers the latest append.
//!
//! # Durable ledger
//!
//! [`AuditLog::open`] mirrors each day to `<dir>/<YYYY-MM-DD>.jsonl`, one
//! line per event, opened in append mode. Existing files are replayed on
//! open so roots survive restarts. A failed write is logged; the in-memory
//! ledger is updated regardless, so [`AuditLog::append`] never fails.
//!
//! Appends are serialized by the ledger lock, which is held across the file
//! write so each day file lists events in in-memory order. The write is
//! synchronous: an append from async code blocks its worker for one small
//! `write` call.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::models::AuditEvent;

const LEDGER_EXT: &str = "jsonl";

#[derive(Default)]
pub struct AuditLog {
    ledgers: Mutex<BTreeMap<NaiveDate, Vec<String>>>,
    dir: Option<PathBuf>,
}

impl AuditLog {
    /// In-memory log; nothing is written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log backed by `dir`, replaying any day files already present.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create audit directory: {}", dir.display()))?;

        let mut ledgers = BTreeMap::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read audit directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LEDGER_EXT) {
                continue;
            }
            let day = match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            {
                Some(day) => day,
                None => continue,
            };

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read audit ledger: {}", path.display()))?;
            let lines: Vec<String> = content
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            ledgers.insert(day, lines);
        }

        tracing::debug!(dir = %dir.display(), days = ledgers.len(), "audit ledger replayed");
        Ok(Self {
            ledgers: Mutex::new(ledgers),
            dir: Some(dir.to_path_buf()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NaiveDate, Vec<String>>> {
        self.ledgers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `event` to today's (UTC) ledger.
    pub fn append(&self, event: &AuditEvent) {
        self.append_on(Utc::now().date_naive(), event);
    }

    /// Append `event` to the ledger for `day`.
    pub fn append_on(&self, day: NaiveDate, event: &AuditEvent) {
        let line = match serialize(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize audit event");
                return;
            }
        };

        let mut ledgers = self.lock();
        if let Some(dir) = &self.dir {
            if let Err(e) = write_line(dir, day, &line) {
                tracing::error!(day = %day, error = %format!("{:#}", e), "audit write failed");
            }
        }
        ledgers.entry(day).or_default().push(line);
    }

    /// Serialized events recorded on `day`, in append order.
    pub fn events(&self, day: NaiveDate) -> Vec<String> {
        self.lock().get(&day).cloned().unwrap_or_default()
    }

    /// Days that have at least one event, oldest first.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.lock().keys().copied().collect()
    }

    /// Hex Merkle root of `day`'s events, or `""` when there are none.
    pub fn merkle_root(&self, day: NaiveDate) -> String {
        let ledgers = self.lock();
        match ledgers.get(&day) {
            Some(lines) => merkle_root(lines.as_slice()),
            None => String::new(),
        }
    }
}

/// Deterministic serialization: `serde_json::Value` objects keep their keys
/// sorted, so equal events always produce identical lines.
fn serialize(event: &AuditEvent) -> Result<String> {
    let value = serde_json::to_value(event)?;
    Ok(serde_json::to_string(&value)?)
}

fn write_line(dir: &Path, day: NaiveDate, line: &str) -> Result<()> {
    let path = dir.join(format!("{}.{}", day.format("%Y-%m-%d"), LEDGER_EXT));
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open audit ledger: {}", path.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Merkle root over an ordered list of serialized events.
pub fn merkle_root<S: AsRef<str>>(lines: &[S]) -> String {
    let mut level: Vec<[u8; 32]> = lines
        .iter()
        .map(|l| sha256(&[l.as_ref().as_bytes()]))
        .collect();
    if level.is_empty() {
        return String::new();
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                sha256(&[left.as_slice(), right.as_slice()])
            })
            .collect();
    }
    hex::encode(level[0])
}
