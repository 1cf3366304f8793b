// Append-only transfer ledger used for cross-run idempotency

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only record of already-mirrored `repository:tag` pairs.
///
/// Entries are never rewritten or removed; the presence of a matching line
/// is the sole idempotency signal. An entry is written only after a
/// confirmed successful push, so a crash in between causes at worst a
/// harmless re-transfer on the next run.
pub struct TransferLedger {
    path: PathBuf,
}

impl TransferLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// True iff a line exactly equal to `repository:tag` exists. A missing
    /// ledger file means nothing has been recorded yet, not an error.
    pub fn is_recorded(&self, repository: &str, tag: &str) -> Result<bool> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read ledger {}", self.path.display())
                })
            }
        };
        let entry = format!("{}:{}", repository, tag);
        Ok(content.lines().any(|line| line == entry))
    }

    /// Append `repository:tag` to the ledger. Call only after a confirmed
    /// successful push.
    pub fn record(&self, repository: &str, tag: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;
        writeln!(file, "{}:{}", repository, tag)
            .with_context(|| format!("Failed to append to ledger {}", self.path.display()))?;
        Ok(())
    }
}
