use crate::state::{RosterState, RunningTotals};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Instantané persistant : état validé, compteurs et dernière étape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    #[serde(default)]
    pub stage: Option<String>,
    pub state: RosterState,
    pub totals: RunningTotals,
}

impl RosterSnapshot {
    pub fn new(state: RosterState, totals: RunningTotals) -> Self {
        Self {
            stage: state.stages().last().cloned(),
            state,
            totals,
        }
    }
}

pub trait Storage {
    /// Charge un instantané depuis un support.
    fn load(&self) -> anyhow::Result<RosterSnapshot>;
    /// Sauvegarde de manière atomique.
    fn save(&self, snapshot: &RosterSnapshot) -> anyhow::Result<()>;
}

pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> anyhow::Result<RosterSnapshot> {
        let data =
            fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let snapshot: RosterSnapshot = serde_json::from_slice(&data)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))?;
        Ok(snapshot)
    }

    fn save(&self, snapshot: &RosterSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }
}
