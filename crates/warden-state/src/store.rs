//! On-disk snapshot store.
//!
//! Write path: copy the current primary to `<name>.json.bak`, write the
//! new snapshot to a temp file, fsync, then rename over the primary. A
//! crash at any point leaves at least one readable copy behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StateError};

/// Snapshot format version written into every file.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The tables the store persists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Cached admin rosters per group.
    Admins,
    /// Per-user moderation records.
    Ledger,
    /// Per-group configuration.
    Configs,
    /// Open report sessions.
    Reports,
    /// The fleet-wide bad-user set.
    BadIds,
}

impl TableKind {
    /// All tables, in the order they are loaded at startup.
    pub const ALL: [TableKind; 5] = [
        TableKind::Admins,
        TableKind::Ledger,
        TableKind::Configs,
        TableKind::Reports,
        TableKind::BadIds,
    ];

    /// Stable on-disk name for this table.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Admins => "admins",
            TableKind::Ledger => "ledger",
            TableKind::Configs => "configs",
            TableKind::Reports => "reports",
            TableKind::BadIds => "bad_ids",
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a, T: Serialize> {
    version: u32,
    table: &'a T,
}

#[derive(Deserialize)]
struct Snapshot<T> {
    version: u32,
    table: T,
}

/// Persists tables as versioned JSON snapshots under a data directory.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(StateStore { dir })
    }

    fn primary_path(&self, kind: TableKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.as_str()))
    }

    fn backup_path(&self, kind: TableKind) -> PathBuf {
        self.dir.join(format!("{}.json.bak", kind.as_str()))
    }

    /// Saves a table, keeping the previous snapshot as backup.
    pub fn save<T: Serialize>(&self, kind: TableKind, table: &T) -> Result<()> {
        let primary = self.primary_path(kind);
        if primary.exists() {
            fs::copy(&primary, self.backup_path(kind))?;
        }

        let bytes = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            table,
        })?;

        let tmp = self.dir.join(format!("{}.json.tmp", kind.as_str()));
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &primary)?;
        debug!(table = kind.as_str(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    /// Loads a table, recovering from the backup if the primary is
    /// damaged.
    ///
    /// A table that has never been saved loads as `T::default()`. A table
    /// whose primary and backup are both unreadable is a fatal
    /// [`StateError::Corrupt`].
    pub fn load<T>(&self, kind: TableKind) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let primary = self.primary_path(kind);
        let backup = self.backup_path(kind);

        if !primary.exists() && !backup.exists() {
            debug!(table = kind.as_str(), "no snapshot on disk, starting empty");
            return Ok(T::default());
        }

        if primary.exists() {
            match read_snapshot(&primary) {
                Ok(table) => return Ok(table),
                Err(e) => {
                    warn!(
                        table = kind.as_str(),
                        error = %e,
                        "primary snapshot unreadable, trying backup"
                    );
                }
            }
        }

        if backup.exists() {
            match read_snapshot(&backup) {
                Ok(table) => {
                    warn!(table = kind.as_str(), "recovered table from backup snapshot");
                    return Ok(table);
                }
                Err(e) => {
                    warn!(table = kind.as_str(), error = %e, "backup snapshot unreadable");
                }
            }
        }

        Err(StateError::Corrupt {
            table: kind.as_str(),
        })
    }

    /// Returns the raw bytes of the current primary snapshot, if any.
    ///
    /// Used when shipping tables to the fleet as encrypted attachments.
    pub fn raw(&self, kind: TableKind) -> Result<Option<Vec<u8>>> {
        let primary = self.primary_path(kind);
        if !primary.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(primary)?))
    }
}

/// Decodes raw snapshot bytes, e.g. a table received from the fleet.
pub fn decode_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let snapshot: Snapshot<T> = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StateError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported snapshot version {}", snapshot.version),
        )));
    }
    Ok(snapshot.table)
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let bytes = fs::read(path)?;
    decode_snapshot(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
