//! Snapshot records: job objects, storages, restore points and the backup
//! history that holds them.
//!
//! Everything here is plain data. Restore points are never edited once built;
//! the [`Backup`] only gains or loses them as whole units.

use crate::backup::ids::RestorePointId;
use chrono::{DateTime, Utc};
use derive_more::From;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// A source path tracked by a backup job. Two job objects are the same when
/// their paths are.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, From, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct JobObject {
    full_name: PathBuf,
}

impl JobObject {
    pub fn new<P: Into<PathBuf>>(full_name: P) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

impl Display for JobObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name.display())
    }
}

impl From<&str> for JobObject {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One archive file and the source paths packed into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct Storage {
    name: PathBuf,
    sources: Vec<PathBuf>,
}

impl Storage {
    pub fn new<P: Into<PathBuf>>(name: P, sources: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            sources,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct RestorePoint {
    id: RestorePointId,
    created_at: DateTime<Utc>,
    storages: Vec<Storage>,
}

impl RestorePoint {
    /// Builds a restore point stamped with `created_at`, or now.
    pub fn new(storages: Vec<Storage>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: RestorePointId::new(),
            created_at: created_at.unwrap_or_else(Utc::now),
            storages,
        }
    }

    pub fn storage_names(&self) -> Vec<PathBuf> {
        self.storages.iter().map(|s| s.name.clone()).collect()
    }

    pub fn contains_storage<P: AsRef<Path>>(&self, name: P) -> bool {
        self.storages.iter().any(|s| s.name == name.as_ref())
    }

    /// One line description used in retention reports.
    pub fn info(&self) -> String {
        format!(
            "Restore point {} created at {} with {} storage(s): {}",
            self.id,
            self.created_at.to_rfc3339(),
            self.storages.len(),
            self.storages.iter().map(|s| s.name.display()).join(", ")
        )
    }
}

/// A storage of an evicted restore point left on disk because a live point
/// still covers its content. It goes once `covered_by` leaves the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct RetainedStorage {
    storage: Storage,
    covered_by: RestorePointId,
}

impl RetainedStorage {
    pub fn new(storage: Storage, covered_by: RestorePointId) -> Self {
        Self {
            storage,
            covered_by,
        }
    }
}

/// Ordered restore point history of one job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct Backup {
    restore_points: Vec<RestorePoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    retained_storages: Vec<RetainedStorage>,
}

impl Backup {
    pub fn add_restore_point(&mut self, restore_point: RestorePoint) {
        self.restore_points.push(restore_point);
    }

    /// Removes the restore point with `id`, reporting whether there was one.
    pub fn delete_restore_point(&mut self, id: &RestorePointId) -> bool {
        match self.restore_points.iter().position(|rp| rp.id == *id) {
            Some(pos) => {
                self.restore_points.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn retain_storage(&mut self, retained: RetainedStorage) {
        self.retained_storages.push(retained);
    }

    /// Forgets the storages retained on behalf of any of `ids` and returns them.
    pub fn release_retained(&mut self, ids: &[RestorePointId]) -> Vec<RetainedStorage> {
        let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retained_storages)
            .into_iter()
            .partition(|r| ids.contains(&r.covered_by));
        self.retained_storages = kept;
        released
    }

    pub fn restore_point(&self, id: &RestorePointId) -> Option<&RestorePoint> {
        self.restore_points.iter().find(|rp| rp.id == *id)
    }

    pub fn len(&self) -> usize {
        self.restore_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restore_points.is_empty()
    }
}
