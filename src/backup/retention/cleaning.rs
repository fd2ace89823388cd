use crate::backup::repository::ExtendedRepository;
use crate::backup::restore_point::RestorePoint;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Decides which storages of an evicted restore point leave the disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CleaningAlgorithm {
    /// Keeps storages whose content is still covered by the oldest surviving
    /// restore point, deletes the rest. Kept storages stay until that point
    /// is evicted or deleted in turn.
    #[display("keep_shared")]
    KeepShared,
    /// Deletes every storage of the evicted point.
    #[default]
    #[display("delete_all")]
    DeleteAll,
}

impl CleaningAlgorithm {
    /// Cleans `victim` against the `boundary` restore point and returns the
    /// storages that were physically deleted.
    pub fn clean_restore_point<R: ExtendedRepository + ?Sized>(
        &self,
        victim: &RestorePoint,
        boundary: &RestorePoint,
        repository: &mut R,
    ) -> Result<Vec<PathBuf>> {
        let to_delete: Vec<PathBuf> = match self {
            CleaningAlgorithm::DeleteAll => victim.storage_names(),
            CleaningAlgorithm::KeepShared => {
                let boundary_storages = boundary.storage_names();
                victim
                    .storage_names()
                    .into_iter()
                    .filter(|name| {
                        let shared = repository.storages_share_content(name, &boundary_storages);
                        if shared {
                            debug!(
                                "Keeping {:?}, content still referenced by {}",
                                name,
                                boundary.id()
                            );
                        }
                        !shared
                    })
                    .collect()
            }
        };

        if !to_delete.is_empty() {
            repository
                .delete_storages(&to_delete)
                .with_msg(format!("Cleaning restore point {} by {} failed", victim.id(), self))?;
        }
        Ok(to_delete)
    }
}
