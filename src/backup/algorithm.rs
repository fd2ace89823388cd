use crate::backup::ids::{JobId, StorageId};
use crate::backup::repository::Repository;
use crate::backup::restore_point::Storage;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// How the sources of one restore point are spread over storages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum StorageCreationAlgorithm {
    /// Every source in one archive.
    #[default]
    SingleStorage,
    /// One archive per source.
    Split,
}

impl StorageCreationAlgorithm {
    /// Creates the storages for `sources` under `job_id`, each with a fresh id.
    /// No sources means no storages.
    pub fn create_storages<R: Repository + ?Sized>(
        &self,
        repository: &mut R,
        sources: &[PathBuf],
        job_id: &JobId,
    ) -> Result<Vec<Storage>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let storages = match self {
            StorageCreationAlgorithm::SingleStorage => {
                let name = repository.create_storage(sources, job_id, &StorageId::new())?;
                vec![Storage::new(name, sources.to_vec())]
            }
            StorageCreationAlgorithm::Split => split(repository, sources, job_id)?,
        };

        debug!("{:?} produced {} storage(s) for {}", self, storages.len(), job_id);
        Ok(storages)
    }
}

fn split<R: Repository + ?Sized>(
    repository: &mut R,
    sources: &[PathBuf],
    job_id: &JobId,
) -> Result<Vec<Storage>> {
    let mut storages = Vec::with_capacity(sources.len());
    for source in sources {
        match repository.create_single_storage(source, job_id, &StorageId::new()) {
            Ok(name) => storages.push(Storage::new(name, vec![source.clone()])),
            Err(e) => return Err(discard_partial(repository, storages, e)),
        }
    }
    Ok(storages)
}

/// Deletes the storages a failed run already wrote, keeping `error` as the cause.
fn discard_partial<R: Repository + ?Sized>(
    repository: &mut R,
    created: Vec<Storage>,
    error: Error,
) -> Error {
    if created.is_empty() {
        return error;
    }

    let names: Vec<PathBuf> = created.iter().map(|s| s.name().clone()).collect();
    warn!("Discarding {} storage(s) of an incomplete run", names.len());
    match repository.delete_storages(&names) {
        Ok(_) => error,
        Err(cleanup) => error.chain(cleanup.with_msg("Discarding partial storages failed")),
    }
}
