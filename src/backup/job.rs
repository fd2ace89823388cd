use crate::backup::algorithm::StorageCreationAlgorithm;
use crate::backup::archive::entry_name;
use crate::backup::ids::{JobId, RestorePointId};
use crate::backup::repository::{ExtendedRepository, Repository, SharedRepository};
use crate::backup::restore_point::{Backup, JobObject, RestorePoint};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::logger::RetentionLogger;
use crate::backup::retention::RetentionController;
use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the content of a restore point goes back to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Every file lands in this directory under its own file name.
    Location(PathBuf),
    /// Every file goes back to the path it was backed up from.
    Original,
}

/// Everything a job owns, in serializable form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct JobState {
    id: JobId,
    #[serde(default)]
    algorithm: StorageCreationAlgorithm,
    job_objects: Vec<JobObject>,
    #[serde(default)]
    backup: Backup,
}

/// Objects are stored in archives under their file name, two of them may not
/// share one.
fn check_name_clash(existing: &[JobObject], object: &JobObject) -> Result<()> {
    let name = entry_name(object.full_name())?;
    match existing
        .iter()
        .find(|o| entry_name(o.full_name()).is_ok_and(|n| n == name))
    {
        Some(clash) => Err(Error::conflict(format!(
            "job object {} has the same file name as {}",
            object, clash
        ))),
        None => Ok(()),
    }
}

/// A set of source paths backed up together into restore points.
pub struct BackupJob<R> {
    repository: SharedRepository<R>,
    state: JobState,
}

impl<R: Repository> BackupJob<R> {
    /// Creates a job with a fresh id. Nothing is registered in the repository
    /// unless every initial object is unique and exists.
    pub fn new<I>(
        repository: SharedRepository<R>,
        algorithm: StorageCreationAlgorithm,
        initial_objects: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = JobObject>,
    {
        let mut job_objects: Vec<JobObject> = Vec::new();
        for object in initial_objects {
            if job_objects.contains(&object) {
                return Err(Error::duplicate(format!("job object {} given twice", object)));
            }
            check_name_clash(&job_objects, &object)?;
            job_objects.push(object);
        }

        if let Some(missing) = job_objects
            .iter()
            .find(|o| !repository.borrow().object_exists(o.full_name()))
        {
            return Err(Error::validation(format!("job object {} does not exist", missing)));
        }

        let id = JobId::new();
        repository.borrow_mut().create_job_namespace(&id)?;
        info!("Created job {} with {} object(s)", id, job_objects.len());

        Ok(Self {
            repository,
            state: JobState {
                id,
                algorithm,
                job_objects,
                backup: Backup::default(),
            },
        })
    }

    /// Rebuilds a job from saved state on top of `repository`.
    pub fn from_state(repository: SharedRepository<R>, state: JobState) -> Result<Self> {
        repository.borrow_mut().create_job_namespace(&state.id)?;
        debug!(
            "Loaded job {} with {} restore point(s)",
            state.id,
            state.backup.len()
        );
        Ok(Self { repository, state })
    }

    pub fn id(&self) -> &JobId {
        &self.state.id
    }

    pub fn algorithm(&self) -> StorageCreationAlgorithm {
        self.state.algorithm
    }

    pub fn job_objects(&self) -> &[JobObject] {
        &self.state.job_objects
    }

    pub fn backup(&self) -> &Backup {
        &self.state.backup
    }

    pub fn repository(&self) -> &SharedRepository<R> {
        &self.repository
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn into_state(self) -> JobState {
        self.state
    }

    /// Fails with `Validation` for a missing path, `Duplicate` for a tracked
    /// one and `Conflict` when another object has the same file name.
    pub fn add_job_object(&mut self, object: JobObject) -> Result<()> {
        if !self.repository.borrow().object_exists(object.full_name()) {
            return Err(Error::validation(format!("job object {} does not exist", object)));
        }
        if self.state.job_objects.contains(&object) {
            return Err(Error::duplicate(format!(
                "job object {} already in job {}",
                object, self.state.id
            )));
        }
        check_name_clash(&self.state.job_objects, &object)?;

        debug!("Job {} tracks {}", self.state.id, object);
        self.state.job_objects.push(object);
        Ok(())
    }

    pub fn delete_job_object(&mut self, object: &JobObject) -> Result<()> {
        let pos = self
            .state
            .job_objects
            .iter()
            .position(|o| o == object)
            .ok_or_else(|| {
                Error::not_found(format!("job object {} in job {}", object, self.state.id))
            })?;

        self.state.job_objects.remove(pos);
        debug!("Job {} no longer tracks {}", self.state.id, object);
        Ok(())
    }

    /// Snapshots the current job objects. The history only grows once every
    /// storage of the new point exists.
    pub fn create_restore_point(
        &mut self,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<RestorePoint> {
        if self.state.job_objects.is_empty() {
            return Err(Error::validation(format!(
                "job {} has no object to back up",
                self.state.id
            )));
        }

        let sources: Vec<PathBuf> = self
            .state
            .job_objects
            .iter()
            .map(|o| o.full_name().clone())
            .collect();
        let storages = self
            .state
            .algorithm
            .create_storages(&mut *self.repository.borrow_mut(), &sources, &self.state.id)
            .with_msg(format!("Creating restore point for job {} failed", self.state.id))?;

        let restore_point = RestorePoint::new(storages, created_at);
        self.state.backup.add_restore_point(restore_point.clone());
        info!(
            "Job {} created restore point {} with {} storage(s)",
            self.state.id,
            restore_point.id(),
            restore_point.storages().len()
        );
        Ok(restore_point)
    }

    /// Drops the restore point from the history, then deletes its storages.
    /// `false` when the id is unknown.
    pub fn delete_restore_point(&mut self, id: &RestorePointId) -> Result<bool> {
        let Some(names) = self.state.backup.restore_point(id).map(RestorePoint::storage_names)
        else {
            return Ok(false);
        };
        if !self.state.backup.delete_restore_point(id) {
            return Ok(false);
        }

        self.repository
            .borrow_mut()
            .delete_storages(&names)
            .with_msg(format!("Deleting storages of restore point {} failed", id))?;
        self.reclaim_retained(&[*id])?;
        info!("Job {} deleted restore point {}", self.state.id, id);
        Ok(true)
    }

    /// Deletes the storages kept alive on behalf of `covering`, which have
    /// left the history.
    fn reclaim_retained(&mut self, covering: &[RestorePointId]) -> Result<()> {
        let released = self.state.backup.release_retained(covering);
        if released.is_empty() {
            return Ok(());
        }

        let names: Vec<PathBuf> = released
            .iter()
            .map(|r| r.storage().name().clone())
            .filter(|name| self.repository.borrow().object_exists(name))
            .collect();
        if let Err(e) = self.repository.borrow_mut().delete_storages(&names) {
            let left = released
                .into_iter()
                .filter(|r| self.repository.borrow().object_exists(r.storage().name()));
            for retained in left {
                self.state.backup.retain_storage(retained);
            }
            return Err(e.with_msg(format!("Reclaiming storages of job {} failed", self.state.id)));
        }
        debug!("Job {} reclaimed {} kept storage(s)", self.state.id, names.len());
        Ok(())
    }
}

impl<R: ExtendedRepository> BackupJob<R> {
    pub fn apply_retention(
        &mut self,
        controller: &RetentionController,
        logger: &dyn RetentionLogger,
    ) -> Result<Option<Vec<RestorePoint>>> {
        self.apply_retention_at(controller, logger, Utc::now())
    }

    /// Evicts restore points as `controller` decides. Victims leave the
    /// history before any of their storages is touched. Storages the cleaning
    /// keeps are remembered and deleted once their covering point goes.
    pub fn apply_retention_at(
        &mut self,
        controller: &RetentionController,
        logger: &dyn RetentionLogger,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RestorePoint>>> {
        let eviction = controller.select(
            self.state.backup.restore_points(),
            &*self.repository.borrow(),
            now,
        )?;
        let Some(eviction) = eviction else {
            return Ok(None);
        };

        let victim_ids: Vec<RestorePointId> = eviction.victims().iter().map(|v| *v.id()).collect();
        for id in &victim_ids {
            self.state.backup.delete_restore_point(id);
        }
        self.reclaim_retained(&victim_ids)?;
        let retained = controller
            .clean(&eviction, &mut *self.repository.borrow_mut(), logger)
            .with_msg(format!("Retention of job {} failed", self.state.id))?;
        for storage in retained {
            self.state.backup.retain_storage(storage);
        }

        Ok(Some(eviction.into_victims()))
    }

    pub fn restore(&self, id: &RestorePointId, target: &RestoreTarget) -> Result<()> {
        let restore_point = self.state.backup.restore_point(id).ok_or_else(|| {
            Error::not_found(format!("restore point {} in job {}", id, self.state.id))
        })?;
        let names = restore_point.storage_names();

        let repository = self.repository.borrow();
        match target {
            RestoreTarget::Location(dir) => repository.restore_to_location(&names, dir),
            RestoreTarget::Original => repository.restore_to_original_location(&names),
        }
        .with_msg(format!("Restoring {} failed", id))
    }
}
