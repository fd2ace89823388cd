use crate::backup::algorithm::StorageCreationAlgorithm;
use crate::backup::archive::tar::TarArchiver;
use crate::backup::compress::CompressorConfig;
use crate::backup::job::BackupJob;
use crate::backup::persist::BackupDocument;
use crate::backup::repository::local::LocalFilesRepository;
use crate::backup::repository::tracked::TrackedRepository;
use crate::backup::repository::{share, SharedRepository};
use crate::backup::restore_point::{JobObject, RestorePoint};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::cleaning::CleaningAlgorithm;
use crate::backup::retention::logger::{FileLogger, RetentionLogger, TracingLogger};
use crate::backup::retention::{RetentionController, RetentionPolicy};
use crate::backup::validate::{
    validate_cron_str, validate_dir_exist_or_created, validate_parent_dir,
    validate_storage_file_ext,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

pub type ConfiguredRepository = TrackedRepository<LocalFilesRepository<TarArchiver>>;

/// One backup job, where it keeps its storages and state, and how it is
/// pruned.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Without a schedule the job runs once.
    #[validate(custom(function = validate_cron_str))]
    #[builder(into)]
    cron: Option<String>,
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    repository_dir: PathBuf,
    #[validate(custom(function = validate_parent_dir))]
    #[builder(into)]
    state_file: PathBuf,
    #[validate(custom(function = validate_storage_file_ext))]
    #[builder(into)]
    storage_file_ext: Option<String>,
    #[serde(default)]
    #[builder(default)]
    compressor: CompressorConfig,
    #[serde(default)]
    #[builder(default)]
    algorithm: StorageCreationAlgorithm,
    #[validate(length(min = 1))]
    objects: Vec<PathBuf>,
    retention: Option<RetentionPolicy>,
    #[serde(default)]
    #[builder(default)]
    cleaning: CleaningAlgorithm,
    /// Retention reports go to `tracing` when unset.
    #[builder(into)]
    retention_log: Option<PathBuf>,
}

impl BackupConfig {
    /// Field rules plus the rules of the nested compressor and retention
    /// settings.
    pub fn validate_all(&self) -> std::result::Result<(), ValidationErrors> {
        self.validate()?;
        self.compressor.validate()?;
        if let Some(retention) = &self.retention {
            retention.validate()?;
        }
        Ok(())
    }

    fn archiver(&self) -> TarArchiver {
        TarArchiver::builder()
            .compressor(self.compressor.clone())
            .build()
    }

    fn retention_logger(&self) -> Box<dyn RetentionLogger> {
        match &self.retention_log {
            Some(path) => Box::new(FileLogger::builder().path(path.clone()).build()),
            None => Box::new(TracingLogger),
        }
    }

    /// Reloads the saved job, or creates a new one when there is no state
    /// file yet. Job objects are brought in line with `objects`.
    pub fn load_job(
        &self,
    ) -> Result<(
        SharedRepository<ConfiguredRepository>,
        BackupJob<ConfiguredRepository>,
    )> {
        if !self.state_file.exists() {
            let repository = LocalFilesRepository::new(
                &self.repository_dir,
                self.archiver(),
                self.storage_file_ext.clone(),
            )?;
            let repository = share(TrackedRepository::new(repository));
            let job = BackupJob::new(
                repository.clone(),
                self.algorithm,
                self.objects.iter().map(JobObject::new),
            )?;
            return Ok((repository, job));
        }

        let (repository, jobs) =
            BackupDocument::<ConfiguredRepository>::load_json(&self.state_file)?.into_jobs()?;
        let mut job = jobs.into_iter().next().ok_or_else(|| {
            Error::not_found(format!("no job saved in {:?}", self.state_file))
        })?;
        self.sync_objects(&mut job)?;
        Ok((repository, job))
    }

    fn sync_objects(&self, job: &mut BackupJob<ConfiguredRepository>) -> Result<()> {
        let wanted: Vec<JobObject> = self.objects.iter().map(JobObject::new).collect();
        let removed: Vec<JobObject> = job
            .job_objects()
            .iter()
            .filter(|o| !wanted.contains(o))
            .cloned()
            .collect();
        for object in removed {
            info!("Job {} stops tracking {}", job.id(), object);
            job.delete_job_object(&object)?;
        }
        for object in wanted {
            if !job.job_objects().contains(&object) {
                job.add_job_object(object)?;
            }
        }
        Ok(())
    }

    /// Creates one restore point, prunes by the retention policy and saves
    /// the state. The state is saved even when pruning fails.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<RestorePoint> {
        let (repository, mut job) = self.load_job()?;
        let restore_point = job.create_restore_point(Some(now))?;

        let pruned = match &self.retention {
            Some(policy) => RetentionController::new(policy.clone(), self.cleaning)
                .and_then(|controller| {
                    job.apply_retention_at(&controller, self.retention_logger().as_ref(), now)
                })
                .map(|_| ()),
            None => Ok(()),
        };
        let saved = BackupDocument::capture(&repository, [&job])
            .save_json(&self.state_file)
            .with_msg("Saving backup state failed");

        match (pruned, saved) {
            (Ok(_), Ok(_)) => Ok(restore_point),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(e1), Err(e2)) => Err(e1.chain(e2)),
        }
    }

    /// Runs once without a schedule, otherwise sleeps until each cron tick
    /// and never returns unless a run fails.
    pub fn start_loop(&self) -> Result<()> {
        let Some(cron) = self.cron.as_deref() else {
            let restore_point = self.run_once(Utc::now())?;
            info!("Created {}", restore_point.info());
            return Ok(());
        };

        let next_tick = |after: &DateTime<Utc>| {
            cron_parser::parse(cron, after)
                .map_err(|e| Error::validation(format!("Invalid cron string {cron:?}: {e:?}")))
        };
        let mut start = next_tick(&Utc::now())?;
        loop {
            let now = Utc::now();
            if now < start {
                info!("Sleeping until {start}");
                match (start - now).to_std() {
                    Ok(duration) => std::thread::sleep(duration),
                    Err(e) => warn!("Cannot sleep until {start}: {e}"),
                }
            } else {
                info!("Trying to create restore point...");
                let restore_point = self.run_once(now)?;
                info!("Created {}", restore_point.info());
                start = next_tick(&now)?;
            }
        }
    }
}
