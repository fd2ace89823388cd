use crate::backup::job::{BackupJob, JobState};
use crate::backup::repository::{share, Repository, SharedRepository};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use getset::Getters;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Saved form of a repository and the jobs living in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct BackupDocument<R> {
    repository: R,
    jobs: Vec<JobState>,
}

impl<R: Repository + Clone> BackupDocument<R> {
    pub fn capture<'a, I>(repository: &SharedRepository<R>, jobs: I) -> Self
    where
        R: 'a,
        I: IntoIterator<Item = &'a BackupJob<R>>,
    {
        Self {
            repository: repository.borrow().clone(),
            jobs: jobs.into_iter().map(|job| job.state().clone()).collect(),
        }
    }

    /// Shares the repository again and rebuilds every job on top of it.
    pub fn into_jobs(self) -> Result<(SharedRepository<R>, Vec<BackupJob<R>>)> {
        let repository = share(self.repository);
        let jobs = self
            .jobs
            .into_iter()
            .map(|state| BackupJob::from_state(repository.clone(), state))
            .collect::<Result<Vec<_>>>()?;
        Ok((repository, jobs))
    }
}

impl<R: Serialize> BackupDocument<R> {
    /// Replaces `path` in one rename, a crash never leaves a partial document.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        std::fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        drop(writer);
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| Error::from(e.error))
            .with_msg(format!("Saving state to {:?} failed", path))?;

        debug!("Saved {} job(s) to {:?}", self.jobs.len(), path);
        Ok(())
    }
}

impl<R: DeserializeOwned> BackupDocument<R> {
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let document: Self = File::open(path)
            .map(BufReader::new)
            .map_err(Error::from)
            .and_then(|r| serde_json::from_reader(r).map_err(Error::from))
            .with_msg(format!("Loading state from {:?} failed", path))?;
        debug!("Loaded {} job(s) from {:?}", document.jobs.len(), path);
        Ok(document)
    }
}
