use crate::backup::archive::Archiver;
use crate::backup::function_path;
use crate::backup::ids::{JobId, StorageId};
use crate::backup::repository::Repository;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::validate::validate_storage_file_ext;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storages as files under `<root>/<job id>/<storage id>.<ext>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct LocalFilesRepository<A> {
    root: PathBuf,
    archiver: A,
    storage_file_ext: String,
}

impl<A: Archiver> LocalFilesRepository<A> {
    /// Creates `root` if needed. Without an explicit extension the archiver's
    /// own (`tar`, `tar.xz`, ...) is used.
    pub fn new<P: Into<PathBuf>>(
        root: P,
        archiver: A,
        storage_file_ext: Option<String>,
    ) -> Result<Self> {
        let storage_file_ext = storage_file_ext
            .or_else(|| archiver.file_ext().map(|e| e.to_string()))
            .unwrap_or_default();
        validate_storage_file_ext(&storage_file_ext)
            .map_err(|e| Error::validation(e.to_string()))?;

        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            archiver,
            storage_file_ext,
        })
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.to_path_component())
    }

    pub fn storage_path(&self, job_id: &JobId, storage_id: &StorageId) -> PathBuf {
        let file_name = if self.storage_file_ext.is_empty() {
            storage_id.to_path_component()
        } else {
            format!("{}.{}", storage_id.to_path_component(), self.storage_file_ext)
        };
        self.job_dir(job_id).join(file_name)
    }

    fn check_owned(&self, name: &Path) -> Result<()> {
        if !name.starts_with(&self.root) {
            return Err(Error::validation(format!(
                "storage {:?} is outside of repository {:?}",
                name, self.root
            )));
        }
        if !name.is_file() {
            return Err(Error::not_found(format!("storage {:?}", name)));
        }
        Ok(())
    }
}

impl<A: Archiver> Repository for LocalFilesRepository<A> {
    fn create_job_namespace(&mut self, job_id: &JobId) -> Result<()> {
        let dir = self.job_dir(job_id);
        std::fs::create_dir_all(&dir)?;
        debug!("Job namespace ready at {:?}", dir);
        Ok(())
    }

    fn object_exists(&self, full_name: &Path) -> bool {
        full_name.exists()
    }

    #[named]
    fn create_storage(
        &mut self,
        sources: &[PathBuf],
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf> {
        if sources.is_empty() {
            return Err(Error::validation("a storage needs at least one source"));
        }

        let path = self.storage_path(job_id, storage_id);
        self.archiver
            .pack(sources, &path)
            .with_debug_object_and_fn_name(sources.to_vec(), function_path!())?;

        info!("Created storage {:?} from {} source(s)", path, sources.len());
        Ok(path)
    }

    fn create_single_storage(
        &mut self,
        source: &Path,
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf> {
        self.create_storage(&[source.to_path_buf()], job_id, storage_id)
    }

    #[named]
    fn delete_storages(&mut self, names: &[PathBuf]) -> Result<()> {
        let names: Vec<PathBuf> = names.iter().unique().cloned().collect();
        names
            .iter()
            .try_for_each(|name| self.check_owned(name))
            .with_debug_object_and_fn_name(names.clone(), function_path!())?;

        let errors = names
            .iter()
            .filter_map(|name| {
                std::fs::remove_file(name)
                    .map(|_| info!("Deleted storage {:?}", name))
                    .map_err(Error::from)
                    .err()
            })
            .collect_vec();
        convert_error_vec(errors)
    }

    fn extract_entry(&self, storage: &Path, entry_name: &str, dest: &Path) -> Result<()> {
        self.archiver.extract(storage, entry_name, dest)
    }

    fn storage_size(&self, storage: &Path) -> Result<u64> {
        if !storage.is_file() {
            return Err(Error::not_found(format!("storage {:?}", storage)));
        }
        Ok(std::fs::metadata(storage)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::tar::TarArchiver;
    use crate::backup::compress::xz::XzConfig;
    use crate::backup::compress::CompressorConfig;
    use crate::backup::test_util::{local_repository, write_file};
    use tempfile::TempDir;

    #[test]
    fn test_storage_path_layout() {
        let dir = TempDir::new().unwrap();
        let repo = local_repository(dir.path().join("repo"));
        let job = JobId::new();
        let storage = StorageId::new();

        let path = repo.storage_path(&job, &storage);
        assert_eq!(
            path,
            dir.path()
                .join("repo")
                .join(job.to_path_component())
                .join(format!("{}.tar", storage.to_path_component()))
        );
    }

    #[test]
    fn test_extension_follows_archiver_unless_overridden() {
        let dir = TempDir::new().unwrap();
        let xz = TarArchiver::builder()
            .compressor(CompressorConfig::Xz(XzConfig::default()))
            .build();

        let repo = LocalFilesRepository::new(dir.path(), xz.clone(), None).unwrap();
        assert_eq!(repo.storage_file_ext(), "tar.xz");

        let repo = LocalFilesRepository::new(dir.path(), xz, Some("zip".into())).unwrap();
        assert_eq!(repo.storage_file_ext(), "zip");
    }

    #[test]
    fn test_invalid_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = LocalFilesRepository::new(dir.path(), TarArchiver::default(), Some("a/b".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_create_and_delete_storage() {
        let dir = TempDir::new().unwrap();
        let a = write_file(dir.path(), "src/a.txt", "a");
        let mut repo = local_repository(dir.path().join("repo"));
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();
        repo.create_job_namespace(&job).unwrap();

        let path = repo.create_single_storage(&a, &job, &StorageId::new()).unwrap();
        assert!(path.is_file());
        assert!(repo.storage_size(&path).unwrap() > 0);

        repo.delete_storages(&[path.clone()]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_unknown_storage_removes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = write_file(dir.path(), "src/a.txt", "a");
        let mut repo = local_repository(dir.path().join("repo"));
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();
        let kept = repo.create_single_storage(&a, &job, &StorageId::new()).unwrap();
        let missing = repo.storage_path(&job, &StorageId::new());

        let err = repo.delete_storages(&[kept.clone(), missing]).unwrap_err();
        assert!(matches!(err.root(), Error::NotFound(_)));
        assert!(kept.is_file());
    }

    #[test]
    fn test_delete_same_storage_twice_in_one_call() {
        let dir = TempDir::new().unwrap();
        let a = write_file(dir.path(), "src/a.txt", "a");
        let mut repo = local_repository(dir.path().join("repo"));
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();
        let path = repo.create_single_storage(&a, &job, &StorageId::new()).unwrap();

        repo.delete_storages(&[path.clone(), path.clone()]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_outside_root_is_refused() {
        let dir = TempDir::new().unwrap();
        let outside = write_file(dir.path(), "elsewhere.txt", "x");
        let mut repo = local_repository(dir.path().join("repo"));

        let err = repo.delete_storages(&[outside.clone()]).unwrap_err();
        assert!(matches!(err.root(), Error::Validation(_)));
        assert!(outside.exists());
    }

    #[test]
    fn test_create_storage_with_unreadable_source_fails() {
        let dir = TempDir::new().unwrap();
        let mut repo = local_repository(dir.path().join("repo"));
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();

        let err = repo
            .create_storage(&[dir.path().join("nope.txt")], &job, &StorageId::new())
            .unwrap_err();
        assert!(matches!(err.root(), Error::Io(_)));
        assert_eq!(std::fs::read_dir(repo.job_dir(&job)).unwrap().count(), 0);
    }
}
