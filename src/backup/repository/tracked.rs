use crate::backup::archive::entry_name;
use crate::backup::function_path;
use crate::backup::ids::{JobId, StorageId};
use crate::backup::repository::{ExtendedRepository, Repository};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use function_name::named;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Wraps a repository and records the original source paths of every storage
/// it creates, so storages can be restored and compared later.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedRepository<R> {
    repository: R,
    original_locations: BTreeMap<PathBuf, Vec<PathBuf>>,
}

/// An original file of a storage, resolved for extraction.
struct RestoreItem<'a> {
    storage: &'a Path,
    source: &'a Path,
    name: String,
}

impl<R: Repository> TrackedRepository<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            original_locations: BTreeMap::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn tracked_storages(&self) -> impl Iterator<Item = &PathBuf> {
        self.original_locations.keys()
    }

    fn restore_items<'a>(&'a self, storages: &'a [PathBuf]) -> Result<Vec<RestoreItem<'a>>> {
        let mut items = Vec::new();
        for storage in storages {
            let sources = self
                .original_locations
                .get(storage)
                .ok_or_else(|| Error::not_found(format!("untracked storage {:?}", storage)))?;
            for source in sources {
                items.push(RestoreItem {
                    storage,
                    source,
                    name: entry_name(source)?,
                });
            }
        }
        Ok(items)
    }
}

impl<R: Repository> Repository for TrackedRepository<R> {
    fn create_job_namespace(&mut self, job_id: &JobId) -> Result<()> {
        self.repository.create_job_namespace(job_id)
    }

    fn object_exists(&self, full_name: &Path) -> bool {
        self.repository.object_exists(full_name)
    }

    fn create_storage(
        &mut self,
        sources: &[PathBuf],
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf> {
        let path = self.repository.create_storage(sources, job_id, storage_id)?;
        self.original_locations.insert(path.clone(), sources.to_vec());
        Ok(path)
    }

    fn create_single_storage(
        &mut self,
        source: &Path,
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf> {
        let path = self
            .repository
            .create_single_storage(source, job_id, storage_id)?;
        self.original_locations
            .insert(path.clone(), vec![source.to_path_buf()]);
        Ok(path)
    }

    /// A failed delete still forgets the storages that are gone from disk.
    fn delete_storages(&mut self, names: &[PathBuf]) -> Result<()> {
        let result = self.repository.delete_storages(names);
        for name in names {
            if result.is_ok() || !self.repository.object_exists(name) {
                self.original_locations.remove(name);
            }
        }
        result
    }

    fn extract_entry(&self, storage: &Path, entry_name: &str, dest: &Path) -> Result<()> {
        self.repository.extract_entry(storage, entry_name, dest)
    }

    fn storage_size(&self, storage: &Path) -> Result<u64> {
        self.repository.storage_size(storage)
    }
}

impl<R: Repository> ExtendedRepository for TrackedRepository<R> {
    fn original_locations(&self, storage: &Path) -> Option<&[PathBuf]> {
        self.original_locations.get(storage).map(Vec::as_slice)
    }

    fn storages_share_content(&self, storage: &Path, candidates: &[PathBuf]) -> bool {
        let Some(sources) = self.original_locations.get(storage) else {
            return false;
        };

        candidates
            .iter()
            .filter_map(|candidate| self.original_locations.get(candidate))
            .any(|candidate_sources| sources.iter().all(|s| candidate_sources.contains(s)))
    }

    #[named]
    fn restore_to_location(&self, storages: &[PathBuf], target_dir: &Path) -> Result<()> {
        let items = self
            .restore_items(storages)
            .with_debug_object_and_fn_name(storages.to_vec(), function_path!())?;

        if let Some(dup) = items.iter().map(|i| i.name.as_str()).duplicates().next() {
            return Err(Error::conflict(format!(
                "{} would be restored more than once into {:?}",
                dup, target_dir
            )));
        }
        if let Some(existing) = items.iter().find(|i| target_dir.join(&i.name).exists()) {
            return Err(Error::conflict(format!(
                "cannot restore to {:?}, {} already exists",
                target_dir, existing.name
            )));
        }

        std::fs::create_dir_all(target_dir)?;
        for item in &items {
            self.repository
                .extract_entry(item.storage, &item.name, &target_dir.join(&item.name))
                .with_msg(format!("Restoring {:?} to {:?} failed", item.source, target_dir))?;
        }

        info!(
            "Restored {} object(s) from {} storage(s) to {:?}",
            items.len(),
            storages.len(),
            target_dir
        );
        Ok(())
    }

    #[named]
    fn restore_to_original_location(&self, storages: &[PathBuf]) -> Result<()> {
        let items = self
            .restore_items(storages)
            .with_debug_object_and_fn_name(storages.to_vec(), function_path!())?;

        for item in &items {
            self.repository
                .extract_entry(item.storage, &item.name, item.source)
                .with_msg(format!("Restoring {:?} in place failed", item.source))?;
        }

        info!(
            "Restored {} object(s) from {} storage(s) to their original location",
            items.len(),
            storages.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::tar::TarArchiver;
    use crate::backup::repository::local::LocalFilesRepository;
    use crate::backup::test_util::{local_repository, write_file};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        repo: TrackedRepository<LocalFilesRepository<TarArchiver>>,
        job: JobId,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut repo = TrackedRepository::new(local_repository(dir.path().join("repo")));
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();
        Fixture { dir, repo, job }
    }

    #[test]
    fn test_mapping_follows_create_and_delete() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "a");
        let b = write_file(f.dir.path(), "src/b.txt", "b");

        let multi = f
            .repo
            .create_storage(&[a.clone(), b.clone()], &f.job, &StorageId::new())
            .unwrap();
        let single = f.repo.create_single_storage(&a, &f.job, &StorageId::new()).unwrap();

        assert_eq!(f.repo.original_locations(&multi), Some(&[a.clone(), b][..]));
        assert_eq!(f.repo.original_locations(&single), Some(&[a][..]));

        f.repo.delete_storages(&[single.clone()]).unwrap();
        assert!(f.repo.original_locations(&single).is_none());
        assert!(f.repo.original_locations(&multi).is_some());
    }

    #[test]
    fn test_refused_delete_keeps_mapping() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "a");
        let storage = f.repo.create_single_storage(&a, &f.job, &StorageId::new()).unwrap();
        let missing = f.repo.repository().storage_path(&f.job, &StorageId::new());

        assert!(f.repo.delete_storages(&[storage.clone(), missing]).is_err());
        assert!(storage.is_file());
        assert!(f.repo.original_locations(&storage).is_some());
    }

    #[test]
    fn test_repeated_name_in_delete_is_forgotten() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "a");
        let storage = f.repo.create_single_storage(&a, &f.job, &StorageId::new()).unwrap();

        f.repo.delete_storages(&[storage.clone(), storage.clone()]).unwrap();

        assert!(!storage.exists());
        assert!(f.repo.original_locations(&storage).is_none());
    }

    /// Removes every storage except `stuck`, then reports a failure.
    struct StuckDelete {
        inner: LocalFilesRepository<TarArchiver>,
        stuck: Option<PathBuf>,
    }

    impl Repository for StuckDelete {
        fn create_job_namespace(&mut self, job_id: &JobId) -> Result<()> {
            self.inner.create_job_namespace(job_id)
        }

        fn object_exists(&self, full_name: &Path) -> bool {
            self.inner.object_exists(full_name)
        }

        fn create_storage(
            &mut self,
            sources: &[PathBuf],
            job_id: &JobId,
            storage_id: &StorageId,
        ) -> Result<PathBuf> {
            self.inner.create_storage(sources, job_id, storage_id)
        }

        fn create_single_storage(
            &mut self,
            source: &Path,
            job_id: &JobId,
            storage_id: &StorageId,
        ) -> Result<PathBuf> {
            self.inner.create_single_storage(source, job_id, storage_id)
        }

        fn delete_storages(&mut self, names: &[PathBuf]) -> Result<()> {
            let stuck = self.stuck.clone();
            let rest: Vec<PathBuf> = names
                .iter()
                .filter(|n| Some(*n) != stuck.as_ref())
                .cloned()
                .collect();
            self.inner.delete_storages(&rest)?;
            match stuck {
                Some(stuck) if names.contains(&stuck) => Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("cannot remove {:?}", stuck),
                ))),
                _ => Ok(()),
            }
        }

        fn extract_entry(&self, storage: &Path, entry_name: &str, dest: &Path) -> Result<()> {
            self.inner.extract_entry(storage, entry_name, dest)
        }

        fn storage_size(&self, storage: &Path) -> Result<u64> {
            self.inner.storage_size(storage)
        }
    }

    #[test]
    fn test_partial_delete_forgets_removed_storages() {
        let dir = TempDir::new().unwrap();
        let mut repo = TrackedRepository::new(StuckDelete {
            inner: local_repository(dir.path().join("repo")),
            stuck: None,
        });
        let job = JobId::new();
        repo.create_job_namespace(&job).unwrap();
        let a = write_file(dir.path(), "src/a.txt", "a");
        let b = write_file(dir.path(), "src/b.txt", "b");
        let gone = repo.create_single_storage(&a, &job, &StorageId::new()).unwrap();
        let stuck = repo.create_single_storage(&b, &job, &StorageId::new()).unwrap();
        repo.repository.stuck = Some(stuck.clone());

        let err = repo
            .delete_storages(&[gone.clone(), stuck.clone()])
            .unwrap_err();

        assert!(matches!(err.root(), Error::Io(_)));
        assert!(!gone.exists());
        assert!(repo.original_locations(&gone).is_none());
        assert!(stuck.is_file());
        assert!(repo.original_locations(&stuck).is_some());
    }

    #[test]
    fn test_storages_share_content() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "a");
        let b = write_file(f.dir.path(), "src/b.txt", "b");
        let only_a = f.repo.create_single_storage(&a, &f.job, &StorageId::new()).unwrap();
        let only_b = f.repo.create_single_storage(&b, &f.job, &StorageId::new()).unwrap();
        let both = f
            .repo
            .create_storage(&[a.clone(), b.clone()], &f.job, &StorageId::new())
            .unwrap();

        assert!(f.repo.storages_share_content(&only_a, &[both.clone()]));
        assert!(f.repo.storages_share_content(&only_a, &[only_b.clone(), both.clone()]));
        assert!(!f.repo.storages_share_content(&only_a, &[only_b.clone()]));
        assert!(!f.repo.storages_share_content(&both, &[only_a.clone(), only_b]));
        assert!(!f.repo.storages_share_content(&f.dir.path().join("x"), &[both]));
    }

    #[test]
    fn test_restore_to_location() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "alpha");
        let b = write_file(f.dir.path(), "src/b.txt", "beta");
        let storage = f.repo.create_storage(&[a, b], &f.job, &StorageId::new()).unwrap();

        let target = f.dir.path().join("restored");
        f.repo.restore_to_location(&[storage], &target).unwrap();

        assert_eq!(std::fs::read_to_string(target.join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(target.join("b.txt")).unwrap(), "beta");
    }

    #[test]
    fn test_restore_to_location_conflict_touches_nothing() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "alpha");
        let b = write_file(f.dir.path(), "src/b.txt", "beta");
        let storage = f.repo.create_storage(&[a, b], &f.job, &StorageId::new()).unwrap();
        let target = f.dir.path().join("restored");
        write_file(&target, "b.txt", "already here");

        let err = f.repo.restore_to_location(&[storage], &target).unwrap_err();

        assert!(matches!(err.root(), Error::Conflict(_)));
        assert!(!target.join("a.txt").exists());
        assert_eq!(std::fs::read_to_string(target.join("b.txt")).unwrap(), "already here");
    }

    #[test]
    fn test_restore_to_original_location_overwrites() {
        let mut f = fixture();
        let a = write_file(f.dir.path(), "src/a.txt", "alpha");
        let storage = f.repo.create_single_storage(&a, &f.job, &StorageId::new()).unwrap();
        std::fs::write(&a, "edited").unwrap();

        f.repo.restore_to_original_location(&[storage.clone()]).unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "alpha");

        std::fs::remove_file(&a).unwrap();
        f.repo.restore_to_original_location(&[storage]).unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "alpha");
    }

    #[test]
    fn test_restore_untracked_storage_is_not_found() {
        let f = fixture();
        let err = f
            .repo
            .restore_to_original_location(&[f.dir.path().join("ghost.tar")])
            .unwrap_err();
        assert!(matches!(err.root(), Error::NotFound(_)));
    }
}
