pub mod local;
pub mod tracked;

use crate::backup::ids::{JobId, StorageId};
use crate::backup::result_error::result::Result;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Physical home of storage archives.
///
/// Every path returned by the `create_*` methods can later be handed back to
/// [`Repository::delete_storages`].
pub trait Repository {
    /// Prepares the area that holds the storages of `job_id`. Safe to repeat.
    fn create_job_namespace(&mut self, job_id: &JobId) -> Result<()>;

    fn object_exists(&self, full_name: &Path) -> bool;

    /// Packs all `sources` into one archive owned by `job_id`.
    fn create_storage(
        &mut self,
        sources: &[PathBuf],
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf>;

    fn create_single_storage(
        &mut self,
        source: &Path,
        job_id: &JobId,
        storage_id: &StorageId,
    ) -> Result<PathBuf>;

    /// Removes archives. Fails with `NotFound`, removing nothing, if any of
    /// them is not there.
    fn delete_storages(&mut self, names: &[PathBuf]) -> Result<()>;

    fn extract_entry(&self, storage: &Path, entry_name: &str, dest: &Path) -> Result<()>;

    fn storage_size(&self, storage: &Path) -> Result<u64>;
}

/// A repository that remembers where the content of each storage came from.
pub trait ExtendedRepository: Repository {
    fn original_locations(&self, storage: &Path) -> Option<&[PathBuf]>;

    /// Whether every source of `storage` is also a source of one of the
    /// `candidates`. Unknown storages never share.
    fn storages_share_content(&self, storage: &Path, candidates: &[PathBuf]) -> bool;

    /// Extracts every original file of `storages` into `target_dir` under its
    /// file name. Refuses to overwrite anything.
    fn restore_to_location(&self, storages: &[PathBuf], target_dir: &Path) -> Result<()>;

    /// Extracts every original file of `storages` back to where it came from,
    /// overwriting the current content.
    fn restore_to_original_location(&self, storages: &[PathBuf]) -> Result<()>;
}

/// Repository handle shared by several jobs on one thread.
pub type SharedRepository<R> = Rc<RefCell<R>>;

pub fn share<R>(repository: R) -> SharedRepository<R> {
    Rc::new(RefCell::new(repository))
}
