pub mod tar;

use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Packs source paths into one archive file and extracts single entries back out.
///
/// Entries are named after the file name of their source, so an archive can
/// only hold one source per file name.
pub trait Archiver: FileExtProvider {
    /// Writes `sources` into a new archive at `archive_path`.
    ///
    /// The archive either appears complete under `archive_path` or not at all.
    fn pack(&self, sources: &[PathBuf], archive_path: &Path) -> Result<()>;

    /// Writes the entry `entry_name` (a file, or a directory with everything
    /// below it) to `dest`, replacing what is there.
    fn extract(&self, archive_path: &Path, entry_name: &str, dest: &Path) -> Result<()>;
}

/// One source path and the name it gets inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub src: Arc<Path>,
    pub dst: Arc<Path>,
}

impl ArchiveEntry {
    pub fn from_source<P: AsRef<Path>>(src: P) -> Result<ArchiveEntry> {
        let src = src.as_ref();
        let name = entry_name(src)?;
        Ok(Self {
            src: src.into(),
            dst: Path::new(&name).into(),
        })
    }
}

/// Name under which `source` is stored inside an archive.
pub fn entry_name<P: AsRef<Path>>(source: P) -> Result<String> {
    let source = source.as_ref();
    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::validation(format!("{:?} has no usable file name", source)))
}
