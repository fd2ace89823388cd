use crate::backup::archive::{ArchiveEntry, Archiver};
use crate::backup::compress::{CompressorBuilder, CompressorConfig, DecompressorBuilder};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

static TAR_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

/// Tar archives, optionally run through a compressor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct TarArchiver {
    #[serde(default)]
    #[builder(default, into)]
    compressor: CompressorConfig,
}

impl FileExtProvider for TarArchiver {
    fn file_ext(&self) -> Option<Arc<str>> {
        Some(
            std::iter::once(TAR_FILE_EXT.get_or_init(|| "tar".into()).clone())
                .chain(self.compressor.file_ext())
                .join(".")
                .into(),
        )
    }
}

fn tmp_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".tmp");
    name.into()
}

impl TarArchiver {
    fn write_archive(&self, entries: &[ArchiveEntry], path: &Path) -> Result<()> {
        let mut writer = File::create_new(path)
            .map(BufWriter::new)
            .map_err(Error::from)
            .and_then(|f| self.compressor.build_compressor(f))
            .map(BufWriter::new)
            .map(::tar::Builder::new)?;

        writer.follow_symlinks(true);

        for entry in entries {
            if entry.src.is_dir() {
                writer.append_dir_all(entry.dst.as_ref(), entry.src.as_ref())?;
            } else {
                writer.append_path_with_name(entry.src.as_ref(), entry.dst.as_ref())?;
            }
            trace!("Packed {:?} as {:?}", entry.src, entry.dst);
        }

        writer
            .into_inner()?
            .finish()?
            .finish()?
            .finish()?
            .sync_all()?;

        Ok(())
    }
}

impl Archiver for TarArchiver {
    #[named]
    fn pack(&self, sources: &[PathBuf], archive_path: &Path) -> Result<()> {
        let entries: Vec<ArchiveEntry> = sources
            .iter()
            .map(ArchiveEntry::from_source)
            .collect::<Result<_>>()?;

        if let Some(dup) = entries.iter().map(|e| e.dst.clone()).duplicates().next() {
            return Err(Error::conflict(format!(
                "more than one source would be stored as {:?}",
                dup
            )));
        }

        if let Some(missing) = entries.iter().find(|e| !e.src.exists()) {
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source {:?} is not readable", missing.src),
            ))
            .with_debug_object_and_fn_name(archive_path.to_path_buf(), function_path!()));
        }

        let tmp = tmp_path(archive_path);
        self.write_archive(&entries, &tmp)
            .and_then(|_| std::fs::rename(&tmp, archive_path).map_err(Error::from))
            .map_err(|mut e| {
                if tmp.exists() {
                    if let Err(e2) = std::fs::remove_file(&tmp) {
                        e = e.chain(e2.into())
                    }
                }
                e.with_msg(format!("Creating archive {:?} failed", archive_path))
            })?;

        debug!("Packed {} sources into {:?}", entries.len(), archive_path);
        Ok(())
    }

    #[named]
    fn extract(&self, archive_path: &Path, entry_name: &str, dest: &Path) -> Result<()> {
        let reader = File::open(archive_path)
            .map(BufReader::new)
            .map_err(Error::from)
            .with_debug_object_and_fn_name(archive_path.to_path_buf(), function_path!())?;
        let mut archive = ::tar::Archive::new(self.compressor.build_decompressor(reader));

        let wanted = Path::new(entry_name);
        let mut extracted = 0usize;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let target = if path == wanted {
                dest.to_path_buf()
            } else if let Ok(rest) = path.strip_prefix(wanted) {
                dest.join(rest)
            } else {
                continue;
            };

            if entry.header().entry_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                if target.is_file() {
                    std::fs::remove_file(&target)?;
                }
                entry.unpack(&target)?;
            }
            trace!("Extracted {:?} to {:?}", path, target);
            extracted += 1;
        }

        if extracted == 0 {
            return Err(Error::not_found(format!(
                "entry {:?} in archive {:?}",
                entry_name, archive_path
            )));
        }

        debug!("Extracted {:?} from {:?} to {:?}", entry_name, archive_path, dest);
        Ok(())
    }
}
