//! # k-restore
//!
//! Local backup manager built around restore points.
//!
//! ## Features
//!
//! - **Backup Jobs**: A set of files and directories snapshotted together
//! - **Storage Strategies**: One archive per restore point, or one per object
//! - **Compression**: Tar archives, optionally XZ (LZMA) compressed
//! - **Restore**: Back to the original paths or into another directory
//! - **Retention Management**: By count, size, age or a mix, without deleting
//!   archives a surviving restore point still needs
//! - **Scheduled Runs**: Cron-based automation with JSON state between runs
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_restore::backup::algorithm::StorageCreationAlgorithm;
//! use k_restore::backup::archive::tar::TarArchiver;
//! use k_restore::backup::job::{BackupJob, RestoreTarget};
//! use k_restore::backup::repository::local::LocalFilesRepository;
//! use k_restore::backup::repository::share;
//! use k_restore::backup::repository::tracked::TrackedRepository;
//! use k_restore::backup::restore_point::JobObject;
//!
//! let repository = LocalFilesRepository::new("/var/backups", TarArchiver::default(), None)?;
//! let repository = share(TrackedRepository::new(repository));
//!
//! let mut job = BackupJob::new(
//!     repository,
//!     StorageCreationAlgorithm::Split,
//!     [JobObject::from("/etc/hosts")],
//! )?;
//! let restore_point = job.create_restore_point(None)?;
//! job.restore(restore_point.id(), &RestoreTarget::Location("/tmp/restored".into()))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
