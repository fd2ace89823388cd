use crate::backup::archive::tar::TarArchiver;
use crate::backup::repository::local::LocalFilesRepository;
use crate::backup::repository::tracked::TrackedRepository;
use crate::backup::repository::{share, SharedRepository};
use crate::backup::retention::logger::RetentionLogger;
use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

pub fn write_file<P: AsRef<Path>>(base: P, relative: &str, content: &str) -> PathBuf {
    let path = base.as_ref().join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn local_repository<P: AsRef<Path>>(root: P) -> LocalFilesRepository<TarArchiver> {
    LocalFilesRepository::new(root.as_ref(), TarArchiver::default(), None).unwrap()
}

pub fn tracked_repository<P: AsRef<Path>>(
    root: P,
) -> SharedRepository<TrackedRepository<LocalFilesRepository<TarArchiver>>> {
    share(TrackedRepository::new(local_repository(root)))
}

/// Fixed point in time plus `hours`, keeps ordering assertions readable.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hours)
}

#[derive(Default)]
pub struct MemoryLogger {
    pub messages: RefCell<Vec<String>>,
}

impl RetentionLogger for MemoryLogger {
    fn log_message(&self, text: &str) {
        self.messages.borrow_mut().push(text.to_owned());
    }
}
