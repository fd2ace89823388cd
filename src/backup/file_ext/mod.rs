use std::sync::Arc;

/// Something that decides (part of) the extension of the files it writes.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}
