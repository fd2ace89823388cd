use liblzma::write::XzEncoder;
use std::io::{BufWriter, Error, IntoInnerError, Write};

/// Flushes whatever a writer layer still buffers and hands back the layer below it.
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for XzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write> Finish<W> for BufWriter<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner().map_err(IntoInnerError::into_error)
    }
}
