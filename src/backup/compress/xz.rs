use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::CopyGetters;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use std::num::NonZero;
use validator::Validate;

static DEFAULT_COMPRESSION_LEVEL: u32 = 3;
/// Upper bound when the thread count is derived from the core count.
static DEFAULT_MAX_PARALLELIZATION: usize = 8;

/// XZ (LZMA) settings for storage archives.
///
/// Storages are usually small, one per source object with the split algorithm,
/// so the multithreaded encoder is only used when asked for explicitly or when
/// the machine has cores to spare.
#[skip_serializing_none]
#[derive(
    Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq, Builder, CopyGetters,
)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct XzConfig {
    /// Preset 0-9, defaults to 3.
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
    /// Encoder threads, defaults to half the available cores.
    #[validate(range(min = 1))]
    thread: Option<u32>,
}

impl XzConfig {
    fn effective_thread(&self) -> u32 {
        self.thread.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZero::get)
                .map(|core| (core / 2).clamp(1, DEFAULT_MAX_PARALLELIZATION) as u32)
                .unwrap_or(1)
        })
    }
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let thread = self.effective_thread();

        tracing::debug!("Creating XZ compressor with level={}, threads={}", level, thread);

        if thread == 1 {
            Ok(XzEncoder::new(writer, level).into())
        } else {
            let stream = MtStreamBuilder::new()
                .preset(level)
                .check(Check::Crc64)
                .threads(thread)
                .encoder()?;
            Ok(XzEncoder::new_stream(writer, stream).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_xz_config_default() {
        let config = XzConfig::default();
        assert!(config.level().is_none());
        assert!(config.thread().is_none());
        assert!(config.validate().is_ok());
        assert!(config.effective_thread() >= 1);
    }

    #[test]
    fn test_xz_config_validation() {
        assert!(XzConfig::builder().level(9).thread(2).build().validate().is_ok());
        assert!(XzConfig::builder().level(10).build().validate().is_err());
        assert!(XzConfig::builder().thread(0).build().validate().is_err());
    }

    #[test]
    fn test_build_compressor_single_and_multi_thread() {
        for thread in [1, 4] {
            let config = XzConfig::builder().level(1).thread(thread).build();
            let compressor = config.build_compressor(Cursor::new(Vec::new())).unwrap();
            assert!(matches!(compressor, Compressor::XzEncoder(_)));
        }
    }

    #[test]
    fn test_xz_config_serialization_skips_none() {
        let config = XzConfig::builder().level(6).build();
        let serialized = serde_json::to_string(&config).unwrap();
        assert_eq!(serialized, r#"{"level":6}"#);

        let deserialized: XzConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
