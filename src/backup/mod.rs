pub mod algorithm;
pub mod archive;
pub mod backup_config;
pub mod compress;
pub mod file_ext;
pub mod finish;
pub mod ids;
pub mod job;
pub mod persist;
pub mod repository;
pub mod restore_point;
pub mod result_error;
pub mod retention;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_util;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
