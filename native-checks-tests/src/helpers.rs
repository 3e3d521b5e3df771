pub mod handler_files;
pub mod pool_harness;
pub mod wait_utils;
