pub mod args;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod error;
pub mod fastq;
pub mod fs_util;
pub mod jobs;
pub mod storage;
pub mod toolbox;
