pub mod aggregate;
pub mod clap_args;
pub mod config;
pub mod errors;
pub mod report;
pub mod sweep;
pub mod timer;
pub mod trial;
pub mod workload;
