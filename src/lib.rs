pub mod archive;
pub mod config;
pub mod constants;
pub mod data_backend;
pub mod data_types;
pub mod db_operations;
pub mod errors;
pub mod fuzzy;
pub mod notifications;
pub mod shared_main;
pub mod task_scheduler_funcs;
