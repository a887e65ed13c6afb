pub mod annotate;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod labels;
pub mod output;
pub mod store;
pub mod table;
