pub mod catalog;
pub mod config;
pub mod convert;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod layout;
pub mod output;
pub mod pipeline;
