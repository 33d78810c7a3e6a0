//! catpick: hierarchical category catalog
//!
//! Builds category forests from flat record lists, filters them and
//! reconciles single or multiple selections against them.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
