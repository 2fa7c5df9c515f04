pub mod commands;
pub mod config;
pub mod error;
pub mod git;
pub mod highlight;
pub mod utils;
