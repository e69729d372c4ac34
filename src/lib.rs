//! Signed listing and download of LCE Gateway portal reports.

pub mod core;
pub mod gateway;
pub mod output;
pub mod reports;
