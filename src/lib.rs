//! Pull request reporting for GitHub organizations, plus a small uploader
//! that pushes CSV files into Google Sheets.

pub mod config;
pub mod github;
pub mod report;
pub mod resolve;
pub mod sheets;
