//! Command implementations for the CLI
//!
//! - start: Start the tracker server
//! - test: Test configuration validity
//! - config: Configuration display and validation
//! - scan: One-off diagnostic log scan

pub mod config;
pub mod scan;
pub mod start;
pub mod test;
