//! # Job Store Testing Utils
//!
//! Shared testing utilities for the job store workspace.
//!
//! ## Features
//!
//! - **Test Data Builders**: job and trigger records with sensible defaults
//! - **Fault Injection**: repository wrappers that fail on demand
//! - **Test Stores**: in-memory and file-backed SQLite stores shared by simulated nodes
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! jobstore-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust
//! use jobstore_testing_utils::{JobBuilder, TriggerBuilder};
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
