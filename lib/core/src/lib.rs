//! Core domain types and utilities for the slatebase platform.
//!
//! This crate provides the foundational identifier types and error handling
//! shared by the automation engine and scheduler crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, JobId, ParseIdError, WorkflowId};
