//! # Workflows Module
//!
//! High-level entry points: evaluating a batch of jobs and summarizing the results.

pub mod batch;
pub mod report;
