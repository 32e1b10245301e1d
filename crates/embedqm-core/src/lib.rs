//! # embedqm Core Library
//!
//! A self-consistent coupling engine for a quantum-mechanical (QM) core embedded in a
//! polarizable classical (MM) environment.
//!
//! ## Architectural Philosophy
//!
//! The library follows a layered architecture with a clear separation of concerns.
//!
//! - **[`core`]: The Foundation.** Stateless data models for the embedded region
//!   (`PolarSite`, `PolarSegment`, `EmbeddedRegion`), the element table, and the
//!   file formats for job input and program exchange.
//!
//! - **[`engine`]: The Logic Core.** The stateful outer loop. The `Orchestrator`
//!   alternates classical induction and QM solves, records every iteration, and
//!   decides convergence through the `ConvergenceTracker`. External programs are
//!   reached only through the traits in `engine::collaborators`.
//!
//! - **[`backends`]: The Adapters.** Implementations of those traits that drive
//!   external programs or replay recorded results, selected by configuration.
//!
//! - **[`workflows`]: The Public API.** Runs many independent jobs, in parallel when
//!   the `parallel` feature is enabled, and summarizes their outcomes.

pub mod backends;
pub mod core;
pub mod engine;
pub mod workflows;
