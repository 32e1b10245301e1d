//! # Engine Module
//!
//! The stateful layer of embedqm: it drives the self-consistent coupling between a
//! quantum-mechanical core and its polarizable classical environment for one job.
//!
//! ## Overview
//!
//! Each job is evaluated by an [`orchestrator::Orchestrator`] that owns the job's
//! external collaborators (QM engine, classical inductor, optional charge projector,
//! multipole analyzer and archive writer) and iterates until the QM core's positions,
//! charges and energies stop changing, or until the iteration budget is spent.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Convergence criteria, coupling mode, excited-state selection
//! - **Job State** ([`context`]) - Identity, embedded region, charge and multiplicity of a job
//! - **Iteration Records** ([`record`]) - Energies and residuals of each completed iteration
//! - **Convergence** ([`convergence`]) - Stateless comparison of the last two iterations
//! - **Excited States** ([`selector`]) - Filtering of computed excited states
//! - **Collaborators** ([`collaborators`]) - Traits implemented by QM and classical backends
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Job failure taxonomy

pub mod collaborators;
pub mod config;
pub mod context;
pub mod convergence;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod selector;
