//! # Core Module
//!
//! The stateless foundation of the engine: the data model of an embedded region
//! and the readers that produce it.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Sites, segments, shells and QM atoms
//! - **File I/O** ([`io`]) - Job file parsing
//!
//! Nothing in this module knows about the outer iteration; the [`crate::engine`]
//! layer drives the collaborators over these types.

pub mod io;
pub mod models;
