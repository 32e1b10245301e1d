//! # Backends Module
//!
//! Concrete collaborators for the engine: QM engines and inductors driven
//! through external programs, a replay engine for recorded results, a file
//! archive, and the configuration-driven factory that assembles them per job.

pub mod archive;
pub mod external;
pub mod factory;
mod output;
pub mod replay;
