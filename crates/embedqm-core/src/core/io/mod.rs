//! # I/O Module
//!
//! File formats read and written by embedqm: the job file describing the embedded
//! regions to evaluate, and the TOML exchange files shared with external QM and
//! classical programs.

pub mod exchange;
pub mod jobfile;
