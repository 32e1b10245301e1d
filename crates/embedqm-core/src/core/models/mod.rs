//! # Models Module
//!
//! Data structures describing the embedded region of a QM/MM job: point-multipole
//! sites grouped into segments, the three concentric shells (QM core, near field,
//! far field), and the atom representation handed to quantum-chemistry engines.
//!
//! - **Sites** ([`site`]) - Point charges and dipoles at Cartesian positions
//! - **Segments** ([`segment`]) - Molecular fragments, the unit of shell assignment
//! - **Region** ([`region`]) - The shells and the QM core bookkeeping (charge, displacement)
//! - **Atoms** ([`atom`]) - Element-resolved atoms for the QM engine

pub mod atom;
pub mod region;
pub mod segment;
pub mod site;
