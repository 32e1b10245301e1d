use super::site::PolarSite;

/// A molecular fragment made of polar sites.
///
/// Segments are the unit the embedded region is partitioned into: whole
/// segments are assigned to the QM core or to one of the classical shells.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarSegment {
    /// Identifier of the segment in the parent topology.
    pub id: usize,
    /// Segment name (e.g., "C60").
    pub name: String,
    /// The sites of this segment, in input order.
    pub sites: Vec<PolarSite>,
}

impl PolarSegment {
    pub fn new(id: usize, name: &str, sites: Vec<PolarSite>) -> Self {
        Self {
            id,
            name: name.to_string(),
            sites,
        }
    }

    /// Sum of the monopoles of all sites.
    pub fn total_charge(&self) -> f64 {
        self.sites.iter().map(|s| s.charge).sum()
    }
}
