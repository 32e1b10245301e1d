use super::site::PolarSite;
use nalgebra::Point3;
use phf::phf_map;
use thiserror::Error;

static ATOMIC_NUMBERS: phf::Map<&'static str, u8> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25,
    "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30, "Ga" => 31, "Ge" => 32,
    "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Ag" => 47, "Cd" => 48, "In" => 49, "Sn" => 50, "Sb" => 51,
    "Te" => 52, "I" => 53, "Xe" => 54, "Pt" => 78, "Au" => 79, "Hg" => 80, "Pb" => 82,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElementError {
    #[error("Unknown element symbol: '{0}'")]
    Unknown(String),
}

/// Looks up the atomic number of an element symbol.
///
/// The lookup is case-insensitive in the sense that `"CL"`, `"cl"` and `"Cl"`
/// all resolve to chlorine.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    let trimmed = symbol.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let normalized: String = std::iter::once(first)
        .chain(chars.map(|c| c.to_ascii_lowercase()))
        .collect();
    ATOMIC_NUMBERS.get(normalized.as_str()).copied()
}

/// An atom in the representation consumed by quantum-chemistry engines.
#[derive(Debug, Clone, PartialEq)]
pub struct QmAtom {
    /// Element symbol as given in the input.
    pub element: String,
    /// Atomic number resolved from the element symbol.
    pub atomic_number: u8,
    /// Cartesian position in Angstroms.
    pub position: Point3<f64>,
    /// Partial charge reported for this atom, in elementary charge units.
    pub charge: f64,
    /// Marks atoms that were added from the environment (e.g., link atoms)
    /// rather than translated from the QM core.
    pub from_environment: bool,
}

impl QmAtom {
    pub fn new(element: &str, position: Point3<f64>, charge: f64) -> Result<Self, ElementError> {
        let atomic_number =
            atomic_number(element).ok_or_else(|| ElementError::Unknown(element.to_string()))?;
        Ok(Self {
            element: element.to_string(),
            atomic_number,
            position,
            charge,
            from_environment: false,
        })
    }

    pub fn from_site(site: &PolarSite) -> Result<Self, ElementError> {
        Self::new(&site.element, site.position, site.charge)
    }
}
