use nalgebra::{Point3, Vector3};

/// A point-multipole site of the embedded region.
///
/// Sites are shared by every shell of the region: the QM core carries the
/// charges fitted to the quantum density, while the near- and far-field shells
/// carry the classical permanent charges and the dipoles induced by the
/// polarization solver.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarSite {
    /// Element symbol of the site (e.g., "C", "O").
    pub element: String,
    /// Cartesian position in Angstroms.
    pub position: Point3<f64>,
    /// Monopole (point charge) in elementary charge units.
    pub charge: f64,
    /// Dipole moment in e·Angstrom.
    pub dipole: Vector3<f64>,
}

impl PolarSite {
    pub fn new(element: &str, position: Point3<f64>, charge: f64) -> Self {
        Self {
            element: element.to_string(),
            position,
            charge,
            dipole: Vector3::zeros(),
        }
    }

    pub fn with_dipole(mut self, dipole: Vector3<f64>) -> Self {
        self.dipole = dipole;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_site_has_zero_dipole() {
        let site = PolarSite::new("O", Point3::new(1.0, 2.0, 3.0), -0.8);
        assert_eq!(site.element, "O");
        assert_eq!(site.charge, -0.8);
        assert_eq!(site.dipole, Vector3::zeros());
    }

    #[test]
    fn with_dipole_overrides_dipole() {
        let site = PolarSite::new("H", Point3::origin(), 0.4).with_dipole(Vector3::new(0.1, 0.0, 0.0));
        assert_eq!(site.dipole.x, 0.1);
    }
}
