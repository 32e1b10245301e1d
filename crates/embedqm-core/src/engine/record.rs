use crate::core::models::region::Displacement;

/// Energies obtained from the QM engine in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QmEnergies {
    /// Electronic energy of the QM core, with the self-field contribution removed.
    pub electronic: f64,
    /// Interaction of the QM core with its own induced field.
    pub self_field: f64,
    /// Excitation energy of the selected excited state, zero for the ground state.
    pub excited: f64,
}

/// Energies reported by the classical inductor in one iteration.
///
/// `f*` are field-mediated terms between the shells (0 = QM core,
/// 1 = near field, 2 = far field), `m*` are monopole terms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassicalEnergies {
    pub f00: f64,
    pub f01: f64,
    pub f02: f64,
    pub f11: f64,
    pub f12: f64,
    pub m0: f64,
    pub m1: f64,
    pub m2: f64,
    /// Total field-mediated interaction energy.
    pub field_total: f64,
}

impl ClassicalEnergies {
    /// Classical energy of the environment used in the convergence check.
    pub fn mm_total(&self) -> f64 {
        self.f11 + self.f12 + self.m1 + self.m2
    }
}

/// Snapshot of one completed outer iteration. Not modifiable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    iteration: usize,
    qm: QmEnergies,
    classical: ClassicalEnergies,
    residuals: Displacement,
}

impl IterationRecord {
    pub fn new(
        iteration: usize,
        qm: QmEnergies,
        classical: ClassicalEnergies,
        residuals: Displacement,
    ) -> Self {
        Self {
            iteration,
            qm,
            classical,
            residuals,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
    pub fn qm(&self) -> &QmEnergies {
        &self.qm
    }
    pub fn classical(&self) -> &ClassicalEnergies {
        &self.classical
    }
    pub fn residuals(&self) -> &Displacement {
        &self.residuals
    }

    pub fn qm_energy(&self) -> f64 {
        self.qm.electronic
    }

    pub fn mm_energy(&self) -> f64 {
        self.classical.mm_total()
    }

    pub fn qmmm_energy(&self) -> f64 {
        self.qm.electronic + self.qm.self_field + self.qm.excited + self.classical.field_total
    }
}
