use super::config::ConvergenceCriteria;
use super::record::IterationRecord;
use std::fmt;

/// Outcome of one convergence check, with each criterion exposed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConvergenceFlags {
    pub position: bool,
    pub charge: bool,
    pub qm_energy: bool,
    pub mm_energy: bool,
    /// Change of the QM energy between the last two iterations, if evaluated.
    pub qm_energy_delta: Option<f64>,
    /// Change of the classical energy between the last two iterations, if evaluated.
    pub mm_energy_delta: Option<f64>,
}

impl ConvergenceFlags {
    pub fn is_converged(&self) -> bool {
        self.position && self.charge && self.qm_energy && self.mm_energy
    }
}

impl fmt::Display for ConvergenceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dR={} dQ={} QM={} MM={}",
            self.position, self.charge, self.qm_energy, self.mm_energy
        )
    }
}

/// Compares the last two iteration records against the job's thresholds.
///
/// The tracker holds no state between calls: the same history always yields
/// the same flags.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceTracker {
    criteria: ConvergenceCriteria,
}

impl ConvergenceTracker {
    pub fn new(criteria: ConvergenceCriteria) -> Self {
        Self { criteria }
    }

    pub fn check(&self, history: &[IterationRecord]) -> ConvergenceFlags {
        let [.., previous, latest] = history else {
            return ConvergenceFlags::default();
        };

        let residuals = latest.residuals();
        let d_qm = latest.qm_energy() - previous.qm_energy();
        let d_mm = latest.mm_energy() - previous.mm_energy();
        let c = &self.criteria;

        ConvergenceFlags {
            position: residuals.position_rms <= c.max_position_rms,
            charge: residuals.charge_rms <= c.max_charge_rms,
            qm_energy: d_qm * d_qm <= c.max_qm_energy_change * c.max_qm_energy_change,
            mm_energy: d_mm * d_mm <= c.max_mm_energy_change * c.max_mm_energy_change,
            qm_energy_delta: Some(d_qm),
            mm_energy_delta: Some(d_mm),
        }
    }
}
