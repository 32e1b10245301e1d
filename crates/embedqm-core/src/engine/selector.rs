use super::collaborators::ExcitedStateCandidate;
use super::config::ExcitedStateConfig;

/// Non-fatal remarks produced while selecting excited states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDiagnostic {
    /// No candidate passed the filters; the first candidate is used instead.
    FilterYieldedEmpty,
    /// Both filters are active, which rarely makes physical sense.
    InconsistentFilterCombination,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Positions in the candidate list, in their original order. Never empty.
    pub indices: Vec<usize>,
    pub diagnostics: Vec<SelectionDiagnostic>,
}

/// Filters computed excited states by oscillator strength and charge-transfer
/// magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExcitedStateSelector {
    oscillator_threshold: Option<f64>,
    charge_transfer_threshold: Option<f64>,
}

impl ExcitedStateSelector {
    pub fn new(oscillator_threshold: Option<f64>, charge_transfer_threshold: Option<f64>) -> Self {
        Self {
            oscillator_threshold,
            charge_transfer_threshold,
        }
    }

    pub fn from_config(config: &ExcitedStateConfig) -> Self {
        Self::new(
            config.oscillator_strength_threshold,
            config.charge_transfer_threshold,
        )
    }

    pub fn select(&self, candidates: &[ExcitedStateCandidate]) -> Selection {
        let mut diagnostics = Vec::new();
        if self.oscillator_threshold.is_some() && self.charge_transfer_threshold.is_some() {
            diagnostics.push(SelectionDiagnostic::InconsistentFilterCombination);
        }

        let mut indices: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                self.oscillator_threshold
                    .is_none_or(|t| c.oscillator_strength > t)
            })
            .filter(|(_, c)| {
                self.charge_transfer_threshold
                    .is_none_or(|t| c.charge_transfer.abs() > t)
            })
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            diagnostics.push(SelectionDiagnostic::FilterYieldedEmpty);
            indices.push(0);
        }

        Selection {
            indices,
            diagnostics,
        }
    }
}
