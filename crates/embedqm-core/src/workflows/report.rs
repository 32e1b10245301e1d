use super::batch::JobReport;
use crate::engine::orchestrator::JobStatus;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    id: u64,
    tag: &'a str,
    status: String,
    iterations: usize,
    e_qm: f64,
    e_sf: f64,
    e_ex: f64,
    e_mm: Option<f64>,
    e_qmmm: f64,
    rms_dr: Option<f64>,
    rms_dq: Option<f64>,
    sum_dq: Option<f64>,
    qm_core: usize,
    near_field: usize,
    far_field: usize,
    reason: Option<&'a str>,
}

impl<'a> From<&'a JobReport> for SummaryRow<'a> {
    fn from(report: &'a JobReport) -> Self {
        let record = report.outcome.final_record.as_ref();
        let residuals = record.map(|r| *r.residuals());
        let (qm_core, near_field, far_field) = report.shell_sizes;
        Self {
            id: report.id,
            tag: &report.tag,
            status: report.outcome.status.to_string(),
            iterations: report.outcome.iterations,
            e_qm: report.energies.qm,
            e_sf: report.energies.self_field,
            e_ex: report.energies.excited,
            e_mm: record.map(|r| r.mm_energy()),
            e_qmmm: report.energies.qmmm,
            rms_dr: residuals.map(|d| d.position_rms),
            rms_dq: residuals.map(|d| d.charge_rms),
            sum_dq: residuals.map(|d| d.charge_sum),
            qm_core,
            near_field,
            far_field,
            reason: match &report.outcome.status {
                JobStatus::Failed { reason, .. } => Some(reason.as_str()),
                _ => None,
            },
        }
    }
}

/// One-line summary of a job, as printed after a batch.
pub fn info_line(report: &JobReport) -> String {
    let (core, near, far) = report.shell_sizes;
    let e = &report.energies;
    let mut line = format!(
        "{:>5} {:<12} {:<18} IT={:<3} E_QM={:+.8e} E_SF={:+.8e} E_EX={:+.8e} E_QMMM={:+.8e} | {}/{}/{}",
        report.id,
        report.tag,
        report.outcome.status.to_string(),
        report.outcome.iterations,
        e.qm,
        e.self_field,
        e.excited,
        e.qmmm,
        core,
        near,
        far
    );
    if let JobStatus::Failed { reason, .. } = &report.outcome.status {
        line.push_str(" | ");
        line.push_str(reason);
    }
    line
}

/// Writes one CSV row per job, with a header.
pub fn write_summary<W: Write>(writer: W, reports: &[JobReport]) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    for report in reports {
        csv.serialize(SummaryRow::from(report))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_summary_to_path(path: &Path, reports: &[JobReport]) -> Result<(), ReportError> {
    let file = File::create(path)?;
    write_summary(file, reports)
}
