use crate::backends::factory::CollaboratorFactory;
use crate::core::io::jobfile::JobSpec;
use crate::engine::config::EngineConfig;
use crate::engine::context::{JobContext, JobEnergies};
use crate::engine::convergence::ConvergenceFlags;
use crate::engine::error::EngineError;
use crate::engine::orchestrator::{JobOutcome, JobStatus, Orchestrator};
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::PathBuf;
use tracing::{Dispatch, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Produces the log destination of a job, if it should have its own.
pub type LogSinkFactory<'a> = dyn Fn(&JobContext) -> Option<Dispatch> + Sync + 'a;

/// Result of one job of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub id: u64,
    pub tag: String,
    /// Segment counts of the QM core, near field and far field.
    pub shell_sizes: (usize, usize, usize),
    pub work_dir: Option<PathBuf>,
    pub energies: JobEnergies,
    pub outcome: JobOutcome,
}

impl JobReport {
    fn failed(spec: &JobSpec, work_dir: Option<PathBuf>, error: &EngineError) -> Self {
        Self {
            id: spec.id,
            tag: spec.tag.clone(),
            shell_sizes: spec.region.shell_sizes(),
            work_dir,
            energies: JobEnergies::default(),
            outcome: JobOutcome {
                status: JobStatus::Failed {
                    kind: error.kind(),
                    reason: error.to_string(),
                },
                iterations: 0,
                final_record: None,
                flags: ConvergenceFlags::default(),
                diagnostics: Vec::new(),
            },
        }
    }
}

/// Evaluates every job, independently and in parallel when the `parallel`
/// feature is enabled. Reports are returned in input order.
#[instrument(skip_all, name = "batch_workflow")]
pub fn run(
    jobs: &[JobSpec],
    config: &EngineConfig,
    factory: &dyn CollaboratorFactory,
    log_sink: Option<&LogSinkFactory<'_>>,
    reporter: &ProgressReporter,
) -> Vec<JobReport> {
    info!("Evaluating {} jobs.", jobs.len());
    reporter.report(Progress::PhaseStart {
        name: "Evaluation",
    });
    reporter.report(Progress::TaskStart {
        total_steps: jobs.len() as u64,
    });

    let evaluate = |spec: &JobSpec| {
        let report = run_job(spec, config, factory, log_sink, reporter);
        reporter.report(Progress::TaskIncrement);
        report
    };

    #[cfg(feature = "parallel")]
    let reports: Vec<JobReport> = jobs.par_iter().map(evaluate).collect();
    #[cfg(not(feature = "parallel"))]
    let reports: Vec<JobReport> = jobs.iter().map(evaluate).collect();

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let failed = reports.iter().filter(|r| r.outcome.status.is_failed()).count();
    if failed > 0 {
        warn!("{} of {} jobs failed.", failed, reports.len());
    } else {
        info!("All {} jobs finished.", reports.len());
    }
    reports
}

fn run_job(
    spec: &JobSpec,
    config: &EngineConfig,
    factory: &dyn CollaboratorFactory,
    log_sink: Option<&LogSinkFactory<'_>>,
    reporter: &ProgressReporter,
) -> JobReport {
    let mut job = match JobContext::new(spec.id, &spec.tag, spec.region.clone(), config) {
        Ok(job) => job,
        Err(e) => {
            warn!(id = spec.id, "Job rejected: {}", e);
            return JobReport::failed(spec, None, &e);
        }
    };

    match log_sink.and_then(|sink| sink(&job)) {
        Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || {
            evaluate_job(spec, &mut job, config, factory, reporter)
        }),
        None => evaluate_job(spec, &mut job, config, factory, reporter),
    }
}

fn evaluate_job(
    spec: &JobSpec,
    job: &mut JobContext,
    config: &EngineConfig,
    factory: &dyn CollaboratorFactory,
    reporter: &ProgressReporter,
) -> JobReport {
    let work_dir = Some(job.work_dir().to_path_buf());
    let collaborators = match factory.build(job, config) {
        Ok(c) => c,
        Err(e) => {
            warn!(id = spec.id, "Could not set up collaborators: {}", e);
            return JobReport::failed(spec, work_dir, &e);
        }
    };

    let outcome = Orchestrator::new(config, collaborators, reporter).evaluate(job);
    JobReport {
        id: job.id(),
        tag: job.tag().to_string(),
        shell_sizes: job.region().shell_sizes(),
        work_dir,
        energies: job.energies(),
        outcome,
    }
}
