use crate::cli::RunArgs;
use crate::config::PartialAppConfig;
use crate::error::{CliError, Result};
use crate::logging::{self, LogSinks};
use crate::utils::progress::CliProgressHandler;
use embedqm::{
    core::io::jobfile::{JobFile, JobSpec},
    engine::{context::JobContext, progress::ProgressReporter},
    workflows::{self, batch::LogSinkFactory},
};
use std::path::Path;
use tracing::{Dispatch, info, warn};

pub fn run(args: RunArgs, log_sinks: &LogSinks) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = PartialAppConfig::load(&args.config)?;

    let jobs = load_jobs(&args.jobs)?;
    std::fs::create_dir_all(&app.engine.work_dir)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let job_sink =
        |job: &JobContext| -> Option<Dispatch> { logging::job_log_dispatch(job, log_sinks) };
    let log_sink: Option<&LogSinkFactory<'_>> = if args.no_job_logs {
        None
    } else {
        Some(&job_sink)
    };

    println!(
        "Evaluating {} job(s) in {} mode under {}...",
        jobs.len(),
        if app.engine.mode.is_polarizable() {
            "polarizable"
        } else {
            "static"
        },
        app.engine.work_dir.display()
    );
    info!("Invoking the batch workflow...");
    let reports = workflows::batch::run(&jobs, &app.engine, &app.backends, log_sink, &reporter);

    for report in &reports {
        println!("{}", workflows::report::info_line(report));
    }

    if let Some(path) = &args.summary {
        info!("Writing summary to {:?}", path);
        workflows::report::write_summary_to_path(path, &reports)?;
        println!("Summary written to: {}", path.display());
    }

    let failed = reports
        .iter()
        .filter(|r| r.outcome.status.is_failed())
        .count();
    if failed > 0 {
        warn!("{} of {} jobs failed.", failed, reports.len());
        return Err(CliError::JobsFailed {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}

pub(crate) fn load_jobs(path: &Path) -> Result<Vec<JobSpec>> {
    info!("Loading jobs from {:?}", path);
    let jobs = JobFile::read_from_path(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    if jobs.is_empty() {
        return Err(CliError::Argument(format!(
            "Job file '{}' contains no jobs.",
            path.display()
        )));
    }
    Ok(jobs)
}
