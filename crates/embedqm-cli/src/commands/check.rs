use super::run::load_jobs;
use crate::cli::CheckArgs;
use crate::config::PartialAppConfig;
use crate::error::Result;
use embedqm::engine::context::JobContext;
use tracing::{info, warn};

/// Validates configuration and jobs without touching the file system or running any program.
pub fn run(args: CheckArgs) -> Result<()> {
    let app = PartialAppConfig::load(&args.config)?;
    let jobs = load_jobs(&args.jobs)?;

    let mut invalid = 0;
    for spec in &jobs {
        match JobContext::new(spec.id, &spec.tag, spec.region.clone(), &app.engine) {
            Ok(job) => {
                let (core, near, far) = job.region().shell_sizes();
                info!(
                    "Job {} ({}): charge {}, multiplicity {}, shells {}/{}/{}",
                    job.id(),
                    job.tag(),
                    job.charge(),
                    job.multiplicity(),
                    core,
                    near,
                    far
                );
            }
            Err(e) => {
                warn!("Job {} ({}) is invalid: {}", spec.id, spec.tag, e);
                println!("  Job {} ({}): {}", spec.id, spec.tag, e);
                invalid += 1;
            }
        }
    }

    println!(
        "Configuration OK ({} mode, max {} iterations). {} of {} job(s) valid.",
        if app.engine.mode.is_polarizable() {
            "polarizable"
        } else {
            "static"
        },
        app.engine.convergence.max_iterations,
        jobs.len() - invalid,
        jobs.len()
    );

    if invalid > 0 {
        return Err(crate::error::CliError::JobsFailed {
            failed: invalid,
            total: jobs.len(),
        });
    }
    Ok(())
}
