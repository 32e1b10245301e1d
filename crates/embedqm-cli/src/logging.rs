use crate::error::{CliError, Result};
use embedqm::engine::context::JobContext;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Dispatch, Subscriber, warn};
use tracing_subscriber::{Layer, filter::LevelFilter, fmt, prelude::*, registry::LookupSpan};

pub const JOB_LOG_FILE: &str = "job.log";

pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn console_layer<S>() -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
}

fn file_layer<S>(file: Arc<File>) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
}

/// Sinks of the global subscriber that job subscribers must keep writing to.
#[derive(Debug, Clone)]
pub struct LogSinks {
    pub console_level: LevelFilter,
    /// The `--log-file` destination, shared with every job subscriber.
    pub log_file: Option<Arc<File>>,
}

impl LogSinks {
    pub fn new(console_level: LevelFilter, log_file: Option<File>) -> Self {
        Self {
            console_level,
            log_file: log_file.map(Arc::new),
        }
    }
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<LogSinks> {
    let file = log_file
        .map(|path| File::create(&path).map_err(CliError::Io))
        .transpose()?;
    let sinks = LogSinks::new(level_filter(verbosity, quiet), file);

    tracing_subscriber::registry()
        .with(sinks.console_level)
        .with(console_layer())
        .with(sinks.log_file.clone().map(file_layer))
        .init();

    Ok(sinks)
}

/// Builds the subscriber used while a single job runs.
///
/// Events keep reaching the console and the `--log-file` destination at the console level;
/// the job's own `job.log` always records at least INFO. Returns `None` when the log file
/// cannot be created, in which case the job falls back to the global subscriber.
pub fn job_log_dispatch(job: &JobContext, sinks: &LogSinks) -> Option<Dispatch> {
    let path = job.work_dir().join(JOB_LOG_FILE);
    let file = match std::fs::create_dir_all(job.work_dir()).and_then(|_| File::create(&path)) {
        Ok(file) => file,
        Err(e) => {
            warn!(
                "Cannot create job log {:?}: {}. Falling back to the global log.",
                path, e
            );
            return None;
        }
    };
    let level = sinks.console_level;

    let subscriber = tracing_subscriber::registry()
        .with(console_layer().with_filter(level))
        .with(sinks.log_file.clone().map(|f| file_layer(f).with_filter(level)))
        .with(file_layer(Arc::new(file)).with_filter(level.max(LevelFilter::INFO)));

    Some(Dispatch::new(subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedqm::core::io::jobfile::JobFile;
    use embedqm::core::models::region::EmbeddedRegion;
    use embedqm::engine::config::EngineConfigBuilder;
    use serial_test::serial;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info, trace};

    static INIT: Once = Once::new();

    fn h_region() -> EmbeddedRegion {
        JobFile::parse(
            r#"
[[job]]
id = 1
tag = "h"

[[job.qm-core]]
id = 1
name = "H"
sites = [{ element = "H", position = [0.0, 0.0, 0.0] }]
"#,
        )
        .unwrap()
        .remove(0)
        .region
    }

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    fn verbosity_maps_to_level_filters() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(7, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn job_log_receives_events_emitted_under_its_dispatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EngineConfigBuilder::new()
            .work_dir(temp_dir.path().to_path_buf())
            .build()
            .unwrap();
        let job = JobContext::new(4, "gs", h_region(), &config).unwrap();

        let dispatch = job_log_dispatch(&job, &LogSinks::new(LevelFilter::OFF, None)).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            info!("Message for the job log.");
            debug!("Below the job log level.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(job.work_dir().join(JOB_LOG_FILE)).unwrap();
        assert!(content.contains("Message for the job log."));
        assert!(!content.contains("Below the job log level."));
    }

    #[test]
    #[serial]
    fn job_events_reach_both_the_job_log_and_the_global_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EngineConfigBuilder::new()
            .work_dir(temp_dir.path().join("runs"))
            .build()
            .unwrap();
        let job = JobContext::new(5, "ct", h_region(), &config).unwrap();
        let global_path = temp_dir.path().join("global.log");
        let sinks = LogSinks::new(
            LevelFilter::INFO,
            Some(File::create(&global_path).unwrap()),
        );

        let dispatch = job_log_dispatch(&job, &sinks).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            info!("Iteration summary for job five.");
            debug!("Below the console level.");
        });

        thread::sleep(Duration::from_millis(100));

        let job_log = std::fs::read_to_string(job.work_dir().join(JOB_LOG_FILE)).unwrap();
        let global_log = std::fs::read_to_string(&global_path).unwrap();
        assert!(job_log.contains("Iteration summary for job five."));
        assert!(global_log.contains("Iteration summary for job five."));
        assert!(!global_log.contains("Below the console level."));
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
