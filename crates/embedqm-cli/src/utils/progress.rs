use embedqm::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Console view of a batch: a spinner while a phase starts, then a bar over jobs.
struct BatchView {
    bar: ProgressBar,
    /// Outer iterations completed across all jobs.
    iterations: u64,
}

impl BatchView {
    fn apply(&mut self, event: Progress) {
        let bar = &self.bar;
        match event {
            Progress::PhaseStart { name } => {
                self.iterations = 0;
                bar.reset();
                bar.set_length(0);
                bar.set_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                bar.set_message(name.to_string());
            }
            Progress::TaskStart { total_steps } => {
                bar.disable_steady_tick();
                bar.set_length(total_steps);
                bar.set_position(0);
                bar.set_style(jobs_style());
            }
            Progress::IterationFinish { job_id, iteration } => {
                self.iterations += 1;
                bar.set_message(format!(
                    "job {} iter {} ({} total)",
                    job_id,
                    iteration + 1,
                    self.iterations
                ));
            }
            Progress::TaskIncrement => bar.inc(1),
            Progress::TaskFinish => {
                if let Some(len) = bar.length() {
                    bar.set_position(len);
                }
                bar.finish();
            }
            Progress::PhaseFinish => {
                bar.disable_steady_tick();
                bar.finish_with_message(format!("✓ Done ({} iterations)", self.iterations));
            }
        }
    }
}

#[derive(Clone)]
pub struct CliProgressHandler {
    view: Arc<Mutex<BatchView>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        bar.finish_and_clear();

        Self {
            view: Arc::new(Mutex::new(BatchView { bar, iterations: 0 })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let view = Arc::clone(&self.view);

        Box::new(move |event: Progress| match view.lock() {
            Ok(mut view) => view.apply(event),
            Err(_) => warn!("Progress view mutex was poisoned. Cannot update progress."),
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn jobs_style() -> ProgressStyle {
    ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} jobs ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key(
            "eta",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            },
        )
        .progress_chars("##-")
}
