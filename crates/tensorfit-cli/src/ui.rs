//! Terminal progress reporting.
//!
//! The core library never prints; it emits [`Progress`] events through a
//! caller-supplied callback. This module turns those events into indicatif
//! progress bars and spinners on the terminal.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tensorfit::engine::{Progress, ProgressCallback};

#[derive(Default)]
struct Bars {
    /// The current grid search bar or minimisation spinner.
    task: Option<ProgressBar>,
    /// The Monte Carlo replicate bar. Kept separately because each replicate
    /// runs a full minimisation whose events must not finish this bar.
    simulation: Option<ProgressBar>,
}

pub struct CliProgressHandler {
    mp: MultiProgress,
    bars: Arc<Mutex<Bars>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self {
            mp: MultiProgress::new(),
            bars: Arc::new(Mutex::new(Bars::default())),
        }
    }

    /// The callback to hand to a `ProgressReporter`.
    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let mp = self.mp.clone();
        let bars = Arc::clone(&self.bars);

        Box::new(move |event: Progress| {
            // A poisoned lock only ever means another callback panicked;
            // dropping the event is the sane response.
            let Ok(mut bars) = bars.lock() else {
                return;
            };
            match event {
                Progress::GridStart { total_points } => {
                    let pb = mp.add(ProgressBar::new(total_points));
                    pb.set_style(bar_style());
                    pb.set_message("Grid search");
                    bars.task = Some(pb);
                }
                Progress::GridPoint => {
                    if let Some(pb) = bars.task.as_ref() {
                        pb.inc(1);
                    }
                }
                Progress::GridFinish { chi2 } => {
                    if let Some(pb) = bars.task.take() {
                        pb.finish_with_message(format!("Grid search done (chi2 = {chi2:.6e})"));
                    }
                }
                Progress::Iteration { iteration, chi2 } => {
                    // Replicate fits are tracked by the simulation bar alone.
                    if bars.simulation.is_some() {
                        return;
                    }
                    let pb = bars.task.get_or_insert_with(|| {
                        let pb = mp.add(ProgressBar::new_spinner());
                        pb.set_style(spinner_style());
                        pb.enable_steady_tick(Duration::from_millis(100));
                        pb
                    });
                    pb.set_message(format!("Minimising: k = {iteration}, chi2 = {chi2:.6e}"));
                }
                Progress::MinimiseFinish { chi2 } => {
                    if bars.simulation.is_some() {
                        return;
                    }
                    if let Some(pb) = bars.task.take() {
                        pb.finish_with_message(format!("Minimised (chi2 = {chi2:.6e})"));
                    }
                }
                Progress::SimulationStart { replicates } => {
                    let pb = mp.add(ProgressBar::new(replicates));
                    pb.set_style(bar_style());
                    pb.set_message("Monte Carlo simulations");
                    bars.simulation = Some(pb);
                }
                Progress::SimulationStep => {
                    if let Some(pb) = bars.simulation.as_ref() {
                        pb.inc(1);
                    }
                }
                Progress::SimulationFinish => {
                    if let Some(pb) = bars.simulation.take() {
                        pb.finish_with_message("Monte Carlo simulations done");
                    }
                }
                Progress::Message(text) => {
                    let _ = mp.println(text);
                }
            }
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

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<28} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
