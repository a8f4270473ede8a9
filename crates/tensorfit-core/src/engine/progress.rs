//! Progress reporting for grid searches, minimisation, and replicate loops.

#[derive(Debug, Clone)]
pub enum Progress {
    /// A grid search over a known number of points has started.
    GridStart { total_points: u64 },
    GridPoint,
    GridFinish { chi2: f64 },

    /// Iterative minimisation updates, emitted once per accepted step.
    Iteration { iteration: usize, chi2: f64 },
    MinimiseFinish { chi2: f64 },

    /// The Monte Carlo replicate loop.
    SimulationStart { replicates: u64 },
    SimulationStep,
    SimulationFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards engine events to an optional caller-supplied callback.
///
/// The engine itself never prints; interactive front ends hook a callback in
/// here to drive progress bars or logging.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
