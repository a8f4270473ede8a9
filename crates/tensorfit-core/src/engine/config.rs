use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Settings for one quasi-Newton minimisation run.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimiseConfig {
    pub max_iterations: usize,
    /// Relative chi-squared change below which the run converges.
    pub func_tol: f64,
    /// Gradient norm below which the run converges.
    pub grad_tol: f64,
    /// Apply the linear population constraints via a quadratic penalty.
    pub constraints: bool,
    /// Apply the diagonal conditioning matrix around the optimisation.
    pub scaling: bool,
}

#[derive(Default)]
pub struct MinimiseConfigBuilder {
    max_iterations: Option<usize>,
    func_tol: Option<f64>,
    grad_tol: Option<f64>,
    constraints: Option<bool>,
    scaling: Option<bool>,
}

impl MinimiseConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn func_tol(mut self, tol: f64) -> Self {
        self.func_tol = Some(tol);
        self
    }
    pub fn grad_tol(mut self, tol: f64) -> Self {
        self.grad_tol = Some(tol);
        self
    }
    pub fn constraints(mut self, on: bool) -> Self {
        self.constraints = Some(on);
        self
    }
    pub fn scaling(mut self, on: bool) -> Self {
        self.scaling = Some(on);
        self
    }

    pub fn build(self) -> Result<MinimiseConfig, ConfigError> {
        let func_tol = self.func_tol.unwrap_or(1e-25);
        if func_tol < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "func_tol",
                reason: format!("must be non-negative, got {func_tol}"),
            });
        }
        Ok(MinimiseConfig {
            max_iterations: self
                .max_iterations
                .ok_or(ConfigError::MissingParameter("max_iterations"))?,
            func_tol,
            grad_tol: self.grad_tol.unwrap_or(1e-8),
            constraints: self.constraints.unwrap_or(true),
            scaling: self.scaling.unwrap_or(true),
        })
    }
}

/// Settings for a grid search.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchConfig {
    /// Grid points per parameter dimension, inclusive of both bounds.
    pub increments: usize,
    /// Per-parameter bound overrides; `None` entries keep the defaults.
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
    pub constraints: bool,
}

#[derive(Default)]
pub struct GridSearchConfigBuilder {
    increments: Option<usize>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
    constraints: Option<bool>,
}

impl GridSearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increments(mut self, increments: usize) -> Self {
        self.increments = Some(increments);
        self
    }
    pub fn lower(mut self, bounds: Vec<f64>) -> Self {
        self.lower = Some(bounds);
        self
    }
    pub fn upper(mut self, bounds: Vec<f64>) -> Self {
        self.upper = Some(bounds);
        self
    }
    pub fn constraints(mut self, on: bool) -> Self {
        self.constraints = Some(on);
        self
    }

    pub fn build(self) -> Result<GridSearchConfig, ConfigError> {
        let increments = self
            .increments
            .ok_or(ConfigError::MissingParameter("increments"))?;
        if increments < 2 {
            return Err(ConfigError::InvalidParameter {
                name: "increments",
                reason: format!("at least 2 points per dimension are needed, got {increments}"),
            });
        }
        Ok(GridSearchConfig {
            increments,
            lower: self.lower,
            upper: self.upper,
            constraints: self.constraints.unwrap_or(true),
        })
    }
}
