//! The analysis configuration file.
//!
//! All fit settings live in one TOML file; a handful of them can be
//! overridden from the command line. The file sections mirror the analysis
//! stages: the model, the per-alignment RDC inputs, the grid search, the
//! minimisation, the Monte Carlo error propagation, and the outputs.

use crate::cli::FitArgs;
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tensorfit::core::io::grace::PlotFormat;
use tensorfit::core::io::table::RdcTableConfig;
use tensorfit::core::models::context::ModelType;
use tensorfit::core::models::spin::RdcDataType;
use tensorfit::engine::config::{
    GridSearchConfig, GridSearchConfigBuilder, MinimiseConfig, MinimiseConfigBuilder,
};
use tracing::debug;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ModelSection {
    #[serde(rename = "type")]
    model_type: ModelType,
    n_states: Option<usize>,
    /// Reference domain name, 2-domain model only.
    ref_domain: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RdcSection {
    align_id: String,
    file: PathBuf,
    #[serde(default)]
    data_type: RdcDataType,
    #[serde(default)]
    absolute: bool,
    spin_id1_col: Option<usize>,
    spin_id2_col: Option<usize>,
    value_col: Option<usize>,
    error_col: Option<usize>,
    separator: Option<char>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct GridSection {
    increments: usize,
    constraints: Option<bool>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct MinimiseSection {
    max_iterations: Option<usize>,
    func_tol: Option<f64>,
    grad_tol: Option<f64>,
    constraints: Option<bool>,
    scaling: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct MonteCarloSection {
    replicates: usize,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PlotFormatName {
    #[default]
    Grace,
    Text,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct OutputSection {
    /// Tensor report destination; written after the fit when set.
    report: Option<PathBuf>,
    /// Measured vs. back-calculated correlation plot destination.
    plot: Option<PathBuf>,
    #[serde(default)]
    plot_format: PlotFormatName,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FitConfigFile {
    model: ModelSection,
    #[serde(default)]
    rdc: Vec<RdcSection>,
    grid_search: Option<GridSection>,
    #[serde(default)]
    minimise: MinimiseSection,
    monte_carlo: Option<MonteCarloSection>,
    #[serde(default)]
    output: OutputSection,
}

/// One RDC input file with its resolved table layout.
#[derive(Debug)]
pub struct RdcInput {
    pub align_id: String,
    pub file: PathBuf,
    pub table: RdcTableConfig,
}

/// The fully resolved analysis plan: config file plus CLI overrides.
#[derive(Debug)]
pub struct FitPlan {
    pub model: ModelType,
    pub n_states: usize,
    pub ref_domain: Option<String>,
    pub rdc_inputs: Vec<RdcInput>,
    pub grid: Option<GridSearchConfig>,
    pub minimise: MinimiseConfig,
    pub monte_carlo: Option<usize>,
    pub seed: Option<u64>,
    pub report_path: Option<PathBuf>,
    pub plot_path: Option<PathBuf>,
    pub plot_format: PlotFormat,
}

pub fn load_plan(path: &Path, args: &FitArgs) -> Result<FitPlan> {
    let text = fs::read_to_string(path)?;
    let file: FitConfigFile = toml::from_str(&text).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    debug!("Parsed analysis configuration: {:?}", &file);

    let n_states = args
        .n_states
        .or(file.model.n_states)
        .ok_or_else(|| CliError::Config("the number of states is not set".to_string()))?;

    let rdc_inputs = file
        .rdc
        .into_iter()
        .map(|section| {
            let defaults = RdcTableConfig::default();
            RdcInput {
                align_id: section.align_id,
                file: section.file,
                table: RdcTableConfig {
                    spin_id1_col: section.spin_id1_col.unwrap_or(defaults.spin_id1_col),
                    spin_id2_col: section.spin_id2_col.unwrap_or(defaults.spin_id2_col),
                    value_col: section.value_col.or(defaults.value_col),
                    error_col: section.error_col.or(defaults.error_col),
                    separator: section.separator,
                    data_type: section.data_type,
                    absolute: section.absolute,
                },
            }
        })
        .collect();

    let grid = match (&file.grid_search, args.skip_grid) {
        (_, true) | (None, _) => None,
        (Some(section), false) => {
            let mut builder = GridSearchConfigBuilder::new()
                .increments(args.increments.unwrap_or(section.increments));
            if let Some(on) = section.constraints {
                builder = builder.constraints(on);
            }
            if let Some(lower) = &section.lower {
                builder = builder.lower(lower.clone());
            }
            if let Some(upper) = &section.upper {
                builder = builder.upper(upper.clone());
            }
            Some(
                builder
                    .build()
                    .map_err(|e| CliError::Config(e.to_string()))?,
            )
        }
    };

    let mut builder = MinimiseConfigBuilder::new().max_iterations(
        args.max_iterations
            .or(file.minimise.max_iterations)
            .unwrap_or(10_000),
    );
    if let Some(tol) = file.minimise.func_tol {
        builder = builder.func_tol(tol);
    }
    if let Some(tol) = file.minimise.grad_tol {
        builder = builder.grad_tol(tol);
    }
    if let Some(on) = file.minimise.constraints {
        builder = builder.constraints(on);
    }
    if let Some(on) = file.minimise.scaling {
        builder = builder.scaling(on);
    }
    let minimise = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let monte_carlo = args
        .replicates
        .or(file.monte_carlo.as_ref().map(|mc| mc.replicates));
    let seed = args.seed.or(file.monte_carlo.as_ref().and_then(|mc| mc.seed));

    Ok(FitPlan {
        model: file.model.model_type,
        n_states,
        ref_domain: file.model.ref_domain,
        rdc_inputs,
        grid,
        minimise,
        monte_carlo,
        seed,
        report_path: file.output.report,
        plot_path: file.output.plot,
        plot_format: match file.output.plot_format {
            PlotFormatName::Grace => PlotFormat::Grace,
            PlotFormatName::Text => PlotFormat::Text,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec![
            "tensorfit",
            "fit",
            "--system",
            "system.toml",
            "--config",
            "fit.toml",
        ];
        argv.extend_from_slice(extra);
        match crate::cli::Cli::parse_from(argv).command {
            crate::cli::Commands::Fit(args) => args,
            _ => unreachable!(),
        }
    }

    fn write_config(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.toml");
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    const CONFIG: &str = r#"
[model]
type = "population"
n-states = 4

[[rdc]]
align-id = "Dy"
file = "dy.rdc"

[grid-search]
increments = 11

[minimise]
max-iterations = 500

[monte-carlo]
replicates = 200
seed = 7
"#;

    #[test]
    fn file_settings_are_resolved() {
        let (_dir, path) = write_config(CONFIG);
        let plan = load_plan(&path, &fit_args(&[])).unwrap();
        assert_eq!(plan.model, ModelType::Population);
        assert_eq!(plan.n_states, 4);
        assert_eq!(plan.grid.as_ref().unwrap().increments, 11);
        assert_eq!(plan.minimise.max_iterations, 500);
        assert_eq!(plan.monte_carlo, Some(200));
        assert_eq!(plan.seed, Some(7));
        assert_eq!(plan.rdc_inputs[0].align_id, "Dy");
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let (_dir, path) = write_config(CONFIG);
        let args = fit_args(&[
            "--n-states",
            "2",
            "--increments",
            "21",
            "--max-iterations",
            "50",
            "--replicates",
            "10",
        ]);
        let plan = load_plan(&path, &args).unwrap();
        assert_eq!(plan.n_states, 2);
        assert_eq!(plan.grid.as_ref().unwrap().increments, 21);
        assert_eq!(plan.minimise.max_iterations, 50);
        assert_eq!(plan.monte_carlo, Some(10));
    }

    #[test]
    fn skip_grid_drops_the_grid_stage() {
        let (_dir, path) = write_config(CONFIG);
        let plan = load_plan(&path, &fit_args(&["--skip-grid"])).unwrap();
        assert!(plan.grid.is_none());
    }

    #[test]
    fn missing_state_count_is_a_config_error() {
        let (_dir, path) = write_config(
            "[model]\ntype = \"fixed\"\n\n[minimise]\nmax-iterations = 100\n",
        );
        let err = load_plan(&path, &fit_args(&[])).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let (_dir, path) = write_config("[model]\ntype = \"fixed\"\n\n[extra]\nkey = 1\n");
        assert!(matches!(
            load_plan(&path, &fit_args(&[])),
            Err(CliError::FileParsing { .. })
        ));
    }
}
