use crate::cli::FitArgs;
use crate::config::{self, FitPlan};
use crate::error::{CliError, Result};
use crate::ui::CliProgressHandler;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::{BufReader, Write};
use tensorfit::core::io::{dataset, table};
use tensorfit::core::models::context::{AnalysisContext, ModelType};
use tensorfit::engine::ProgressReporter;
use tensorfit::workflows::{diagnostics, fit};
use tracing::info;

pub fn run(args: FitArgs) -> Result<()> {
    let plan = config::load_plan(&args.config, &args)?;

    info!("Loading the system definition from {:?}", &args.system);
    let mut context = AnalysisContext::new();
    dataset::load_file(&mut context, &args.system).map_err(|e| CliError::FileParsing {
        path: args.system.clone(),
        source: e.into(),
    })?;

    for input in &plan.rdc_inputs {
        info!(
            align_id = %input.align_id,
            "Reading RDC data from {:?}", &input.file
        );
        let reader = BufReader::new(File::open(&input.file)?);
        let count = table::read_rdc(&mut context, &input.align_id, reader, &input.table)
            .map_err(|e| CliError::FileParsing {
                path: input.file.clone(),
                source: e.into(),
            })?;
        println!(
            "Read {} RDC value(s) for alignment '{}'.",
            count, input.align_id
        );
    }

    fit::select_model(&mut context, plan.model);
    fit::number_of_states(&mut context, plan.n_states)?;
    if let Some(domain) = &plan.ref_domain {
        fit::set_ref_domain(&mut context, domain)?;
    }

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    if let Some(grid) = &plan.grid {
        println!("Starting the grid search...");
        fit::grid_search(&mut context, grid, &reporter)?;
    }

    println!("Starting the minimisation...");
    fit::minimise(&mut context, &plan.minimise, None, &reporter)?;

    if let Some(replicates) = plan.monte_carlo {
        println!("Propagating errors over {replicates} Monte Carlo replicate(s)...");
        let mut rng = match plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        fit::monte_carlo(&mut context, replicates, &plan.minimise, &mut rng, &reporter)?;
        if plan.model == ModelType::TwoDomain {
            fit::fold_angles(&mut context);
        }
    }

    print_summary(&context);
    write_outputs(&context, &plan)?;
    Ok(())
}

fn print_summary(context: &AnalysisContext) {
    if let Some(chi2) = context.stats.chi2 {
        println!(
            "Fit complete: chi2 = {:.6e} after {} iteration(s).",
            chi2, context.stats.iterations
        );
    }
    if let Some(warning) = &context.stats.warning {
        println!("Warning: {warning}");
    }
    for align_id in &context.rdc_ids {
        if let Some(q) = context.q_rdc_norm2.get(align_id) {
            println!("  Q factor ('{align_id}', RDC-normalised): {q:.6}");
        }
    }
    if let Some(total) = context.q_rdc_norm2_total {
        println!("  Q factor (total, RDC-normalised): {total:.6}");
    }
    if let Some(probs) = fit::full_populations(context) {
        let formatted: Vec<String> = probs.iter().map(|p| format!("{p:.4}")).collect();
        println!("  State populations: [{}]", formatted.join(", "));
        if let Some(errors) = &context.probs_errors {
            let formatted: Vec<String> = errors.iter().map(|e| format!("{e:.4}")).collect();
            println!("  Population errors: [{}]", formatted.join(", "));
        }
    }
}

fn write_outputs(context: &AnalysisContext, plan: &FitPlan) -> Result<()> {
    if let Some(path) = &plan.report_path {
        let report = diagnostics::display(context, None)?;
        File::create(path)?.write_all(report.as_bytes())?;
        println!("Tensor report written to: {}", path.display());
    }
    if let Some(path) = &plan.plot_path {
        let mut file = File::create(path)?;
        diagnostics::corr_plot(context, plan.plot_format, &mut file)?;
        println!("Correlation plot written to: {}", path.display());
    }
    Ok(())
}
