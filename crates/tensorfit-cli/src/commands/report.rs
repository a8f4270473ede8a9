use crate::cli::ReportArgs;
use crate::error::{CliError, Result};
use std::fs::File;
use std::io::Write;
use tensorfit::core::io::dataset;
use tensorfit::core::models::context::AnalysisContext;
use tensorfit::workflows::diagnostics;
use tracing::info;

pub fn run(args: ReportArgs) -> Result<()> {
    info!("Loading the system definition from {:?}", &args.system);
    let mut context = AnalysisContext::new();
    dataset::load_file(&mut context, &args.system).map_err(|e| CliError::FileParsing {
        path: args.system.clone(),
        source: e.into(),
    })?;

    let report = diagnostics::display(&context, args.tensor.as_deref())?;
    match &args.output {
        Some(path) => {
            File::create(path)?.write_all(report.as_bytes())?;
            println!("Tensor report written to: {}", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}
