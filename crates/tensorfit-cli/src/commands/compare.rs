use crate::cli::{BasisArg, CompareArgs};
use crate::error::{CliError, Result};
use tensorfit::core::io::dataset;
use tensorfit::core::models::context::AnalysisContext;
use tensorfit::workflows::diagnostics::{self, TensorBasis};
use tracing::info;

fn basis_of(arg: BasisArg) -> TensorBasis {
    match arg {
        BasisArg::Matrix => TensorBasis::Matrix,
        BasisArg::Unitary9 => TensorBasis::Unitary9D,
        BasisArg::Unitary5 => TensorBasis::Unitary5D,
        BasisArg::Geometric => TensorBasis::Geometric5D,
        BasisArg::Irreducible => TensorBasis::Irreducible5D,
    }
}

pub fn run(args: CompareArgs) -> Result<()> {
    info!("Loading the system definition from {:?}", &args.system);
    let mut context = AnalysisContext::new();
    dataset::load_file(&mut context, &args.system).map_err(|e| CliError::FileParsing {
        path: args.system.clone(),
        source: e.into(),
    })?;

    let names: Vec<String> = context
        .tensors
        .as_ref()
        .map(|registry| registry.iter().map(|t| t.name.clone()).collect())
        .unwrap_or_default();
    if names.len() < 2 {
        return Err(CliError::Argument(
            "at least two tensors are needed for a comparison".to_string(),
        ));
    }

    let basis = basis_of(args.basis);
    let angles = diagnostics::matrix_angles(&context, basis)?;

    let width = names.iter().map(String::len).max().unwrap_or(0).max(10);
    println!("Inter-tensor angles in degrees ({:?} basis):", args.basis);
    print!("{:>width$}", "");
    for name in &names {
        print!("  {name:>10}");
    }
    println!();
    for (i, name) in names.iter().enumerate() {
        print!("{name:>width$}");
        for j in 0..names.len() {
            print!("  {:>10.4}", angles[(i, j)].to_degrees());
        }
        println!();
    }

    if args.svd {
        let (values, condition) = diagnostics::svd(&context, basis)?;
        println!();
        println!("Singular values of the stacked tensors:");
        for value in &values {
            println!("  {value:25.12e}");
        }
        println!("Condition number: {condition:.6e}");
    }
    Ok(())
}
