use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use olivine::error::{PipelineError, Result};
use olivine::job::{self, InProcessSolver};
use olivine::{input, mesh};

#[derive(Parser)]
#[command(name = "olivine", version, about = "Parametric FEA model authoring and solving")]
struct Cli {
    /// Model description json
    input: PathBuf,

    /// Path for the result database
    #[arg(short, long, default_value = "results.json")]
    output: PathBuf,

    /// SVG profile overriding the first part's sketch
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Solve timeout in seconds
    #[arg(long, default_value_t = 3600)]
    timeout: u64,
}

fn run(cli: &Cli) -> Result<()> {
    let input_path = cli.input.to_str().ok_or_else(|| {
        PipelineError::Input("input path is not valid unicode".to_owned())
    })?;
    let svg_path = match &cli.svg {
        Some(path) => Some(path.to_str().ok_or_else(|| {
            PipelineError::Input("svg path is not valid unicode".to_owned())
        })?),
        None => None,
    };

    let (mut model, spec) = input::load_model(input_path, svg_path)?;
    mesh::generate_mesh(&mut model)?;
    let database = job::run_job(
        &mut model,
        spec,
        Arc::new(InProcessSolver),
        Duration::from_secs(cli.timeout),
    )?;
    if let Some(max) = database.max_displacement_magnitude() {
        println!("info: max displacement magnitude {:.6e}", max);
    }
    database.save(&cli.output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
