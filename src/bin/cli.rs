//! Command-line interface for compiling reaction networks.
//!
//! # Usage
//!
//! ```bash
//! # Stan ODE function of a network
//! kinetics-codegen stan --path network.json --function-name odes
//!
//! # Antimony model block
//! kinetics-codegen antimony --path network.json --name pathway
//!
//! # Evaluate the rate vector at a state
//! kinetics-codegen rates --path network.json --state 1.0,0.5 --time 2.0
//! ```

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;
use kinetics_codegen::{
    emit::{AntimonyEmitter, AntimonyOptions, Emitter, StanEmitter, StanOptions},
    io::load_network,
    jacobian::SymbolicJacobian,
    rates::{RateOptions, RateVector},
    stoich::StoichiometryMatrix,
    types::Inputs,
};

#[derive(Parser)]
#[command(name = "kinetics-codegen")]
#[command(about = "Compile reaction networks into rate functions and ODE model code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit the right-hand side as a Stan ODE function
    Stan {
        /// Path to the JSON network description
        #[arg(short, long)]
        path: PathBuf,

        /// Name of the emitted function
        #[arg(long, default_value = "odes")]
        function_name: String,

        /// File to write the code to instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit an Antimony model block
    Antimony {
        /// Path to the JSON network description
        #[arg(short, long)]
        path: PathBuf,

        /// Name of the model
        #[arg(short, long, default_value = "model")]
        name: String,

        /// File to write the code to instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the stoichiometry matrix
    Stoich {
        /// Path to the JSON network description
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Print the non-zero entries of the symbolic Jacobian
    Jacobian {
        /// Path to the JSON network description
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Evaluate the rate of every reaction
    Rates {
        /// Path to the JSON network description
        #[arg(short, long)]
        path: PathBuf,

        /// Species values, in species order
        #[arg(short, long, value_delimiter = ',', num_args = 1..)]
        state: Vec<f64>,

        /// Time point; binds the network's time symbol
        #[arg(short, long)]
        time: Option<f64>,

        /// Fit-vector values; estimated parameters are read from here
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        params: Option<Vec<f64>>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Stan {
            path,
            function_name,
            output,
        } => {
            let network = load_network(&path)?;
            let code = StanEmitter::new(StanOptions { function_name }).emit(&network)?;
            write_code(&code, output)?;
        }
        Commands::Antimony { path, name, output } => {
            let network = load_network(&path)?;
            let emitter = AntimonyEmitter::new(AntimonyOptions {
                model_name: name,
                ..AntimonyOptions::default()
            });
            write_code(&emitter.emit(&network)?, output)?;
        }
        Commands::Stoich { path } => {
            let network = load_network(&path)?;
            network.validate()?;
            let matrix = StoichiometryMatrix::build(
                &network.species,
                &network.reactions,
                &network.mass_balances,
            )?;
            print!("{matrix}");
        }
        Commands::Jacobian { path } => {
            let network = load_network(&path)?;
            print!("{}", SymbolicJacobian::build(&network)?);
        }
        Commands::Rates {
            path,
            state,
            time,
            params,
        } => {
            let network = load_network(&path)?;
            let rates = RateVector::build(
                &network,
                RateOptions {
                    time_is_input: time.is_some(),
                    params_is_input: params.is_some(),
                },
            )?;
            let tunables = if params.is_some() {
                network.tune_values()
            } else {
                Vec::new()
            };
            let p = params.unwrap_or_default();
            let inputs = Inputs::state(&state)
                .at(time.unwrap_or(0.0))
                .with_params(&p)
                .with_tunables(&tunables);
            for (reaction, value) in rates.reactions().iter().zip(rates.eval(&inputs)?) {
                println!("{}: {value}", reaction.cyan());
            }
        }
    }
    Ok(())
}

fn write_code(code: &str, output: Option<PathBuf>) -> std::io::Result<()> {
    match output {
        Some(path) => fs::write(path, code),
        None => {
            print!("{code}");
            Ok(())
        }
    }
}
