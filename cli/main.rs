#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use ndarray::Array1;
use std::io;
use std::process;

use gwpop::config::{EvaluationConfig, Model, ModelSpec};
use gwpop::mixture::MixtureSettings;
use gwpop::params::{BinarySamples, HyperParameters};
use gwpop::redshift::SplineRedshiftSettings;
use gwpop::vamana::{CHIRP_MASS_MAXIMUM, CHIRP_MASS_MINIMUM};
use gwpop::{ArrayBackend, CpuBackend};

#[derive(Clone, Copy, ValueEnum)]
pub enum TemplateKind {
    SplineRedshift,
    Mixture,
    Vamana,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to the TOML evaluation config
    pub config: String,

    /// Lower end of the evaluation grid (defaults to the model's natural support)
    #[arg(long)]
    pub minimum: Option<f64>,

    /// Upper end of the evaluation grid (defaults to the model's natural support)
    #[arg(long)]
    pub maximum: Option<f64>,

    /// Number of grid points
    #[arg(long, default_value = "200")]
    pub points: usize,

    /// Primary aligned spin held fixed along the grid (vamana only)
    #[arg(long = "chi-1", default_value = "0.0", allow_hyphen_values = true)]
    pub chi_1: f64,

    /// Secondary aligned spin held fixed along the grid (vamana only)
    #[arg(long = "chi-2", default_value = "0.0", allow_hyphen_values = true)]
    pub chi_2: f64,

    /// Mass ratio held fixed along the grid (vamana only)
    #[arg(long, default_value = "0.8")]
    pub mass_ratio: f64,

    /// Write CSV here instead of standard output
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "gwpop",
    about = "Population density models for compact binary mergers",
    long_about = "Builds a population model from a TOML configuration, lists the \
                 hyper-parameters it reads and evaluates it over a one-dimensional grid."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hyper-parameter names the configured model reads
    #[command(about = "List model hyper-parameters")]
    Names {
        /// Path to the TOML evaluation config
        config: String,
    },

    /// Evaluate the configured model over a grid and write CSV
    #[command(about = "Evaluate a model (outputs: CSV)")]
    Evaluate(EvaluateArgs),

    /// Write an example configuration for one of the model families
    #[command(about = "Write a template config (outputs: model.toml)")]
    Template {
        #[arg(value_enum)]
        kind: TemplateKind,

        #[arg(long, default_value = "model.toml")]
        output: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Names { config }) => names(&config),
        Some(Commands::Evaluate(args)) => evaluate(args),
        Some(Commands::Template { kind, output }) => template(kind, &output),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn names(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = EvaluationConfig::load(config_path)?;
    let model = config.build_model()?;
    for name in model.variable_names() {
        println!("{name}");
    }
    let missing = model
        .variable_names()
        .into_iter()
        .filter(|name| !config.parameters.contains_key(name))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        log::warn!(
            "Config does not set {} of the listed hyper-parameters: {}",
            missing.len(),
            missing.iter().join(", ")
        );
    }
    Ok(())
}

/// Natural evaluation range of each model family.
fn default_range(model: &Model) -> (f64, f64) {
    match model {
        Model::SplineRedshift(model) => (0.0, model.volume().z_max()),
        Model::Mixture(model) => (0.0, model.settings().gaussian_maximum),
        Model::Vamana(_) => (CHIRP_MASS_MINIMUM, CHIRP_MASS_MAXIMUM),
    }
}

fn column_name(model: &Model) -> &'static str {
    match model {
        Model::SplineRedshift(_) => "redshift",
        Model::Mixture(_) => "x",
        Model::Vamana(_) => "chirp_mass",
    }
}

pub fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Loading configuration from: {}", args.config);
    let config = EvaluationConfig::load(&args.config)?;
    let model = config.build_model()?;

    let (low, high) = default_range(&model);
    let minimum = args.minimum.unwrap_or(low);
    let maximum = args.maximum.unwrap_or(high);
    if !(minimum < maximum) || args.points < 2 {
        return Err(format!(
            "Evaluation grid needs minimum < maximum and at least 2 points, got [{minimum}, {maximum}] with {} points",
            args.points
        )
        .into());
    }
    let grid = CpuBackend.linspace(minimum, maximum, args.points);
    log::info!(
        "Evaluating {} model on {} points in [{minimum}, {maximum}]",
        model.kind(),
        args.points
    );

    let density = match &model {
        Model::Vamana(vamana) => {
            let chi_1 = Array1::from_elem(grid.len(), args.chi_1);
            let chi_2 = Array1::from_elem(grid.len(), args.chi_2);
            let mass_ratio = Array1::from_elem(grid.len(), args.mass_ratio);
            let samples =
                BinarySamples::new(grid.view(), chi_1.view(), chi_2.view(), mass_ratio.view())?;
            vamana.evaluate(&samples, &config.parameters)?
        }
        other => other.evaluate(grid.view(), &config.parameters)?,
    };

    let sink: Box<dyn io::Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record([column_name(&model), "density"])?;
    for (x, p) in grid.iter().zip(density.iter()) {
        writer.write_record([x.to_string(), p.to_string()])?;
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        log::info!("Density written to: {path}");
    }
    Ok(())
}

fn template(kind: TemplateKind, output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = match kind {
        TemplateKind::SplineRedshift => {
            let nodes = 5;
            let z_max = 2.3;
            let parameters = (0..nodes)
                .flat_map(|ii| {
                    [
                        (format!("redshift{ii}"), z_max * ii as f64 / (nodes - 1) as f64),
                        (format!("fredshift{ii}"), 0.0),
                    ]
                })
                .collect::<HyperParameters>();
            EvaluationConfig::new(
                ModelSpec::SplineRedshift(SplineRedshiftSettings::new(z_max).with_nodes(nodes)),
                parameters,
            )
        }
        TemplateKind::Mixture => EvaluationConfig::new(
            ModelSpec::Mixture(MixtureSettings::new(2, 1).with_name("mass_")),
            HyperParameters::from([
                ("mass_alpha_1", -1.5),
                ("mass_alpha_2", -3.5),
                ("mass_break_1", 35.0),
                ("mass_weight", 0.05),
                ("mass_mean", 34.0),
                ("mass_sigma", 3.0),
                ("mass_minimum", 5.0),
                ("mass_maximum", 90.0),
            ]),
        ),
        TemplateKind::Vamana => {
            let mut parameters = HyperParameters::from([("weight_0", 0.6), ("mu_m_0", 0.2)]);
            for ii in 0..2 {
                parameters.insert(format!("sigma_m_{ii}"), 0.1);
                parameters.insert(format!("mu_sz_{ii}"), 0.05);
                parameters.insert(format!("sigma_sz_{ii}"), 0.15);
                parameters.insert(format!("alpha_q_{ii}"), 1.0);
                parameters.insert(format!("qmin_{ii}"), 0.1);
            }
            EvaluationConfig::new(
                ModelSpec::Vamana {
                    n_components: 2,
                    reference: None,
                    reference_parameters: None,
                },
                parameters,
            )
        }
    };
    config.save(output)?;
    println!("Template written to: {output}");
    Ok(())
}
