#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use simutrial::cohort::{DemographicFilter, Population, load_population};
use simutrial::willingness::{ScoringReport, load_training_data, predict_willingness_scores};
use simutrial::{
    ConsentPolicy, SimuTrialConfig, SimulationOptions, SimulationProgressObserver,
    SimulationResult, simulate,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyCli {
    /// Each patient consents with its own predicted willingness score
    Score,
    /// Each patient draws a probability uniformly from [--min, --max] every run
    Range,
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Population table (.csv, or .tsv/.tab for tab-separated)
    #[arg(value_name = "POPULATION")]
    pub population: PathBuf,

    /// Historical participation table used to train the classifier
    #[arg(long, value_name = "CSV")]
    pub training: PathBuf,

    /// Optional TOML configuration file
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Where to write the scored population
    #[arg(long, default_value = "scores.tsv")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Population table (.csv, or .tsv/.tab for tab-separated)
    #[arg(value_name = "POPULATION")]
    pub population: PathBuf,

    /// Historical participation table; required by --policy score
    #[arg(long, value_name = "CSV")]
    pub training: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = PolicyCli::Score)]
    pub policy: PolicyCli,

    /// Lower bound of the consent probability for --policy range
    #[arg(long, default_value = "0.0")]
    pub min: f64,

    /// Upper bound of the consent probability for --policy range
    #[arg(long, default_value = "1.0")]
    pub max: f64,

    /// Number of simulated trials (defaults to [simulation].num_runs)
    #[arg(long, value_name = "N")]
    pub runs: Option<usize>,

    /// Seed for the run streams (defaults to [simulation].seed, else random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run trials one after another instead of across all cores
    #[arg(long)]
    pub sequential: bool,

    /// Keep only patients strictly older than this age
    #[arg(long, value_name = "AGE")]
    pub min_age: Option<f64>,

    /// Keep only these genders (repeatable)
    #[arg(long, value_name = "GENDER")]
    pub gender: Vec<String>,

    /// Keep only these race/ethnicity categories (repeatable)
    #[arg(long, value_name = "RACE")]
    pub race: Vec<String>,

    /// Optional TOML configuration file
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Where to write the summary
    #[arg(long, default_value = "summary.toml")]
    pub out: PathBuf,

    /// Optional TSV of per-run consent counts
    #[arg(long, value_name = "TSV")]
    pub runs_out: Option<PathBuf>,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(long, default_value = "simutrial.toml")]
    pub out: PathBuf,

    /// Replace the file if it already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
#[command(
    name = "simutrial",
    about = "Monte Carlo estimate of clinical-trial consent and staffing",
    long_about = "Scores patients for willingness to join a clinical trial and simulates \
                  how many would consent, with derived staffing and site needs."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Predict per-patient willingness scores (outputs: scores.tsv)")]
    Score(ScoreArgs),

    #[command(about = "Simulate trial consent (outputs: summary.toml)")]
    Simulate(SimulateArgs),

    #[command(about = "Write the default configuration (outputs: simutrial.toml)")]
    InitConfig(InitConfigArgs),

    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Score(args)) => run_score(args),
        Some(Commands::Simulate(args)) => run_simulate(args),
        Some(Commands::InitConfig(args)) => run_init_config(args),
        Some(Commands::Version) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            let mut command = Cli::command();
            command.print_help().map(|()| println!()).map_err(Into::into)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<SimuTrialConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            println!("> Loading configuration from: {}", path.display());
            Ok(SimuTrialConfig::load(path)?)
        }
        None => Ok(SimuTrialConfig::default()),
    }
}

fn run_init_config(args: InitConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.out.exists() && !args.force {
        return Err(format!(
            "{} already exists; pass --force to overwrite it",
            args.out.display()
        )
        .into());
    }
    SimuTrialConfig::default().save(&args.out)?;
    println!("> Wrote default configuration to: {}", args.out.display());
    Ok(())
}

fn score_population(
    population: &Population,
    training_path: &Path,
    config: &SimuTrialConfig,
) -> Result<ScoringReport, Box<dyn std::error::Error>> {
    println!("> Loading training data from: {}", training_path.display());
    let training = load_training_data(training_path, &config.scoring.training_columns)?;
    println!(
        "> Training on {} rows ({:.1}% participated)",
        training.len(),
        training.participation_rate() * 100.0
    );

    let report = predict_willingness_scores(population, &training, &config.scoring)?;
    println!(
        "> Classifier: {:?} after {} iterations (deviance {:.3})",
        report.fit.status, report.fit.iterations, report.fit.deviance
    );
    if report.excluded > 0 {
        println!(
            "> {} patients excluded from scoring (missing age, region or gender)",
            report.excluded
        );
    }
    if let Some(mean) = report.population.mean_willingness() {
        println!("> Mean willingness: {:.2}%", mean * 100.0);
    }
    Ok(report)
}

fn run_score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;

    println!("> Loading population from: {}", args.population.display());
    let population = load_population(&args.population, &config.columns)?;
    println!("> Loaded {} patients", population.len());

    let report = score_population(&population, &args.training, &config)?;
    write_scores(&report.population, &args.out)?;
    println!("> Scores saved to: {}", args.out.display());
    Ok(())
}

fn run_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let num_runs = config
        .simulation
        .check_runs(args.runs.unwrap_or(config.simulation.num_runs))?;
    let seed = args
        .seed
        .or(config.simulation.seed)
        .unwrap_or_else(|| u64::from(rand::random::<u32>()));

    println!("> Loading population from: {}", args.population.display());
    let loaded = load_population(&args.population, &config.columns)?;
    println!("> Loaded {} patients", loaded.len());

    let mut filter = DemographicFilter::new()
        .with_genders(&args.gender)
        .with_races(&args.race);
    if let Some(age) = args.min_age {
        filter = filter.with_min_age(age);
    }
    let population = filter.apply(&loaded);
    if filter.is_active() {
        println!("> {} patients pass the demographic filters", population.len());
    }

    let (population, policy) = match args.policy {
        PolicyCli::Score => {
            let training = args.training.as_deref().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "--policy score needs --training <CSV>",
                )
            })?;
            let report = score_population(&population, training, &config)?;
            if report.excluded > 0 {
                log::warn!(
                    "Dropping {} unscored patients before simulation",
                    report.excluded
                );
            }
            (report.population.scored(), ConsentPolicy::PerPatientScore)
        }
        PolicyCli::Range => (population, ConsentPolicy::range(args.min, args.max)?),
    };

    let mut options = SimulationOptions::new(num_runs, seed);
    if args.sequential || !config.simulation.parallel {
        options = options.sequential();
    }
    println!(
        "> Simulating {num_runs} trials over {} patients ({}, seed {seed})",
        population.len(),
        policy.describe()
    );

    let progress = BarProgress::new("trials");
    let result = simulate(&population, &policy, &options, &progress, None)?;

    println!(
        "> Mean consent rate: {:.2}% ± {:.2}% (95% CI)",
        result.mean_consent_rate, result.confidence_interval_halfwidth
    );
    println!(
        "> Expected consenting patients: {:.1} of {}",
        result.mean_consented(),
        result.population_size
    );
    println!("> Staff needed: {:.2}", result.mean_staff_estimate);
    println!("> Sites needed: {:.2}", result.mean_site_estimate);

    let summary = SummaryFile {
        seed,
        policy,
        result,
    };
    std::fs::write(&args.out, toml::to_string_pretty(&summary)?)?;
    println!("> Summary saved to: {}", args.out.display());

    if let Some(path) = &args.runs_out {
        write_runs(&summary.result, path)?;
        println!("> Per-run counts saved to: {}", path.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct SummaryFile {
    seed: u64,
    policy: ConsentPolicy,
    result: SimulationResult,
}

fn write_scores(population: &Population, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    writer.write_record([
        "id",
        "age",
        "gender",
        "race_ethnicity",
        "region",
        "health_issues",
        "willingness_score",
    ])?;
    for record in population {
        writer.write_record([
            record.id.to_string(),
            record.age.map_or_else(|| "NaN".to_string(), |a| a.to_string()),
            record.gender.clone().unwrap_or_default(),
            record
                .race_ethnicity
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            record.region.clone().unwrap_or_default(),
            record.health_issues.clone().unwrap_or_default(),
            record
                .willingness_score
                .map_or_else(|| "NaN".to_string(), |s| format!("{s:.6}")),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_runs(result: &SimulationResult, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    writer.write_record(["run", "consented", "staff", "sites"])?;
    for (run, ((count, staff), sites)) in result
        .per_run_consent_counts
        .iter()
        .zip(&result.per_run_staff)
        .zip(&result.per_run_site)
        .enumerate()
    {
        writer.write_record([
            run.to_string(),
            count.to_string(),
            staff.to_string(),
            sites.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Terminal progress bar fed by simulation callbacks.
struct BarProgress {
    bar: ProgressBar,
    message: String,
}

impl BarProgress {
    fn new(message: &str) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            message: message.to_string(),
        }
    }
}

impl SimulationProgressObserver for BarProgress {
    fn on_start(&self, total_runs: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        self.bar.set_draw_target(draw_target);
        self.bar.set_length(total_runs as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            self.bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        self.bar.set_message(self.message.clone());
    }

    // Completions can arrive out of order across threads.
    fn on_run_complete(&self, completed: usize, total_runs: usize) {
        let _ = (completed, total_runs);
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}
