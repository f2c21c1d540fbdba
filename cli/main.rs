#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::Axis;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use sparsepath::data::{load_feature_data, load_path_data};
use sparsepath::progress::{PathProgressObserver, PathProgressStage};
use sparsepath::resample::{
    DEFAULT_FOLDS, DEFAULT_NEIGHBORS, DEFAULT_SYNTHETIC_PER_SAMPLE, cross_validate_path,
    oversample_minority, stratified_folds,
};
use sparsepath::{
    CoefficientPath, ConvergenceCriterion, Family, FittedPath, PathConfig, PathWarning,
    generate_lambda_path,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum FamilyCli {
    Linear,
    Logistic,
}

impl From<FamilyCli> for Family {
    fn from(family: FamilyCli) -> Self {
        match family {
            FamilyCli::Linear => Family::Linear,
            FamilyCli::Logistic => Family::Logistic,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CriterionCli {
    /// Largest absolute coefficient change in a sweep
    Max,
    /// Sum of absolute coefficient changes in a sweep
    Sum,
}

impl From<CriterionCli> for ConvergenceCriterion {
    fn from(criterion: CriterionCli) -> Self {
        match criterion {
            CriterionCli::Max => ConvergenceCriterion::MaxAbsolute,
            CriterionCli::Sum => ConvergenceCriterion::SumAbsolute,
        }
    }
}

/// Input table shared by every subcommand.
#[derive(Args)]
pub struct InputArgs {
    /// Path to a TSV file: one outcome column, optional sample_id, numeric features
    pub data: PathBuf,

    /// Name of the outcome column
    #[arg(long, default_value = "outcome")]
    pub outcome: String,
}

/// Solver settings. Flags override values read from --config.
#[derive(Args)]
pub struct PathArgs {
    /// TOML file with path settings
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub family: Option<FamilyCli>,

    /// Number of lambdas on the path
    #[arg(long, value_name = "K")]
    pub n_lambdas: Option<usize>,

    /// Convergence tolerance on the coefficient change
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Sweep budget per lambda (linear)
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Quadratic-refresh budget per lambda (logistic)
    #[arg(long)]
    pub max_outer_iterations: Option<usize>,

    /// Sweep budget per refresh (logistic)
    #[arg(long)]
    pub max_inner_iterations: Option<usize>,

    #[arg(long, value_enum)]
    pub criterion: Option<CriterionCli>,

    /// Fit an unpenalized intercept in linear paths
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub fit_intercept: Option<bool>,

    /// Start each lambda from the previous solution; `false` fits every lambda
    /// from zero coefficients, in parallel
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub warm_start: Option<bool>,
}

impl PathArgs {
    fn resolve(&self) -> Result<PathConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PathConfig::from_toml_file(path)?,
            None => PathConfig::default(),
        };
        if let Some(family) = self.family {
            config.family = family.into();
        }
        if let Some(k) = self.n_lambdas {
            config.path_length = k;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(n) = self.max_outer_iterations {
            config.max_outer_iterations = n;
        }
        if let Some(n) = self.max_inner_iterations {
            config.max_inner_iterations = n;
        }
        if let Some(criterion) = self.criterion {
            config.criterion = criterion.into();
        }
        if let Some(fit_intercept) = self.fit_intercept {
            config.fit_intercept = fit_intercept;
        }
        if let Some(warm_start) = self.warm_start {
            config.warm_start = warm_start;
        }
        Ok(config)
    }
}

#[derive(Parser)]
#[command(
    name = "sparsepath",
    about = "L1-penalized linear and logistic regression paths by coordinate descent",
    long_about = "Fits lasso coefficient paths over a log-spaced lambda sequence, with \
                 stratified folds and SMOTE oversampling for imbalanced binary outcomes."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lambda sequence implied by the data
    #[command(about = "Generate the lambda sequence (outputs: lambdas.tsv)")]
    Lambdas {
        #[command(flatten)]
        input: InputArgs,

        /// Number of lambdas
        #[arg(long, value_name = "K", default_value = "100")]
        n_lambdas: usize,

        #[arg(long, default_value = "lambdas.tsv")]
        out: PathBuf,
    },

    /// Fit a coefficient path
    #[command(about = "Fit a coefficient path (outputs: path.toml, coefficients.tsv)")]
    Fit {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        settings: PathArgs,

        #[arg(long, default_value = "path.toml")]
        out: PathBuf,

        #[arg(long, default_value = "coefficients.tsv")]
        coefficients: PathBuf,
    },

    /// Apply a fitted path to new data
    #[command(about = "Predict with a fitted path (outputs: predictions.tsv)")]
    Predict {
        /// Path to a TSV file with the fitted feature columns
        data: PathBuf,

        /// Path to a fitted path file (.toml)
        #[arg(long)]
        model: PathBuf,

        /// Lambda index to predict at; defaults to the last (smallest) lambda
        #[arg(long)]
        index: Option<usize>,

        #[arg(long, default_value = "predictions.tsv")]
        out: PathBuf,
    },

    /// Oversample the positive class with synthetic rows
    #[command(about = "SMOTE oversampling of the y == 1 class (outputs: oversampled.tsv)")]
    Smote {
        #[command(flatten)]
        input: InputArgs,

        /// Nearest neighbours per minority observation
        #[arg(long, default_value_t = DEFAULT_NEIGHBORS)]
        neighbors: usize,

        /// Synthetic rows per minority observation
        #[arg(long, default_value_t = DEFAULT_SYNTHETIC_PER_SAMPLE)]
        per_sample: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "oversampled.tsv")]
        out: PathBuf,
    },

    /// Assign observations to stratified folds
    #[command(about = "Stratified fold assignment (outputs: folds.tsv)")]
    Folds {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value_t = DEFAULT_FOLDS)]
        folds: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "folds.tsv")]
        out: PathBuf,
    },

    /// Held-out loss along the path over stratified folds
    #[command(about = "Cross-validate a path (outputs: cv.tsv)")]
    Cv {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        settings: PathArgs,

        #[arg(long, default_value_t = DEFAULT_FOLDS)]
        folds: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "cv.tsv")]
        out: PathBuf,
    },
}

/// Reports path progress on stderr when it is a terminal.
struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl TerminalProgress {
    fn new() -> Self {
        Self { bar: None }
    }
}

impl PathProgressObserver for TerminalProgress {
    fn on_stage_start(&mut self, stage: PathProgressStage, total_steps: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let pb = ProgressBar::with_draw_target(Some(total_steps as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message(stage.describe());
        self.bar = Some(pb);
    }

    fn on_stage_advance(&mut self, _: PathProgressStage, completed_steps: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(completed_steps as u64);
        }
    }

    fn on_stage_finish(&mut self, _: PathProgressStage) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, csv::Error> {
    csv::WriterBuilder::new().delimiter(b'\t').from_path(path)
}

fn write_coefficients(
    path: &Path,
    coefficients: &CoefficientPath,
    feature_names: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = tsv_writer(path)?;
    let mut header = vec![
        "lambda".to_string(),
        "converged".to_string(),
        "iterations".to_string(),
        "intercept".to_string(),
    ];
    header.extend(feature_names.iter().cloned());
    wtr.write_record(&header)?;

    for (index, row) in coefficients.coefficients.axis_iter(Axis(0)).enumerate() {
        let mut record = vec![
            coefficients.lambdas[index].to_string(),
            coefficients.converged[index].to_string(),
            coefficients.iterations[index].to_string(),
        ];
        record.extend(row.iter().map(|b| b.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn report_warnings(warnings: &[PathWarning]) {
    for warning in warnings {
        match warning {
            PathWarning::NonConvergence { index, warning } => {
                eprintln!("Warning (lambda #{}): {warning}", index + 1)
            }
            PathWarning::ZeroVarianceFeature { column } => {
                eprintln!("Warning: feature column {} has zero variance", column + 1)
            }
            PathWarning::WeightsFloored {
                index,
                lambda,
                count,
            } => eprintln!(
                "Warning: lambda #{} ({lambda:.4e}) floored {count} curvature weights",
                index + 1
            ),
        }
    }
}

fn run_lambdas(input: InputArgs, n_lambdas: usize, out: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_path_data(&input.data, &input.outcome)?;
    let grid = generate_lambda_path(data.x.view(), data.y.view(), n_lambdas)?;
    println!(
        "lambda_max = {:.6e}, epsilon = {:e}, lambda_min = {:.6e}",
        grid.lambda_max,
        grid.epsilon,
        grid.lambda_min()
    );

    let mut wtr = tsv_writer(&out)?;
    wtr.write_record(["index", "lambda"])?;
    for (index, lambda) in grid.lambdas.iter().enumerate() {
        wtr.write_record([(index + 1).to_string(), lambda.to_string()])?;
    }
    wtr.flush()?;
    println!("Wrote {} lambdas to {}", grid.lambdas.len(), out.display());
    Ok(())
}

fn run_fit(
    input: InputArgs,
    settings: PathArgs,
    out: PathBuf,
    coefficients: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.resolve()?;
    let data = load_path_data(&input.data, &input.outcome)?;
    println!(
        "Fitting {:?} path over {} lambdas for {} samples and {} features",
        config.family,
        config.path_length,
        data.x.nrows(),
        data.x.ncols()
    );

    let fitted = config.fit(
        data.x.view(),
        data.y.view(),
        data.feature_names,
        &mut TerminalProgress::new(),
    )?;
    report_warnings(&fitted.path.warnings);

    let sizes = fitted.path.active_set_sizes();
    println!(
        "lambda_max = {:.6e}; active features at the smallest lambda: {}",
        fitted.lambda_max,
        sizes.last().copied().unwrap_or(0)
    );

    write_coefficients(&coefficients, &fitted.path, &fitted.feature_names)?;
    fitted.save(&out)?;
    println!(
        "Fitted path saved to: {} (coefficients in {})",
        out.display(),
        coefficients.display()
    );
    Ok(())
}

fn run_predict(
    data: PathBuf,
    model: PathBuf,
    index: Option<usize>,
    out: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let fitted = FittedPath::load(&model)?;
    let index = index.unwrap_or_else(|| fitted.path.len().saturating_sub(1));
    let features = load_feature_data(&data, &fitted.feature_names)?;
    let predictions = fitted.predict(features.x.view(), index)?;

    let mut wtr = tsv_writer(&out)?;
    let column = match fitted.config.family {
        Family::Linear => "prediction",
        Family::Logistic => "probability",
    };
    wtr.write_record(["sample_id", column])?;
    for (id, value) in features.sample_ids.iter().zip(predictions.iter()) {
        wtr.write_record([id.clone(), value.to_string()])?;
    }
    wtr.flush()?;
    println!(
        "Predicted {} samples at lambda #{} ({:.6e}); written to {}",
        predictions.len(),
        index + 1,
        fitted.path.lambdas[index],
        out.display()
    );
    Ok(())
}

fn run_smote(
    input: InputArgs,
    neighbors: usize,
    per_sample: usize,
    seed: u64,
    out: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_path_data(&input.data, &input.outcome)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let (x, y) = oversample_minority(data.x.view(), data.y.view(), neighbors, per_sample, &mut rng)?;

    let mut wtr = tsv_writer(&out)?;
    let mut header = vec!["sample_id".to_string(), input.outcome.clone()];
    header.extend(data.feature_names.iter().cloned());
    wtr.write_record(&header)?;
    for (i, row) in x.axis_iter(Axis(0)).enumerate() {
        let id = data
            .sample_ids
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("synthetic_{}", i + 1 - data.sample_ids.len()));
        let mut record = vec![id, y[i].to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    println!(
        "Added {} synthetic rows ({} total); written to {}",
        x.nrows() - data.x.nrows(),
        x.nrows(),
        out.display()
    );
    Ok(())
}

fn run_folds(input: InputArgs, folds: usize, seed: u64, out: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_path_data(&input.data, &input.outcome)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let assignment = stratified_folds(data.y.view(), folds, &mut rng)?;

    let mut wtr = tsv_writer(&out)?;
    wtr.write_record(["sample_id", "fold"])?;
    for (id, fold) in data.sample_ids.iter().zip(assignment.fold_of.iter()) {
        wtr.write_record([id.clone(), (fold + 1).to_string()])?;
    }
    wtr.flush()?;
    for fold in 0..assignment.num_folds() {
        println!(
            "fold {}: {} samples, {} events",
            fold + 1,
            assignment.sample_sizes[fold],
            assignment.event_sizes[fold]
        );
    }
    Ok(())
}

fn run_cv(
    input: InputArgs,
    settings: PathArgs,
    folds: usize,
    seed: u64,
    out: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.resolve()?;
    let data = load_path_data(&input.data, &input.outcome)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let assignment = stratified_folds(data.y.view(), folds, &mut rng)?;
    let grid = generate_lambda_path(data.x.view(), data.y.view(), config.path_length)?;

    let cv = cross_validate_path(
        data.x.view(),
        data.y.view(),
        &assignment,
        grid.lambdas.view(),
        &config,
        &mut TerminalProgress::new(),
    )?;

    let mut wtr = tsv_writer(&out)?;
    let mut header = vec![
        "lambda".to_string(),
        "mean_loss".to_string(),
        "std_error".to_string(),
    ];
    header.extend((1..=cv.folds.len()).map(|f| format!("fold{f}")));
    wtr.write_record(&header)?;
    for (index, lambda) in cv.lambdas.iter().enumerate() {
        let mut record = vec![
            lambda.to_string(),
            cv.mean_loss[index].to_string(),
            cv.std_error[index].to_string(),
        ];
        record.extend(cv.folds.iter().map(|f| f.test_loss[index].to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    println!(
        "Held-out loss for {} lambdas over {} folds written to {}",
        cv.lambdas.len(),
        cv.folds.len(),
        out.display()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Lambdas {
            input,
            n_lambdas,
            out,
        }) => run_lambdas(input, n_lambdas, out),
        Some(Commands::Fit {
            input,
            settings,
            out,
            coefficients,
        }) => run_fit(input, settings, out, coefficients),
        Some(Commands::Predict {
            data,
            model,
            index,
            out,
        }) => run_predict(data, model, index, out),
        Some(Commands::Smote {
            input,
            neighbors,
            per_sample,
            seed,
            out,
        }) => run_smote(input, neighbors, per_sample, seed, out),
        Some(Commands::Folds {
            input,
            folds,
            seed,
            out,
        }) => run_folds(input, folds, seed, out),
        Some(Commands::Cv {
            input,
            settings,
            folds,
            seed,
            out,
        }) => run_cv(input, settings, folds, seed, out),
        None => {
            let printed = Cli::command().print_help();
            println!();
            printed.map_err(|e| e.into())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
