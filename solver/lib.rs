#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod data;
pub mod lambda;
pub mod linear;
pub mod logistic;
pub mod model;
pub mod path;
pub mod progress;
pub mod sweep;
pub mod threshold;
pub mod types;
pub mod working;

#[path = "../resample/mod.rs"]
pub mod resample;

pub use lambda::{LambdaPath, generate_lambda_path, lambda_max};
pub use linear::{LinearSettings, LinearSolver};
pub use logistic::{LogisticSettings, LogisticSolver, OuterRefresh};
pub use model::{FittedPath, ModelError, PathConfig};
pub use path::{Family, PathOptions, PathSolver, fit_linear_path, fit_logistic_path, fit_path};
pub use sweep::InnerSweep;
pub use threshold::soft_threshold;
pub use types::{
    CoefficientPath, Coefficients, ConvergenceCriterion, FitError, FitOutcome, FitStatus,
    NonConvergenceWarning, PathWarning,
};
