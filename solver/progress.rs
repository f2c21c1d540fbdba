use std::fmt;

/// Stages reported while fitting paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathProgressStage {
    Path,
    CrossValidation,
}

impl PathProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Path => "lambda path",
            Self::CrossValidation => "cross-validation folds",
        }
    }
}

impl fmt::Display for PathProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while a path is fitted.
pub trait PathProgressObserver {
    fn on_stage_start(&mut self, stage: PathProgressStage, total_steps: usize) {
        let _ = (stage, total_steps);
    }
    fn on_stage_advance(&mut self, stage: PathProgressStage, completed_steps: usize) {
        let _ = (stage, completed_steps);
    }
    fn on_stage_finish(&mut self, stage: PathProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopPathProgress;

impl PathProgressObserver for NoopPathProgress {}
