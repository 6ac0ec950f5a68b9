use serde::{Deserialize, Serialize};

pub type LabelId = u32;

/// Printed in place of a label when nothing in the index matched.
pub const NO_MATCH: i64 = -1;

/// One labelled title from the training file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub title: String,
    pub label: LabelId,
    pub category: u32,
}

/// One title to classify, optionally with the label it is expected to get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionInput {
    pub title: String,
    pub expected: Option<LabelId>,
}

impl PredictionInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            expected: None,
        }
    }

    pub fn with_expected(mut self, label: LabelId) -> Self {
        self.expected = Some(label);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionJob {
    pub seq: u64,
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Option<LabelId>,
    /// Share of the title's distinct n-grams found in the index.
    pub score: f64,
}

impl Prediction {
    pub fn no_match() -> Self {
        Self {
            label: None,
            score: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub seq: u64,
    pub prediction: Prediction,
    pub expected: Option<LabelId>,
}

impl PredictionResult {
    /// `None` when the input carried no expected label.
    pub fn is_correct(&self) -> Option<bool> {
        self.expected
            .map(|expected| self.prediction.label == Some(expected))
    }
}

/// Work item on the intake queue. `Shutdown` is consumed by exactly one worker.
#[derive(Debug)]
pub(crate) enum Job {
    Classify(PredictionJob),
    Shutdown,
}

/// Item on the result queue. `Finished` is sent once, after every worker exited.
#[derive(Debug)]
pub(crate) enum Outcome {
    Prediction(PredictionResult),
    Finished,
}
