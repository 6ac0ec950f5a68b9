mod classifier;
mod dataset;
mod error;
mod frequency_set;
mod inverted_index;
mod pipeline;
mod report;
mod structs;
mod tokenizer;
mod training;
mod utils;
pub use classifier::Classifier;
pub use dataset::DatasetReader;
pub use error::{ClassifierError, Result};
pub use frequency_set::FrequencySet;
pub use inverted_index::InvertedIndex;
pub use pipeline::{DEFAULT_QUEUE_DEPTH_PER_WORKER, Pipeline, PipelineConfig, PipelineStats};
pub use report::{EvaluationReport, ResultWriter};
pub use structs::{
    LabelId, NO_MATCH, Prediction, PredictionInput, PredictionJob, PredictionResult,
    TrainingExample,
};
pub use tokenizer::{Tokenizer, tokenize};
pub use training::{
    MAX_ITEMS_IN_BAG, MAX_NGRAMS, TrainingConfig, TrainingContext, TrainingStats, VocabularyIndex,
};
