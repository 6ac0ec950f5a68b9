use crate::frequency_set::FrequencySet;
use crate::inverted_index::InvertedIndex;
use crate::structs::{LabelId, Prediction};
use crate::tokenizer::Tokenizer;

/// Read-only model produced by [`TrainingContext::freeze`](crate::TrainingContext::freeze).
#[derive(Debug)]
pub struct Classifier {
    tokenizer: Tokenizer,
    index: InvertedIndex,
}

impl Classifier {
    pub fn new(tokenizer: Tokenizer, index: InvertedIndex) -> Self {
        Self { tokenizer, index }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Picks the label sharing the most n-grams with `text`.
    ///
    /// Every distinct n-gram of the title votes once for each label it is
    /// indexed under. Equal votes go to the label that received its first vote
    /// last. The score is the fraction of distinct n-grams found in the index.
    pub fn predict(&self, text: &str) -> Prediction {
        let bag = self.tokenizer.bag(text);
        if bag.is_empty() {
            return Prediction::no_match();
        }

        let mut candidates: FrequencySet<LabelId> = FrequencySet::new();
        let mut tokens_matched = 0usize;
        for token in bag.values() {
            if let Some(labels) = self.index.labels_for(token) {
                tokens_matched += 1;
                candidates.extend(labels.iter().copied());
            }
        }

        candidates.rank();
        match candidates.max_occurring() {
            Some(&label) => Prediction {
                label: Some(label),
                score: tokens_matched as f64 / bag.len() as f64,
            },
            None => Prediction::no_match(),
        }
    }
}
