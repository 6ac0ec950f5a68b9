use ahash::AHashMap;
use log::{info, warn};
use num_format::{Locale, ToFormattedString};
use rayon::prelude::*;
use serde::Serialize;

use crate::classifier::Classifier;
use crate::error::{ClassifierError, Result};
use crate::frequency_set::FrequencySet;
use crate::inverted_index::InvertedIndex;
use crate::structs::{LabelId, TrainingExample};
use crate::tokenizer::Tokenizer;

/// Widest n-gram taken from a title.
pub const MAX_NGRAMS: usize = 3;
/// Most frequent tokens kept in each label's vocabulary.
pub const MAX_ITEMS_IN_BAG: usize = 500;

const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    max_ngrams: usize,
    max_items_in_bag: usize,
    stopwords: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_ngrams: MAX_NGRAMS,
            max_items_in_bag: MAX_ITEMS_IN_BAG,
            stopwords: Vec::new(),
        }
    }
}

impl TrainingConfig {
    pub fn new(max_ngrams: usize, max_items_in_bag: usize) -> Result<Self> {
        if max_ngrams < 1 {
            return Err(ClassifierError::InvalidNgramSize(max_ngrams));
        }
        if max_items_in_bag < 1 {
            return Err(ClassifierError::invalid_config(
                "max_items_in_bag must be at least 1",
            ));
        }
        Ok(Self {
            max_ngrams,
            max_items_in_bag,
            stopwords: Vec::new(),
        })
    }

    pub fn with_stopwords(mut self, stopwords: Vec<String>) -> Self {
        self.stopwords = stopwords;
        self
    }

    pub fn max_ngrams(&self) -> usize {
        self.max_ngrams
    }

    pub fn max_items_in_bag(&self) -> usize {
        self.max_items_in_bag
    }

    fn tokenizer(&self) -> Result<Tokenizer> {
        Ok(Tokenizer::new(self.max_ngrams)?.with_stopwords(&self.stopwords))
    }
}

/// Label id to the capped bag of tokens seen in that label's titles.
///
/// The cap is enforced greedily after every merge: only the current least
/// frequent tokens are evicted, so the surviving vocabulary can depend on the
/// order examples arrive in. It is an approximation of a top-K, not an exact one.
#[derive(Debug, Clone)]
pub struct VocabularyIndex {
    bags: AHashMap<LabelId, FrequencySet>,
    cap: usize,
}

impl VocabularyIndex {
    pub fn new(cap: usize) -> Self {
        Self {
            bags: AHashMap::new(),
            cap,
        }
    }

    /// Folds `bag` into `label`'s vocabulary and trims it back to the cap.
    /// Returns the number of evicted tokens.
    pub fn observe(&mut self, label: LabelId, bag: &FrequencySet) -> usize {
        let vocabulary = self.bags.entry(label).or_default();
        vocabulary.merge(bag);
        vocabulary.trim_to(self.cap)
    }

    pub fn get(&self, label: LabelId) -> Option<&FrequencySet> {
        self.bags.get(&label)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.bags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    pub fn labels(&self) -> Vec<LabelId> {
        let mut labels: Vec<_> = self.bags.keys().copied().collect();
        labels.par_sort_unstable();
        labels
    }

    /// Vocabularies in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &FrequencySet)> + '_ {
        self.labels()
            .into_iter()
            .filter_map(|label| self.bags.get(&label).map(|bag| (label, bag)))
    }

    /// Sum of all vocabulary sizes.
    pub fn total_tokens(&self) -> usize {
        self.bags.par_iter().map(|(_, bag)| bag.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrainingStats {
    pub examples: usize,
    pub skipped: usize,
    pub evicted: usize,
}

/// Owns everything mutated while training. Frozen into a [`Classifier`] once
/// the training data is exhausted.
#[derive(Debug)]
pub struct TrainingContext {
    tokenizer: Tokenizer,
    vocabularies: VocabularyIndex,
    stats: TrainingStats,
}

impl TrainingContext {
    pub fn new(config: &TrainingConfig) -> Result<Self> {
        Ok(Self {
            tokenizer: config.tokenizer()?,
            vocabularies: VocabularyIndex::new(config.max_items_in_bag),
            stats: TrainingStats::default(),
        })
    }

    pub fn learn(&mut self, example: &TrainingExample) {
        let bag = self.tokenizer.bag(&example.title);
        self.stats.evicted += self.vocabularies.observe(example.label, &bag);
        self.stats.examples += 1;
    }

    /// Learns every example of `examples`. Malformed lines are logged and
    /// skipped; any other error aborts training.
    pub fn learn_from<I>(&mut self, examples: I) -> Result<TrainingStats>
    where
        I: IntoIterator<Item = Result<TrainingExample>>,
    {
        for example in examples {
            match example {
                Ok(example) => self.learn(&example),
                Err(err) if err.is_recoverable() => {
                    warn!("Skipping training record: {err}");
                    self.stats.skipped += 1;
                }
                Err(err) => return Err(err),
            }
            let seen = self.stats.examples + self.stats.skipped;
            if seen % PROGRESS_EVERY == 0 {
                info!(
                    "Processed {} lines so far",
                    seen.to_formatted_string(&Locale::en)
                );
            }
        }
        Ok(self.stats)
    }

    pub fn stats(&self) -> TrainingStats {
        self.stats
    }

    pub fn vocabularies(&self) -> &VocabularyIndex {
        &self.vocabularies
    }

    /// Builds the inverted index. Nothing learnt can change afterwards.
    pub fn freeze(self) -> Classifier {
        info!(
            "Trained on {} examples ({} skipped): {} labels, {} vocabulary tokens",
            self.stats.examples.to_formatted_string(&Locale::en),
            self.stats.skipped.to_formatted_string(&Locale::en),
            self.vocabularies.len().to_formatted_string(&Locale::en),
            self.vocabularies
                .total_tokens()
                .to_formatted_string(&Locale::en)
        );
        info!("Building inverted index");
        let index = InvertedIndex::build(&self.vocabularies);
        info!(
            "Inverted index built: {} distinct tokens",
            index.len().to_formatted_string(&Locale::en)
        );
        Classifier::new(self.tokenizer, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetReader;

    fn example(label: LabelId, title: &str) -> TrainingExample {
        TrainingExample {
            title: title.to_string(),
            label,
            category: 0,
        }
    }

    fn context(max_ngrams: usize, cap: usize) -> TrainingContext {
        TrainingContext::new(&TrainingConfig::new(max_ngrams, cap).unwrap()).unwrap()
    }

    #[test]
    fn test_config_bounds() {
        assert!(TrainingConfig::new(0, 10).is_err());
        assert!(TrainingConfig::new(1, 0).is_err());
        let config = TrainingConfig::default();
        assert_eq!(config.max_ngrams(), MAX_NGRAMS);
        assert_eq!(config.max_items_in_bag(), MAX_ITEMS_IN_BAG);
    }

    #[test]
    fn test_vocabulary_accumulates_counts_per_label() {
        let mut context = context(1, 100);
        context.learn(&example(7, "red shoe"));
        context.learn(&example(7, "red boot"));
        context.learn(&example(9, "blue shoe"));

        let vocabularies = context.vocabularies();
        assert_eq!(vocabularies.labels(), [7, 9]);
        let red = vocabularies.get(7).unwrap();
        assert_eq!(red.count("red"), 2);
        assert_eq!(red.count("shoe"), 1);
        assert_eq!(red.count("boot"), 1);
        assert_eq!(vocabularies.get(9).unwrap().len(), 2);
        assert_eq!(vocabularies.total_tokens(), 5);
        assert_eq!(context.stats().examples, 3);
    }

    #[test]
    fn test_vocabulary_never_exceeds_cap() {
        let mut context = context(2, 4);
        context.learn(&example(1, "brand"));
        context.learn(&example(1, "brand"));
        for i in 0..50 {
            context.learn(&example(1, &format!("brand word{i} other{i}")));
            let vocabularies = context.vocabularies();
            assert!(vocabularies.get(1).unwrap().len() <= vocabularies.cap());
        }
        let vocabulary = context.vocabularies().get(1).unwrap();
        assert_eq!(vocabulary.len(), 4);
        // every fresh token enters with a count of one and goes first
        assert!(vocabulary.contains("brand"));
        assert_eq!(vocabulary.count("brand"), 52);
        assert!(context.stats().evicted > 0);
    }

    #[test]
    fn test_learn_from_survives_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        std::fs::write(&path, b"red shoe\t1\t0\nCaf\xe9 mug\t2\t0\nblue hat\t3\t0\n").unwrap();

        let mut context = context(1, 10);
        let reader = DatasetReader::open(&path).unwrap();
        let stats = context.learn_from(reader.training_examples()).unwrap();
        assert_eq!(stats.examples, 3);
        assert_eq!(stats.skipped, 0);
        assert!(context.vocabularies().get(2).unwrap().contains("mug"));
    }

    #[test]
    fn test_learn_from_skips_recoverable_errors() {
        let mut context = context(1, 10);
        let records = vec![
            Ok(example(1, "red shoe")),
            Err(ClassifierError::malformed(2, "missing label")),
            Ok(example(2, "blue shoe")),
        ];
        let stats = context.learn_from(records).unwrap();
        assert_eq!(
            stats,
            TrainingStats {
                examples: 2,
                skipped: 1,
                evicted: 0
            }
        );
    }

    #[test]
    fn test_learn_from_aborts_on_io_error() {
        let mut context = context(1, 10);
        let records = vec![
            Ok(example(1, "red shoe")),
            Err(ClassifierError::Io(std::io::Error::other("disk gone"))),
            Ok(example(2, "blue shoe")),
        ];
        assert!(context.learn_from(records).is_err());
        assert_eq!(context.stats().examples, 1);
    }
}
