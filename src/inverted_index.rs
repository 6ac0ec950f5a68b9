use std::io::{self, Write};

use ahash::AHashMap;
use rayon::prelude::*;

use crate::structs::LabelId;
use crate::training::VocabularyIndex;

/// Token to the labels whose vocabulary contains it.
///
/// Built once from the finished vocabularies and never mutated afterwards,
/// so any number of workers may read it at the same time.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: AHashMap<String, Vec<LabelId>>,
}

impl InvertedIndex {
    /// Labels are visited in ascending order, so every posting list is sorted.
    pub fn build(vocabularies: &VocabularyIndex) -> Self {
        let mut postings: AHashMap<String, Vec<LabelId>> = AHashMap::new();
        for (label, vocabulary) in vocabularies.iter() {
            for token in vocabulary.values() {
                postings.entry(token.clone()).or_default().push(label);
            }
        }
        Self { postings }
    }

    pub fn labels_for(&self, token: &str) -> Option<&[LabelId]> {
        self.postings.get(token).map(Vec::as_slice)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Writes `token \t label,label,...` lines sorted by token.
    pub fn dump<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut tokens: Vec<_> = self.postings.par_iter().collect();
        tokens.par_sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut line = String::new();
        let mut buffer = itoa::Buffer::new();
        for (token, labels) in tokens {
            line.clear();
            line.push_str(token);
            line.push('\t');
            for (i, label) in labels.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(buffer.format(*label));
            }
            line.push('\n');
            writer.write_all(line.as_bytes())?;
        }
        writer.flush()
    }
}
