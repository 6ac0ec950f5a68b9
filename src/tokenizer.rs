use std::borrow::Cow;
use std::sync::LazyLock;

use ahash::AHashSet;
use regex::Regex;

use crate::error::{ClassifierError, Result};
use crate::frequency_set::FrequencySet;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 ]").expect("static pattern compiles"));

fn clean(text: &str) -> Cow<'_, str> {
    NON_ALPHANUMERIC.replace_all(text, "")
}

fn words(cleaned: &str) -> impl Iterator<Item = &str> {
    cleaned.split(' ').filter(|word| !word.is_empty())
}

fn windows(n: usize, words: &[&str]) -> impl Iterator<Item = String> {
    words.windows(n).map(|window| window.join(" "))
}

/// Splits `text` into n-grams of `n` consecutive cleaned words.
///
/// Characters outside `[a-zA-Z0-9 ]` are dropped before splitting, so
/// `"Nike Air-Max"` yields `["Nike", "AirMax"]` for `n = 1`.
pub fn tokenize(n: usize, text: &str) -> Result<Vec<String>> {
    if n < 1 {
        return Err(ClassifierError::InvalidNgramSize(n));
    }
    let cleaned = clean(text);
    let words: Vec<&str> = words(&cleaned).collect();
    Ok(windows(n, &words).collect())
}

/// Produces the bag of n-grams, for every n in `1..=max_ngrams`, of a title.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    max_ngrams: usize,
    stopwords: AHashSet<String>,
}

impl Tokenizer {
    pub fn new(max_ngrams: usize) -> Result<Self> {
        if max_ngrams < 1 {
            return Err(ClassifierError::InvalidNgramSize(max_ngrams));
        }
        Ok(Self {
            max_ngrams,
            stopwords: AHashSet::new(),
        })
    }

    /// Words dropped before n-grams are formed. Matching ignores ASCII case.
    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords = stopwords
            .into_iter()
            .map(|word| word.as_ref().trim().to_ascii_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        self
    }

    pub fn max_ngrams(&self) -> usize {
        self.max_ngrams
    }

    fn is_stopword(&self, word: &str) -> bool {
        !self.stopwords.is_empty() && self.stopwords.contains(&word.to_ascii_lowercase())
    }

    /// All n-grams of `text` in order: unigrams first, then bigrams, and so on.
    pub fn ngrams(&self, text: &str) -> Vec<String> {
        let cleaned = clean(text);
        let words: Vec<&str> = words(&cleaned)
            .filter(|word| !self.is_stopword(word))
            .collect();
        (1..=self.max_ngrams)
            .flat_map(|n| windows(n, &words).collect::<Vec<_>>())
            .collect()
    }

    /// [`ngrams`](Self::ngrams) folded into a frequency set.
    pub fn bag(&self, text: &str) -> FrequencySet {
        self.ngrams(text).into_iter().collect()
    }
}
