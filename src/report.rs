use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::info;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::structs::PredictionResult;
use crate::utils::{push_int, push_label};

/// Writes one tab-separated line per result:
/// `label \t seq [\t score] [\t expected \t matched]`.
pub struct ResultWriter<W: Write> {
    out: W,
    with_scores: bool,
    line: String,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            with_scores: false,
            line: String::with_capacity(64),
        }
    }

    pub fn with_scores(mut self, with_scores: bool) -> Self {
        self.with_scores = with_scores;
        self
    }

    pub fn write(&mut self, result: &PredictionResult) -> io::Result<()> {
        let line = &mut self.line;
        line.clear();
        push_label(line, result.prediction.label);
        line.push('\t');
        push_int(line, result.seq);
        if self.with_scores {
            let _ = write!(line, "\t{:.4}", result.prediction.score);
        }
        if let Some(expected) = result.expected {
            line.push('\t');
            push_int(line, expected);
            line.push('\t');
            line.push_str(if result.prediction.label == Some(expected) {
                "true"
            } else {
                "false"
            });
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Aggregate over every classified title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total: u64,
    /// Titles that matched at least one indexed token.
    pub matched: u64,
    /// Titles that came with an expected label.
    pub labelled: u64,
    /// Labelled titles whose prediction equals the expected label.
    pub correct: u64,
    pub mean_score: f64,
    pub accuracy: Option<f64>,
}

impl EvaluationReport {
    pub fn record(&mut self, result: &PredictionResult) {
        self.total += 1;
        if result.prediction.is_match() {
            self.matched += 1;
        }
        self.mean_score += (result.prediction.score - self.mean_score) / self.total as f64;
        if let Some(correct) = result.is_correct() {
            self.labelled += 1;
            if correct {
                self.correct += 1;
            }
            self.accuracy = Some(self.correct as f64 / self.labelled as f64);
        }
    }

    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Classified {} titles, {} matched ({:.2}%), mean score {:.4}",
            self.total.to_formatted_string(&Locale::en),
            self.matched.to_formatted_string(&Locale::en),
            self.coverage() * 100.0,
            self.mean_score
        );
        if let Some(accuracy) = self.accuracy {
            info!(
                "Accuracy on {} labelled titles: {:.2}%",
                self.labelled.to_formatted_string(&Locale::en),
                accuracy * 100.0
            );
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::from)?;
        Ok(())
    }
}
