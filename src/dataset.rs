use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{ClassifierError, Result};
use crate::structs::{LabelId, PredictionInput, PredictionJob, TrainingExample};

/// Line reader over a tab-separated dataset, gzip-compressed when the file
/// name ends in `.gz`.
pub struct DatasetReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
}

impl DatasetReader {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let reader: Box<dyn BufRead + Send> = if is_gzip(&path) {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every line with its 1-based line number. Bytes that are not valid
    /// UTF-8 are replaced rather than failing the whole read.
    pub fn lines(self) -> impl Iterator<Item = Result<(usize, String)>> {
        self.reader
            .split(b'\n')
            .enumerate()
            .map(|(index, line)| -> Result<(usize, String)> {
                let mut bytes = line?;
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                Ok((index + 1, decode(bytes)))
            })
    }

    /// Training records; blank lines carry no example and are passed over.
    pub fn training_examples(self) -> impl Iterator<Item = Result<TrainingExample>> {
        self.lines()
            .filter(|line| !matches!(line, Ok((_, text)) if text.trim().is_empty()))
            .map(|line| line.and_then(|(number, line)| TrainingExample::parse(&line, number)))
    }

    /// One job per line, blank lines included, numbered by line.
    pub fn prediction_jobs(self) -> impl Iterator<Item = Result<PredictionJob>> {
        self.lines().map(|line| {
            line.and_then(|(number, line)| {
                Ok(PredictionJob {
                    seq: number as u64,
                    input: PredictionInput::parse(&line, number)?,
                })
            })
        })
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn parse_label(field: &str, line: usize) -> Result<LabelId> {
    field
        .trim()
        .parse()
        .map_err(|_| ClassifierError::malformed(line, format!("invalid label {field:?}")))
}

impl TrainingExample {
    /// Parses `title \t label \t category`.
    pub fn parse(line: &str, number: usize) -> Result<Self> {
        let mut fields = line.split('\t');
        let (Some(title), Some(label), Some(category)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ClassifierError::malformed(
                number,
                "expected title, label and category",
            ));
        };
        let category = category
            .trim()
            .parse()
            .map_err(|_| ClassifierError::malformed(number, format!("invalid category {category:?}")))?;
        Ok(Self {
            title: title.to_string(),
            label: parse_label(label, number)?,
            category,
        })
    }
}

impl PredictionInput {
    /// Parses `title`, `title \t category`, or `title \t label \t category`.
    /// Only the three-field form carries an expected label.
    pub fn parse(line: &str, number: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let input = PredictionInput::new(fields[0]);
        match fields.len() {
            1 | 2 => Ok(input),
            3 => Ok(input.with_expected(parse_label(fields[1], number)?)),
            n => Err(ClassifierError::malformed(
                number,
                format!("expected at most 3 fields, found {n}"),
            )),
        }
    }
}
