use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brand_classifier::{
    Classifier, DatasetReader, EvaluationReport, Pipeline, PipelineConfig, ResultWriter,
    TrainingConfig, TrainingContext,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use log::info;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Predicts the brand of product titles from a labelled training set.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training titles, one `title \t label \t category` per line
    train: PathBuf,

    /// Titles to classify, one `title \t category` per line; a
    /// `title \t label \t category` line is scored against its label
    input: PathBuf,

    /// Number of classification workers [default: number of CPUs]
    #[arg(short, long, env = "BRAND_WORKERS")]
    workers: Option<usize>,

    /// File of words to ignore, one per line
    #[arg(long)]
    stopwords: Option<PathBuf>,

    /// Append the coverage score to every output line
    #[arg(long)]
    scores: bool,

    /// Write a JSON evaluation summary to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the inverted index to this file
    #[arg(long)]
    dump_index: Option<PathBuf>,

    /// Write predictions here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = TrainingConfig::default();
    if let Some(path) = &args.stopwords {
        config = config.with_stopwords(read_stopwords(path)?);
    }

    let classifier = train(&args.train, &config)?;

    if let Some(path) = &args.dump_index {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        classifier.index().dump(BufWriter::new(file))?;
        info!("Inverted index written to {}", path.display());
    }

    let mut pipeline_config = PipelineConfig::default();
    if let Some(workers) = args.workers {
        pipeline_config = pipeline_config.with_workers(workers);
    }
    predict(&classifier, pipeline_config, &args)
}

fn read_stopwords(path: &Path) -> Result<Vec<String>> {
    let reader = DatasetReader::open(path)
        .with_context(|| format!("failed to open stop-word file {}", path.display()))?;
    let words = reader
        .lines()
        .map(|line| line.map(|(_, word)| word.trim().to_string()))
        .filter(|word| !matches!(word, Ok(word) if word.is_empty()))
        .collect::<brand_classifier::Result<Vec<_>>>()?;
    info!("Loaded {} stop words", words.len());
    Ok(words)
}

fn train(path: &Path, config: &TrainingConfig) -> Result<Classifier> {
    let reader = DatasetReader::open(path)
        .with_context(|| format!("failed to open training file {}", path.display()))?;
    info!("Training on {}", reader.path().display());

    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {human_pos} lines ({per_sec})")?,
    );
    let mut context = TrainingContext::new(config)?;
    context
        .learn_from(reader.training_examples().progress_with(bar.clone()))
        .with_context(|| format!("failed to read training file {}", path.display()))?;
    bar.finish_and_clear();

    Ok(context.freeze())
}

fn predict(classifier: &Classifier, config: PipelineConfig, args: &Args) -> Result<()> {
    let reader = DatasetReader::open(&args.input)
        .with_context(|| format!("failed to open input file {}", args.input.display()))?;
    let out: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let mut writer = ResultWriter::new(BufWriter::new(out)).with_scores(args.scores);
    let mut report = EvaluationReport::default();

    info!("Classifying with {} workers", config.workers);
    let pipeline = Pipeline::new(classifier, config)?;
    let stats = pipeline.run(reader.prediction_jobs(), |result| {
        report.record(&result);
        writer.write(&result)
    })?;
    writer.flush()?;

    if stats.skipped > 0 {
        info!("Skipped {} malformed input lines", stats.skipped);
    }
    report.log_summary();
    if let Some(path) = &args.report {
        report
            .save(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(())
}
