//! Fixed-size worker pool classifying a stream of titles. Results arrive in
//! completion order; `Outcome::Finished` is sent only after every worker joined.

use std::io;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, trace, warn};
use num_format::{Locale, ToFormattedString};

use crate::classifier::Classifier;
use crate::error::{ClassifierError, Result};
use crate::structs::{Job, Outcome, PredictionJob, PredictionResult};

/// Queue slots per worker on both the intake and the result queue.
pub const DEFAULT_QUEUE_DEPTH_PER_WORKER: usize = 5;

const PROGRESS_EVERY: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_depth_per_worker: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_depth_per_worker: DEFAULT_QUEUE_DEPTH_PER_WORKER,
        }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_depth(mut self, queue_depth_per_worker: usize) -> Self {
        self.queue_depth_per_worker = queue_depth_per_worker;
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(self.queue_depth_per_worker)
    }

    fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(ClassifierError::invalid_config("workers must be at least 1"));
        }
        if self.queue_depth_per_worker < 1 {
            return Err(ClassifierError::invalid_config(
                "queue_depth_per_worker must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Jobs put on the intake queue.
    pub submitted: u64,
    /// Malformed input records that were skipped.
    pub skipped: u64,
    /// Jobs classified, indexed by worker id.
    pub per_worker: Vec<u64>,
    /// Results handed to the sink.
    pub delivered: u64,
}

impl PipelineStats {
    pub fn processed(&self) -> u64 {
        self.per_worker.iter().sum()
    }
}

pub struct Pipeline<'a> {
    classifier: &'a Classifier,
    config: PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(classifier: &'a Classifier, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { classifier, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classifies every job and hands each result to `sink` on the consumer
    /// thread. Results carry the sequence number of their job.
    ///
    /// Malformed records are logged and skipped. Any other input error stops
    /// submission; the pool is still shut down before the error is returned.
    /// If `sink` fails, the remaining results are drained and discarded and
    /// the first sink error is returned.
    pub fn run<I, F>(&self, input: I, sink: F) -> Result<PipelineStats>
    where
        I: IntoIterator<Item = Result<PredictionJob>>,
        F: FnMut(PredictionResult) -> io::Result<()> + Send,
    {
        let capacity = self.config.queue_capacity();
        let (job_tx, job_rx) = bounded::<Job>(capacity);
        let (result_tx, result_rx) = bounded::<Outcome>(capacity);
        let classifier = self.classifier;

        thread::scope(|s| {
            let workers: Vec<_> = (0..self.config.workers)
                .map(|id| {
                    let jobs = job_rx.clone();
                    let results = result_tx.clone();
                    s.spawn(move || work(id, classifier, jobs, results))
                })
                .collect();
            // once every worker is gone, sends fail instead of blocking
            drop(job_rx);

            let consumer = s.spawn(move || consume(result_rx, sink));

            let mut stats = PipelineStats::default();
            let mut input_error = None;
            for job in input {
                let job = match job {
                    Ok(job) => job,
                    Err(err) if err.is_recoverable() => {
                        warn!("Skipping prediction record: {err}");
                        stats.skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        input_error = Some(err);
                        break;
                    }
                };
                if job_tx.send(Job::Classify(job)).is_err() {
                    warn!("All workers exited before the input was exhausted");
                    break;
                }
                stats.submitted += 1;
                if stats.submitted % PROGRESS_EVERY == 0 {
                    debug!(
                        "Processed {} product titles so far",
                        stats.submitted.to_formatted_string(&Locale::en)
                    );
                }
            }
            info!(
                "Processed {} product titles in total",
                stats.submitted.to_formatted_string(&Locale::en)
            );

            for _ in 0..workers.len() {
                if job_tx.send(Job::Shutdown).is_err() {
                    break;
                }
            }

            let mut failure = None;
            for (id, worker) in workers.into_iter().enumerate() {
                match worker.join() {
                    Ok(processed) => stats.per_worker.push(processed),
                    Err(_) => {
                        stats.per_worker.push(0);
                        failure.get_or_insert_with(|| {
                            ClassifierError::Pipeline(format!("worker {id} panicked"))
                        });
                    }
                }
            }

            // the consumer may already be gone; it is joined below either way
            let _ = result_tx.send(Outcome::Finished);
            drop(result_tx);

            match consumer.join() {
                Ok(Ok(delivered)) => stats.delivered = delivered,
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    failure.get_or_insert_with(|| {
                        ClassifierError::Pipeline("result consumer panicked".to_string())
                    });
                }
            }

            match input_error.or(failure) {
                Some(err) => Err(err),
                None => Ok(stats),
            }
        })
    }
}

/// Worker loop: Idle (blocked on the intake queue) until a job arrives,
/// Processing while classifying it, and back. Exits on its shutdown sentinel.
fn work(id: usize, classifier: &Classifier, jobs: Receiver<Job>, results: Sender<Outcome>) -> u64 {
    trace!("worker {id} started");
    let mut processed = 0;
    while let Ok(job) = jobs.recv() {
        let PredictionJob { seq, input } = match job {
            Job::Classify(job) => job,
            Job::Shutdown => break,
        };
        let result = PredictionResult {
            seq,
            prediction: classifier.predict(&input.title),
            expected: input.expected,
        };
        processed += 1;
        if results.send(Outcome::Prediction(result)).is_err() {
            warn!("worker {id}: result queue closed, exiting");
            break;
        }
    }
    debug!("worker {id} exited after {processed} titles");
    processed
}

fn consume<F>(results: Receiver<Outcome>, mut sink: F) -> Result<u64>
where
    F: FnMut(PredictionResult) -> io::Result<()>,
{
    let mut delivered = 0;
    let mut sink_error = None;
    while let Ok(outcome) = results.recv() {
        let result = match outcome {
            Outcome::Prediction(result) => result,
            Outcome::Finished => break,
        };
        if sink_error.is_some() {
            continue;
        }
        match sink(result) {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!("Discarding further results: {err}");
                sink_error = Some(err);
            }
        }
    }
    match sink_error {
        Some(err) => Err(err.into()),
        None => Ok(delivered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetReader;
    use crate::structs::{LabelId, PredictionInput, TrainingExample};
    use crate::training::{TrainingConfig, TrainingContext};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn classifier() -> Classifier {
        let config = TrainingConfig::new(1, 10).unwrap();
        let mut context = TrainingContext::new(&config).unwrap();
        for (label, title) in [(1, "red shoe"), (2, "blue hat")] {
            context.learn(&TrainingExample {
                title: title.to_string(),
                label,
                category: 0,
            });
        }
        context.freeze()
    }

    fn job(seq: u64, input: PredictionInput) -> Result<PredictionJob> {
        Ok(PredictionJob { seq, input })
    }

    fn inputs(count: u64) -> Vec<Result<PredictionJob>> {
        (1..=count)
            .map(|seq| {
                let title = if seq % 2 == 1 { "red thing" } else { "blue thing" };
                job(seq, PredictionInput::new(title))
            })
            .collect()
    }

    fn run_collect(
        classifier: &Classifier,
        config: PipelineConfig,
        inputs: impl IntoIterator<Item = Result<PredictionJob>>,
    ) -> (Result<PipelineStats>, Vec<PredictionResult>) {
        let collected = Mutex::new(Vec::new());
        let pipeline = Pipeline::new(classifier, config).unwrap();
        let stats = pipeline.run(inputs, |result| {
            collected.lock().unwrap().push(result);
            Ok(())
        });
        (stats, collected.into_inner().unwrap())
    }

    #[test]
    fn test_every_job_yields_one_result() {
        let classifier = classifier();
        for workers in [1, 3, 8] {
            let config = PipelineConfig::default().with_workers(workers);
            let (stats, results) = run_collect(&classifier, config, inputs(1000));
            let stats = stats.unwrap();

            assert_eq!(stats.submitted, 1000);
            assert_eq!(stats.delivered, 1000);
            assert_eq!(stats.per_worker.len(), workers);
            assert_eq!(stats.processed(), 1000);

            let seqs: BTreeSet<u64> = results.iter().map(|r| r.seq).collect();
            assert_eq!(seqs, (1..=1000).collect::<BTreeSet<_>>());
            for result in &results {
                let expected: LabelId = if result.seq % 2 == 1 { 1 } else { 2 };
                assert_eq!(result.prediction.label, Some(expected));
            }
        }
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let classifier = classifier();
        let config = PipelineConfig::default().with_workers(16).with_queue_depth(1);
        let (stats, results) = run_collect(&classifier, config, inputs(3));
        assert_eq!(stats.unwrap().processed(), 3);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_no_input_still_shuts_down() {
        let classifier = classifier();
        let config = PipelineConfig::default().with_workers(4);
        let (stats, results) = run_collect(&classifier, config, Vec::new());
        let stats = stats.unwrap();
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.per_worker, [0, 0, 0, 0]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_expected_label_is_echoed() {
        let classifier = classifier();
        let inputs = vec![
            job(1, PredictionInput::new("red").with_expected(1)),
            job(2, PredictionInput::new("red").with_expected(2)),
            job(3, PredictionInput::new("green")),
        ];
        let (stats, mut results) =
            run_collect(&classifier, PipelineConfig::default().with_workers(2), inputs);
        stats.unwrap();
        results.sort_by_key(|r| r.seq);
        assert_eq!(results[0].is_correct(), Some(true));
        assert_eq!(results[1].is_correct(), Some(false));
        assert_eq!(results[2].is_correct(), None);
        assert_eq!(results[2].prediction.label, None);
    }

    #[test]
    fn test_blank_lines_keep_their_line_number() {
        let classifier = classifier();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.tsv");
        std::fs::write(&path, "red\n\nred\n").unwrap();
        let jobs = DatasetReader::open(&path).unwrap().prediction_jobs();

        let (stats, mut results) =
            run_collect(&classifier, PipelineConfig::default().with_workers(2), jobs);
        assert_eq!(stats.unwrap().delivered, 3);
        results.sort_by_key(|r| r.seq);
        let seqs: Vec<u64> = results.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, [1, 2, 3]);
        assert_eq!(results[0].prediction.label, Some(1));
        assert!(!results[1].prediction.is_match());
        assert_eq!(results[2].prediction.label, Some(1));
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let classifier = classifier();
        let mut inputs = inputs(4);
        inputs.insert(2, Err(ClassifierError::malformed(3, "bad label")));
        let (stats, results) =
            run_collect(&classifier, PipelineConfig::default().with_workers(2), inputs);
        let stats = stats.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.submitted, 4);
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_input_error_stops_submission_and_drains() {
        let classifier = classifier();
        let mut inputs = inputs(10);
        inputs.push(Err(ClassifierError::Io(io::Error::other("read failed"))));
        inputs.extend(self::inputs(10));
        let (stats, results) =
            run_collect(&classifier, PipelineConfig::default().with_workers(3), inputs);
        assert!(matches!(stats, Err(ClassifierError::Io(_))));
        assert_eq!(results.len(), 10);
    }

    #[test]
    fn test_sink_error_does_not_deadlock() {
        let classifier = classifier();
        let config = PipelineConfig::default().with_workers(2).with_queue_depth(1);
        let pipeline = Pipeline::new(&classifier, config).unwrap();
        let mut calls = 0;
        let outcome = pipeline.run(inputs(500), |_| {
            calls += 1;
            Err(io::Error::other("broken pipe"))
        });
        assert!(matches!(outcome, Err(ClassifierError::Io(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let classifier = classifier();
        assert!(Pipeline::new(&classifier, PipelineConfig::default().with_workers(0)).is_err());
        assert!(Pipeline::new(&classifier, PipelineConfig::default().with_queue_depth(0)).is_err());
    }

    #[test]
    fn test_workers_exit_on_matching_sentinels() {
        let classifier = classifier();
        let workers = 4;
        let jobs_sent = 25u64;
        let (job_tx, job_rx) = bounded(64);
        let (result_tx, result_rx) = bounded(64);

        let processed: u64 = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let jobs = job_rx.clone();
                    let results = result_tx.clone();
                    let classifier = &classifier;
                    s.spawn(move || work(id, classifier, jobs, results))
                })
                .collect();
            for seq in 1..=jobs_sent {
                let input = PredictionInput::new("red");
                job_tx.send(Job::Classify(PredictionJob { seq, input })).unwrap();
            }
            for _ in 0..workers {
                job_tx.send(Job::Shutdown).unwrap();
            }
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        drop(result_tx);

        assert_eq!(processed, jobs_sent);
        assert!(job_rx.is_empty());
        let seqs: BTreeSet<u64> = result_rx
            .iter()
            .filter_map(|outcome| match outcome {
                Outcome::Prediction(result) => Some(result.seq),
                Outcome::Finished => None,
            })
            .collect();
        assert_eq!(seqs, (1..=jobs_sent).collect::<BTreeSet<_>>());
    }
}
