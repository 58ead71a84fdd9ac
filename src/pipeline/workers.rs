//! Fixed-size worker pool: contiguous shard dispatch, per-batch join.
//!
//! Workers are long-lived OS threads created at pool init. Each owns an
//! independent clone of the merged field tree and one `Stat` per
//! configured field for the pool's lifetime. A batch hand-off sends every
//! worker its shard of the record references plus a shared handle on the
//! mapped DATA window; the per-batch join is a rendezvous on a result
//! channel carrying the worker's per-field statistics.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::error::{CaggsError, Result};
use crate::index::RecordRef;
use crate::json::fields::{FieldPath, FieldTree};
use crate::json::{extract, JsonParser, TokenKind};
use crate::stats::Stat;
use crate::window::MmapWindow;

/// One batch hand-off: the window, the batch's record references, and
/// this worker's contiguous shard of them.
struct Job {
    window: Arc<MmapWindow>,
    records: Arc<Vec<RecordRef>>,
    shard: Range<usize>,
}

pub struct WorkerPool {
    jobs: Vec<Sender<Job>>,
    results: Receiver<Vec<Stat>>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads, each cloning `tree` and zeroed per-field
    /// statistics.
    pub fn new(
        workers: usize,
        tree: &FieldTree,
        paths: &Arc<Vec<FieldPath>>,
        stop: &Arc<AtomicBool>,
    ) -> Result<WorkerPool> {
        let (result_tx, result_rx) = bounded(workers);
        let mut jobs = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);
        for k in 0..workers {
            let (job_tx, job_rx) = bounded::<Job>(1);
            let thread = std::thread::Builder::new()
                .name(format!("caggs-worker-{k}"))
                .spawn({
                    let results = result_tx.clone();
                    let tree = tree.clone();
                    let paths = Arc::clone(paths);
                    let stop = Arc::clone(stop);
                    move || worker_loop(job_rx, results, tree, paths, stop)
                })
                .map_err(|e| CaggsError::Pool(format!("failed to spawn worker: {e}")))?;
            jobs.push(job_tx);
            threads.push(thread);
        }
        Ok(WorkerPool {
            jobs,
            results: result_rx,
            threads,
        })
    }

    /// Hand a batch to every worker as contiguous ceil-split shards
    /// (clamped, so trailing workers may receive an empty shard).
    pub fn dispatch(&self, window: Arc<MmapWindow>, records: Arc<Vec<RecordRef>>) -> Result<()> {
        let total = records.len();
        let per_worker = total.div_ceil(self.jobs.len());
        debug!(
            workers = self.jobs.len(),
            records = total,
            per_worker,
            "dispatching batch"
        );
        for (k, sender) in self.jobs.iter().enumerate() {
            let start = (k * per_worker).min(total);
            let end = (start + per_worker).min(total);
            let job = Job {
                window: Arc::clone(&window),
                records: Arc::clone(&records),
                shard: start..end,
            };
            sender
                .send(job)
                .map_err(|_| CaggsError::Pool("worker exited before dispatch".into()))?;
        }
        Ok(())
    }

    /// Wait for every worker's per-batch statistics and merge them into
    /// `into`, field by field.
    pub fn join(&self, into: &mut [Stat]) -> Result<()> {
        for _ in 0..self.jobs.len() {
            let worker_stats = self
                .results
                .recv()
                .map_err(|_| CaggsError::Pool("worker exited before reporting".into()))?;
            for (stat, partial) in into.iter_mut().zip(&worker_stats) {
                stat.merge(partial);
            }
        }
        Ok(())
    }

    /// Close the job channels and join the threads.
    pub fn shutdown(self) -> Result<()> {
        drop(self.jobs);
        for thread in self.threads {
            thread
                .join()
                .map_err(|_| CaggsError::Pool("worker thread panicked".into()))?;
        }
        Ok(())
    }
}

fn worker_loop(
    jobs: Receiver<Job>,
    results: Sender<Vec<Stat>>,
    mut tree: FieldTree,
    paths: Arc<Vec<FieldPath>>,
    stop: Arc<AtomicBool>,
) {
    let mut stats = vec![Stat::new(); paths.len()];
    while let Ok(job) = jobs.recv() {
        for stat in stats.iter_mut() {
            stat.reset();
        }
        let Job {
            window,
            records,
            shard,
        } = job;
        for record in &records[shard] {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            process_record(window.bytes(), record, &mut tree, &paths, &mut stats);
        }
        // release the window/records handles before reporting so the
        // orchestrator's release after join is the final one
        drop(window);
        drop(records);
        if results.send(stats.clone()).is_err() {
            return;
        }
    }
}

/// Run the extractor over one record and fold the matched leaves into
/// `stats`. Malformed JSON skips the record entirely; a present but
/// non-numeric (or missing) field counts without updating the extremes.
pub(crate) fn process_record(
    data: &[u8],
    record: &RecordRef,
    tree: &mut FieldTree,
    paths: &[FieldPath],
    stats: &mut [Stat],
) {
    let begin = record.offset as usize;
    let Some(bytes) = usize::try_from(record.length)
        .ok()
        .and_then(|length| begin.checked_add(length))
        .and_then(|end| data.get(begin..end))
    else {
        debug!(
            offset = record.offset,
            length = record.length,
            "record outside mapped window, skipped"
        );
        return;
    };

    tree.reset_tokens();
    let mut parser = JsonParser::new(bytes);
    if extract(&mut parser, tree.root_mut()).is_err() {
        debug!("malformed JSON record skipped");
        return;
    }

    for (path, stat) in paths.iter().zip(stats.iter_mut()) {
        let token = tree.leaf(path).map_or(crate::json::Token::eof(), |leaf| leaf.token);
        if token.kind == TokenKind::Number {
            if let Some(value) = parse_number(token.bytes(bytes)) {
                stat.add(value);
                continue;
            }
        }
        stat.count += 1;
        debug!("bad field value, ignored");
    }
}

fn parse_number(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::fields::parse_path;

    fn setup(fields: &[&str]) -> (FieldTree, Vec<FieldPath>, Vec<Stat>) {
        let paths: Vec<FieldPath> = fields.iter().map(|f| parse_path(f).unwrap()).collect();
        let tree = FieldTree::build(&paths).unwrap();
        let stats = vec![Stat::new(); paths.len()];
        (tree, paths, stats)
    }

    fn one_record(data: &[u8]) -> RecordRef {
        RecordRef {
            offset: 0,
            length: data.len() as u64,
        }
    }

    #[test]
    fn numeric_fields_accumulate() {
        let (mut tree, paths, mut stats) = setup(&["x"]);
        let data = br#"{"x": 41}"#;
        process_record(data, &one_record(data), &mut tree, &paths, &mut stats);
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].sum, 41.0);
    }

    #[test]
    fn malformed_records_do_not_count() {
        let (mut tree, paths, mut stats) = setup(&["x"]);
        let data = br#"{"x":"#;
        process_record(data, &one_record(data), &mut tree, &paths, &mut stats);
        assert_eq!(stats[0].count, 0);
    }

    #[test]
    fn non_numeric_values_count_without_extremes() {
        let (mut tree, paths, mut stats) = setup(&["x"]);
        for data in [
            br#"{"x":null}"#.as_slice(),
            br#"{"x":"s"}"#.as_slice(),
            br#"{"y":1}"#.as_slice(), // field missing entirely
        ] {
            process_record(data, &one_record(data), &mut tree, &paths, &mut stats);
        }
        assert_eq!(stats[0].count, 3);
        assert_eq!(stats[0].sum, 0.0);
    }

    #[test]
    fn unparsable_number_run_counts_as_bad_value() {
        // the scanner accepts maximal number runs; float parsing rejects
        let (mut tree, paths, mut stats) = setup(&["x"]);
        let data = br#"{"x":1.2.3}"#;
        process_record(data, &one_record(data), &mut tree, &paths, &mut stats);
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].sum, 0.0);
    }

    #[test]
    fn stale_tokens_do_not_leak_between_records() {
        let (mut tree, paths, mut stats) = setup(&["x"]);
        let with = br#"{"x":5}"#;
        let without = br#"{"y":1}"#;
        process_record(with, &one_record(with), &mut tree, &paths, &mut stats);
        process_record(without, &one_record(without), &mut tree, &paths, &mut stats);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].sum, 5.0); // the second record contributed no value
    }

    #[test]
    fn record_past_window_end_is_skipped() {
        let (mut tree, paths, mut stats) = setup(&["x"]);
        let data = br#"{"x":5}"#;
        let record = RecordRef {
            offset: 4,
            length: data.len() as u64,
        };
        process_record(data, &record, &mut tree, &paths, &mut stats);
        assert_eq!(stats[0].count, 0);
    }
}
