//! The chunked streaming pipeline.
//!
//! The orchestrator thread is the producer: it fills a record-reference
//! batch from page-aligned INDEX windows, maps the matching DATA window,
//! joins the previous batch, releases the previous window, and dispatches
//! the new batch to the worker pool. Mapping the next window *before*
//! joining the previous batch gives the kernel a chance to populate page
//! tables while workers still run. Two record buffers and two window
//! slots rotate so the next fill never aliases the in-flight batch.

pub mod workers;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{CaggsError, Result};
use crate::index::{parse_index_chunk, ChunkStatus, RecordRef};
use crate::json::fields::{parse_path, FieldPath, FieldTree};
use crate::stats::Stat;
use crate::window::{page_size, MmapWindow};
use self::workers::WorkerPool;

/// Run the pipeline to completion.
///
/// Returns one `Stat` per configured field in input order, or `None` when
/// the cooperative stop flag was observed (partial aggregates are
/// discarded; cancellation is not an error).
pub fn run(config: &Config, stop: &Arc<AtomicBool>) -> Result<Option<Vec<Stat>>> {
    config.validate()?;
    trace!(?config, "effective configuration");

    let paths: Vec<FieldPath> = config
        .fields
        .iter()
        .map(|field| parse_path(field))
        .collect::<Result<_>>()?;
    let tree = FieldTree::build(&paths)?;
    trace!("field tree:\n{tree}");

    let page = page_size()?;
    trace!(page_size = page);

    let i_file = open_input(&config.index_path, "INDEX")?;
    let d_file = open_input(&config.data_path, "DATA")?;
    info!(
        path = %config.index_path.display(),
        bytes = i_file.len,
        "INDEX file opened"
    );
    info!(
        path = %config.data_path.display(),
        bytes = d_file.len,
        "DATA file opened"
    );

    let paths = Arc::new(paths);
    let mut stats = vec![Stat::new(); paths.len()];
    let pool = if config.concurrency > 0 {
        Some(WorkerPool::new(config.concurrency, &tree, &paths, stop)?)
    } else {
        None
    };

    // in-line mode processes records on this thread with the tree itself
    let mut inline_tree = tree;

    let mut reader = IndexReader {
        file: i_file.file,
        len: i_file.len,
        pos: 0,
        window: None,
        chunk_size: config.index_chunk_size,
        page,
    };

    // two rotating record buffers; the previous user of a slot has always
    // been joined before the slot is refilled
    let capacity = usize::try_from(config.records_per_chunk)
        .map_err(|_| CaggsError::Config("records per chunk exceeds the address space".into()))?;
    let mut record_bufs: [Arc<Vec<RecordRef>>; 2] = [
        Arc::new(Vec::with_capacity(capacity)),
        Arc::new(Vec::with_capacity(capacity)),
    ];
    let mut in_flight: Option<Arc<MmapWindow>> = None;
    let mut batch_id: u64 = 0;

    let mut d_pos = config.header_len.min(d_file.len); // skip DATA header
    let data_end = d_file.len.saturating_sub(config.footer_len); // keep the footer out

    while !stop.load(Ordering::Relaxed) && d_pos < data_end {
        let d_align = d_pos & (page - 1);
        let slot = (batch_id & 1) as usize;
        let records = Arc::get_mut(&mut record_bufs[slot])
            .ok_or_else(|| CaggsError::Pool("record buffer still shared by workers".into()))?;
        records.clear();

        let started = Instant::now();
        let mut data_used = d_align;

        while !stop.load(Ordering::Relaxed)
            && reader.pos < reader.len
            && (records.len() as u64) < config.records_per_chunk
            && data_used < config.data_chunk_size
        {
            let records_budget = config.records_per_chunk - records.len() as u64;
            let data_budget = config.data_chunk_size - data_used;
            let (claimed, status) =
                reader.step(records, records_budget, data_used, data_budget, config.delim_len)?;
            data_used += claimed;
            if status == ChunkStatus::DataFull {
                break; // batch is full; the INDEX window stays live
            }
        }

        let num_records = records.len();
        debug!(
            batch = batch_id,
            records = num_records,
            bytes = data_used,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "batch prepared"
        );
        if data_used == d_align || num_records == 0 {
            if reader.pos < reader.len && !stop.load(Ordering::Relaxed) {
                warn!("record larger than the DATA chunk budget, stopping");
            }
            break;
        }

        // map the new DATA window before joining the previous batch
        let base = d_pos - d_align;
        let map_len = data_used.min(d_file.len - base);
        let window = MmapWindow::map(&d_file.file, d_pos, map_len, page)?;
        debug!(offset = base, bytes = map_len, "DATA window mapped");
        if let Some(last) = records.last() {
            if last.offset + last.length > map_len {
                return Err(CaggsError::IndexParse {
                    offset: base + last.offset,
                    reason: "record extends past the end of the DATA file",
                });
            }
        }

        match &pool {
            Some(pool) => {
                if let Some(previous) = in_flight.take() {
                    pool.join(&mut stats)?;
                    drop(previous); // release the previous DATA window
                    debug!("previous DATA window released");
                }
                let window = Arc::new(window);
                pool.dispatch(Arc::clone(&window), Arc::clone(&record_bufs[slot]))?;
                in_flight = Some(window);
            }
            None => {
                let processed = Instant::now();
                for record in record_bufs[slot].iter() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    workers::process_record(
                        window.bytes(),
                        record,
                        &mut inline_tree,
                        &paths,
                        &mut stats,
                    );
                }
                trace!(
                    batch = batch_id,
                    elapsed_ms = processed.elapsed().as_secs_f64() * 1e3,
                    "batch processed in-line"
                );
                // `window` drops here, releasing the mapping
            }
        }

        d_pos += data_used - d_align;
        batch_id += 1;
    }

    // final join, then release of the last DATA window
    if let Some(pool) = &pool {
        if let Some(previous) = in_flight.take() {
            pool.join(&mut stats)?;
            drop(previous);
        }
    }
    if let Some(pool) = pool {
        pool.shutdown()?;
    }

    if stop.load(Ordering::Relaxed) {
        info!("stopped before completion, partial aggregates discarded");
        return Ok(None);
    }
    info!(batches = batch_id, "aggregation complete");
    Ok(Some(stats))
}

/// Write the result array: one summary object per configured field, in
/// input order.
pub fn write_summaries<W: Write>(out: &mut W, stats: &[Stat]) -> std::io::Result<()> {
    write!(out, "[")?;
    for (i, stat) in stats.iter().enumerate() {
        if i > 0 {
            write!(out, "\n,")?;
        }
        let text = serde_json::to_string(&stat.summary()).map_err(std::io::Error::other)?;
        out.write_all(text.as_bytes())?;
    }
    write!(out, "]")
}

struct OpenedFile {
    file: File,
    len: u64,
}

fn open_input(path: &Path, label: &str) -> Result<OpenedFile> {
    let attach = |e: std::io::Error| {
        CaggsError::Io(std::io::Error::new(
            e.kind(),
            format!("{label} file {}: {e}", path.display()),
        ))
    };
    let file = File::open(path).map_err(attach)?;
    let len = file.metadata().map_err(attach)?.len();
    Ok(OpenedFile { file, len })
}

/// Streams record references out of the INDEX file through page-aligned
/// windows. A window lives only while its bytes are being consumed,
/// except when a batch fills mid-window.
struct IndexReader {
    file: File,
    len: u64,
    /// Next INDEX byte to consume.
    pos: u64,
    window: Option<LiveWindow>,
    chunk_size: u64,
    page: u64,
}

struct LiveWindow {
    map: MmapWindow,
    /// Cursor within the mapping.
    pos: u64,
}

impl IndexReader {
    /// Map a window if none is live, parse record references out of it
    /// under the given budgets, and release it once fully consumed (or
    /// when only a partial line remains, which the next window re-reads).
    fn step(
        &mut self,
        records: &mut Vec<RecordRef>,
        records_budget: u64,
        data_start: u64,
        data_budget: u64,
        delim_len: u64,
    ) -> Result<(u64, ChunkStatus)> {
        let mut fresh = false;
        let mut live = match self.window.take() {
            Some(live) => live,
            None => {
                let align = self.pos & (self.page - 1);
                let remain = self.len - (self.pos - align);
                let len = remain.min(self.chunk_size);
                let map = MmapWindow::map(&self.file, self.pos, len, self.page)?;
                debug!(offset = self.pos - align, bytes = len, "INDEX window mapped");
                fresh = true;
                LiveWindow { map, pos: align }
            }
        };

        let buf = &live.map.bytes()[live.pos as usize..];
        let is_last = (self.len - self.pos) <= buf.len() as u64;
        let parsed = parse_index_chunk(
            buf,
            is_last,
            delim_len,
            data_start,
            data_budget,
            records,
            records_budget,
            self.pos,
        )?;
        self.pos += parsed.consumed;
        live.pos += parsed.consumed;

        if parsed.status == ChunkStatus::Partial && parsed.consumed == 0 && fresh {
            // a fresh full-budget window could not hold a single line
            return Err(CaggsError::IndexParse {
                offset: self.pos,
                reason: "line exceeds the INDEX window",
            });
        }

        if parsed.status == ChunkStatus::Partial || live.pos >= live.map.len() {
            debug!(bytes = live.map.len(), "INDEX window released");
            // dropped here: the partial tail, if any, is re-read from the
            // next window mapped at the current position
        } else {
            self.window = Some(live);
        }

        Ok((parsed.data_len, parsed.status))
    }
}
