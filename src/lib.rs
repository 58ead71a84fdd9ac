//! caggs: streaming numeric aggregations over INDEX/DATA datasets.
//!
//! An INDEX file (text, one `filename,offset,length,fuzziness` line per
//! record) describes how a DATA file (raw bytes, optionally framed by a
//! fixed-size header, inter-record delimiter, and footer) is subdivided
//! into JSON records. One or more dotted field paths select numeric
//! leaves; the pipeline computes count/min/max/sum (and sum of squares)
//! per field in one sequential pass.
//!
//! Both files are driven through page-aligned mmap windows sized to stay
//! far below RAM, and record batches are processed by a fixed worker pool
//! overlapped with the next window's preparation. See [`pipeline::run`].

pub mod config;
pub mod error;
pub mod index;
pub mod json;
pub mod pipeline;
pub mod stats;
pub mod window;

pub use config::Config;
pub use error::{CaggsError, Result};
pub use pipeline::{run, write_summaries};
pub use stats::Stat;
