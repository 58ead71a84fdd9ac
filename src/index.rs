//! INDEX parsing: one text line per record, `filename,offset,length,fuzziness`.
//!
//! Only the `length` field is consumed; record offsets inside a DATA
//! window are reconstructed by accumulating lengths plus the inter-record
//! delimiter.

use crate::error::{CaggsError, Result};

/// Location of one record inside a mapped DATA window. `offset` is
/// relative to the beginning of the window, not the DATA file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordRef {
    pub offset: u64,
    pub length: u64,
}

/// Why [`parse_index_chunk`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Input exhausted or the record budget is full.
    Ok,
    /// A line continues past the window; its bytes were left unconsumed
    /// for the next window.
    Partial,
    /// The next record does not fit the remaining DATA budget; its line
    /// was left unconsumed.
    DataFull,
}

/// Counters reported by one [`parse_index_chunk`] call.
#[derive(Debug, Clone, Copy)]
pub struct ParsedChunk {
    /// INDEX bytes consumed.
    pub consumed: u64,
    /// Record references appended.
    pub records: u64,
    /// DATA bytes claimed (record bytes plus one delimiter per record).
    pub data_len: u64,
    pub status: ChunkStatus,
}

/// Extract the record length from one INDEX line (without its newline):
/// the decimal between the last two commas, which must be consumed
/// exactly.
pub fn parse_index_line(line: &[u8]) -> std::result::Result<u64, &'static str> {
    let fuzz_comma = memrchr(line, b',').ok_or("no fuzziness separator")?;
    let len_comma = memrchr(&line[..fuzz_comma], b',').ok_or("no length separator")?;
    let digits = &line[len_comma + 1..fuzz_comma];
    std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or("length is not a decimal integer")
}

fn memrchr(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().rposition(|&b| b == needle)
}

/// Parse INDEX lines from `buf` into `records`, accumulating DATA usage.
///
/// Record offsets start at `data_start` (the window's intra-page pad plus
/// any bytes already claimed); every record charges `delim_len` extra
/// bytes against `data_budget`. At most `records_budget` references are
/// appended. When `is_last` is false, a trailing line without a newline
/// is left for the next window; otherwise the remainder is the final
/// line. `base_offset` is the INDEX file offset of `buf[0]`, used only
/// for error reporting.
#[allow(clippy::too_many_arguments)]
pub fn parse_index_chunk(
    buf: &[u8],
    is_last: bool,
    delim_len: u64,
    data_start: u64,
    data_budget: u64,
    records: &mut Vec<RecordRef>,
    records_budget: u64,
    base_offset: u64,
) -> Result<ParsedChunk> {
    let mut pos: usize = 0;
    let mut data_len: u64 = 0;
    let mut count: u64 = 0;
    let mut status = ChunkStatus::Ok;

    while pos < buf.len() && count < records_budget {
        let rest = &buf[pos..];
        let (line, advance) = match rest.iter().position(|&b| b == b'\n') {
            Some(eol) => (&rest[..eol], eol + 1),
            None if !is_last => {
                status = ChunkStatus::Partial;
                break;
            }
            None => (rest, rest.len()),
        };

        let length = parse_index_line(line).map_err(|reason| CaggsError::IndexParse {
            offset: base_offset + pos as u64,
            reason,
        })?;

        if data_len + length + delim_len > data_budget {
            status = ChunkStatus::DataFull;
            break;
        }

        records.push(RecordRef {
            offset: data_start + data_len,
            length,
        });
        count += 1;
        data_len += length + delim_len;
        pos += advance;
    }

    Ok(ParsedChunk {
        consumed: pos as u64,
        records: count,
        data_len,
        status,
    })
}
