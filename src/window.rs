//! Page-aligned memory-mapped file windows.

use std::fs::File;

use memmap2::{Advice, Mmap, MmapOptions};

use crate::error::Result;

/// System page size. Must be positive and a power of two.
pub fn page_size() -> Result<u64> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let size = size as u64;
    if !size.is_power_of_two() {
        return Err(std::io::Error::other(format!("page size {size} is not a power of two")).into());
    }
    Ok(size)
}

/// An owning handle over a page-aligned read-only mapping.
///
/// The mapping starts at the page boundary at or below the requested
/// offset; [`prefix`](MmapWindow::prefix) is the pad between the mapping
/// base and the first logical byte. The region is advised for sequential
/// access and unmapped exactly once on drop. Views into the window are
/// plain byte slices borrowed from the handle.
pub struct MmapWindow {
    map: Mmap,
    file_offset: u64,
    prefix: u64,
}

impl MmapWindow {
    /// Map `len` bytes of `file`, measured from the page boundary at or
    /// below `offset`.
    pub fn map(file: &File, offset: u64, len: u64, page_size: u64) -> Result<MmapWindow> {
        let prefix = offset & (page_size - 1);
        let base = offset - prefix;
        let map = unsafe { MmapOptions::new().offset(base).len(len as usize).map(file)? };
        map.advise(Advice::Sequential)?;
        Ok(MmapWindow {
            map,
            file_offset: base,
            prefix,
        })
    }

    /// The mapped bytes, starting at the page-aligned base (the first
    /// `prefix()` bytes precede the requested offset).
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Mapping length in bytes, measured from the aligned base.
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pad between the mapping base and the first logical byte.
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    /// Page-aligned file offset of the mapping base.
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }
}
