// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File cursor over a page chain.
//!
//! Invariants:
//! - `first_page.is_none()` <=> no page has been allocated to the current chain
//! - `read_offset % PAGE_SIZE == 0 && read_page.is_some()` =>
//!       `read_page` holds byte `read_offset - 1`
//! - `meta_size % PAGE_SIZE == 0 && write_page.is_some()` =>
//!       `write_page` holds byte `meta_size - 1`
//! - a `None` cache is stale and is recomputed by walking from `first_page`

use core::cell::RefMut;

use log::debug;

use crate::config::{NAME_AREA, PAGE_SIZE, RECORD_SIZE};
use crate::error::{FsError, Result};
use crate::flash::SpiFlash;
use crate::fs::meta::MetaLog;
use crate::fs::{Fs, FsCore};
use crate::types::{MetaPtr, MetaRecord, PagePtr, SlotState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CursorState {
    Active { write_page: Option<PagePtr> },
    Deleted,
}

/// An open file. Every mutating call is on flash before it returns, so a
/// `File` can simply be dropped.
pub struct File<'a, F: SpiFlash> {
    fs: &'a Fs<F>,
    /// Entry the cursor was opened on. `meta_page` moves on log rollover.
    id: MetaPtr,
    meta_page: MetaPtr,
    meta_size: u32,
    /// Offset of the next unwritten record in the meta entry.
    meta_size_off: usize,
    first_page: Option<PagePtr>,
    read_page: Option<PagePtr>,
    read_offset: u32,
    state: CursorState,
}

impl<'a, F: SpiFlash> File<'a, F> {
    pub(crate) fn new(fs: &'a Fs<F>, meta_page: MetaPtr, log: MetaLog) -> Self {
        Self {
            fs,
            id: meta_page,
            meta_page,
            meta_size: log.size,
            meta_size_off: log.next_off,
            first_page: log.first_page,
            read_page: None,
            read_offset: 0,
            state: CursorState::Active { write_page: None },
        }
    }

    pub fn size(&self) -> u32 {
        self.meta_size
    }

    pub fn tell(&self) -> u32 {
        self.read_offset
    }

    /// Identity of the meta entry this cursor was opened on. Stable for the
    /// life of the cursor, even if the entry later rolls over to a new page.
    pub fn file_id(&self) -> u16 {
        self.id.0
    }

    pub fn is_deleted(&self) -> bool {
        self.state == CursorState::Deleted
    }

    fn core(&self) -> Result<RefMut<'a, FsCore<F>>> {
        self.fs.core()
    }

    fn write_page(&self) -> Result<Option<PagePtr>> {
        match self.state {
            CursorState::Active { write_page } => Ok(write_page),
            CursorState::Deleted => Err(FsError::FileDeleted),
        }
    }

    /// Copies the stored name into `out`.
    pub fn name<'b>(&self, out: &'b mut [u8; NAME_AREA]) -> Result<&'b str> {
        let mut fs = self.core()?;
        let len = fs.read_name(self.meta_page, out)?;
        core::str::from_utf8(&out[..len]).map_err(|_| FsError::CorruptMeta)
    }

    /// Page number `index` of the chain, walking from the head.
    fn page_at(&self, fs: &mut FsCore<F>, index: usize) -> Result<PagePtr> {
        if index >= fs.total_data_pages() {
            return Err(FsError::CorruptChain(self.meta_page.0));
        }
        let mut page = self.first_page.ok_or(FsError::CorruptChain(self.meta_page.0))?;
        for _ in 0..index {
            page = fs.next_page(page)?;
        }
        Ok(page)
    }

    /// Reads up to `buf.len()` bytes at the read cursor. Returns the number of
    /// bytes copied; fewer than requested means end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.write_page()?;
        if self.read_offset >= self.meta_size || buf.is_empty() {
            return Ok(0);
        }
        let mut fs = self.core()?;

        let len = core::cmp::min(buf.len(), (self.meta_size - self.read_offset) as usize);
        let mut done = 0;
        while done < len {
            let off = self.read_offset as usize % PAGE_SIZE;
            let page = match self.read_page {
                // The cache holds the page just finished; step over lazily.
                Some(prev) if off == 0 => fs.next_page(prev)?,
                Some(page) => page,
                None => self.page_at(&mut fs, self.read_offset as usize / PAGE_SIZE)?,
            };
            let chunk = core::cmp::min(PAGE_SIZE - off, len - done);
            fs.read_data(page, off, &mut buf[done..done + chunk])?;

            self.read_page = Some(page);
            self.read_offset += chunk as u32;
            done += chunk;
        }
        Ok(done)
    }

    /// Moves the read cursor to `pos`, clamped to the file size. The cached
    /// page survives only if it still covers the new position.
    pub fn seek(&mut self, pos: u32) -> Result<()> {
        self.write_page()?;
        let pos = core::cmp::min(pos, self.meta_size);
        if pos == 0 || cache_index(pos) != cache_index(self.read_offset) {
            self.read_page = None;
        }
        self.read_offset = pos;
        Ok(())
    }

    /// Appends `data` at the end of the file.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let mut write_page = self.write_page()?;
        if data.is_empty() {
            return Ok(());
        }
        let mut fs = self.core()?;
        // Nothing may be programmed past the recorded size unless it commits.
        let (pages, records) = append_cost(self.meta_size, data.len());
        fs.ensure_space(pages, self.rollover_slots(records))?;

        let mut size = self.meta_size;
        let mut done = 0;
        while done < data.len() {
            let off = size as usize % PAGE_SIZE;
            let chunk = core::cmp::min(PAGE_SIZE - off, data.len() - done);
            let bytes = &data[done..done + chunk];

            let page = if off == 0 {
                let prev = match (size, write_page) {
                    (0, _) => None,
                    (_, Some(page)) => Some(page),
                    (_, None) => Some(self.page_at(&mut fs, (size as usize - 1) / PAGE_SIZE)?),
                };
                let start_row = prev.map_or(0, |p| p.row());

                // Claim, fill, then link: a cut leaves at most an orphaned page.
                let fresh = fs.alloc_data_page(start_row)?;
                fs.program_data(fresh, 0, bytes)?;
                match prev {
                    Some(prev) => fs.link(prev, fresh)?,
                    None => {
                        self.save_record(&mut fs, MetaRecord::Head(fresh))?;
                        self.first_page = Some(fresh);
                    }
                }
                fresh
            } else {
                let page = match write_page {
                    Some(page) => page,
                    None => self.page_at(&mut fs, size as usize / PAGE_SIZE)?,
                };
                fs.program_data(page, off, bytes)?;
                page
            };

            write_page = Some(page);
            size += chunk as u32;
            done += chunk;
        }

        self.save_record(&mut fs, MetaRecord::Size(size))?;
        self.meta_size = size;
        self.state = CursorState::Active { write_page };
        Ok(())
    }

    /// Replaces the whole content. The old chain is left untouched on flash.
    pub fn overwrite(&mut self, data: &[u8]) -> Result<()> {
        self.write_page()?;
        {
            let fs = self.core()?;
            let (pages, records) = append_cost(0, data.len());
            // Size(0) from the truncate, then the append's records
            fs.ensure_space(pages, self.rollover_slots(records + 1))?;
        }
        self.truncate()?;
        self.append(data)
    }

    pub fn truncate(&mut self) -> Result<()> {
        self.write_page()?;
        if self.meta_size == 0 && self.first_page.is_none() {
            self.read_offset = 0;
            return Ok(());
        }
        {
            let mut fs = self.core()?;
            self.save_record(&mut fs, MetaRecord::Size(0))?;
        }
        self.meta_size = 0;
        self.first_page = None;
        self.read_page = None;
        self.read_offset = 0;
        self.state = CursorState::Active { write_page: None };
        Ok(())
    }

    /// Removes the file from the directory. Its pages are not reclaimed.
    pub fn del(&mut self) -> Result<()> {
        self.write_page()?;
        {
            let mut fs = self.core()?;
            fs.set_slot(self.meta_page, SlotState::Deleted)?;
        }
        debug!("snorfs: deleted entry {:#06x}", self.meta_page.0);
        self.read_page = None;
        self.state = CursorState::Deleted;
        Ok(())
    }

    /// Meta slots needed to log `records` more records: one if the log
    /// rolls over on the way.
    fn rollover_slots(&self, records: usize) -> usize {
        usize::from(self.meta_size_off + records * RECORD_SIZE > PAGE_SIZE)
    }

    /// Appends `record` to the meta log, moving the entry to a fresh page
    /// when the log is full.
    fn save_record(&mut self, fs: &mut FsCore<F>, record: MetaRecord) -> Result<()> {
        if self.meta_size_off + RECORD_SIZE <= PAGE_SIZE {
            fs.append_meta_record(self.meta_page, self.meta_size_off, record)?;
            self.meta_size_off += RECORD_SIZE;
            return Ok(());
        }

        // Compacted state including `record`. Size goes first: a zero size
        // clears the head on replay.
        let (size, head) = match record {
            MetaRecord::Size(0) => (0, None),
            MetaRecord::Size(n) => (n, self.first_page),
            MetaRecord::Head(ptr) => (self.meta_size, Some(ptr)),
        };
        let mut records = [MetaRecord::Size(size); 2];
        let used = match head {
            Some(ptr) => {
                records[1] = MetaRecord::Head(ptr);
                2
            }
            None => 1,
        };
        let (meta, next_off) = fs.relocate_meta(self.meta_page, &records[..used])?;
        self.meta_page = meta;
        self.meta_size_off = next_off;
        Ok(())
    }

    /// Logs the cursor state at debug level.
    pub fn dump(&self) {
        debug!(
            "snorfs: file {:#06x} size {} first {:?} read {}@{:?} state {:?} log off {}",
            self.meta_page.0,
            self.meta_size,
            self.first_page,
            self.read_offset,
            self.read_page,
            self.state,
            self.meta_size_off
        );
    }
}

/// New pages and meta records an append of `len` bytes at `size` uses.
fn append_cost(size: u32, len: usize) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    let off = size as usize % PAGE_SIZE;
    let pages = (off + len).div_ceil(PAGE_SIZE) - usize::from(off != 0);
    // A first page is linked by a Head record
    let records = if size == 0 { 2 } else { 1 };
    (pages, records)
}

/// Chain index of the page a cursor at `pos` caches (the page holding
/// `pos - 1` when `pos` is page aligned).
fn cache_index(pos: u32) -> usize {
    let pos = pos as usize;
    if pos > 0 && pos % PAGE_SIZE == 0 {
        pos / PAGE_SIZE - 1
    } else {
        pos / PAGE_SIZE
    }
}
