// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Free-space search and page chain primitives.
//!
//! Everything here is built on one fact: a byte still reading 0xFF has never
//! been programmed since the last erase, so it is free.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::config::{
    DATA_END_PAGE, DATA_FIRST_PAGE, DATA_PAGES_PER_ROW, ERASED, MAX_DATA_ROWS, META_INDEX_PAGE,
    META_ROWS, NO_NEXT, PAGE_SIZE, PAGE_USED,
};
use crate::error::{FsError, Result};
use crate::flash::SpiFlash;
use crate::fs::layout::{big_row_addr, first_entry_page, meta_idx_addr};
use crate::fs::FsCore;
use crate::types::{MetaPtr, PagePtr};

impl<F: SpiFlash> FsCore<F> {
    /// Reads the page-sized window at `addr` and returns the first offset
    /// `start + k * width` whose `width` bytes are all erased.
    pub(crate) fn first_free(&mut self, addr: u32, start: usize, width: usize) -> Result<Option<usize>> {
        self.flash.read(addr, &mut self.buf)?;
        let mut off = start;
        while off + width <= PAGE_SIZE {
            if self.buf[off..off + width].iter().all(|&b| b == ERASED) {
                return Ok(Some(off));
            }
            off += width;
        }
        Ok(None)
    }

    /// True if `len` bytes at `addr` are erased. `len` is at most one page.
    pub(crate) fn is_erased(&mut self, addr: u32, len: usize) -> Result<bool> {
        let window = &mut self.buf[..len];
        self.flash.read(addr, window)?;
        Ok(window.iter().all(|&b| b == ERASED))
    }

    /// Finds an unwritten content page, preferring rows that are already
    /// mapped. Scans from `start_row`, wrapping. Maps a fresh row only when
    /// every mapped row is full.
    pub(crate) fn find_free_data_page(&mut self, start_row: usize) -> Result<PagePtr> {
        let n = self.num_data_rows;
        if n == 0 {
            return Err(FsError::NoSpace);
        }

        for i in 0..n {
            let row = (start_row + i) % n;
            if self.row_remap[row].is_none() || self.data_free[row] == 0 {
                continue;
            }
            let index = self.data_index_addr(PagePtr::new(row as u8, 0))?;
            match self.first_free(index, DATA_FIRST_PAGE, 1)? {
                Some(page) if page < DATA_END_PAGE => return Ok(PagePtr::new(row as u8, page as u8)),
                _ => {
                    warn!("snorfs: row {} counted {} free pages but has none", row, self.data_free[row]);
                    self.data_free[row] = 0;
                }
            }
        }

        for i in 0..n {
            let row = (start_row + i) % n;
            if self.row_remap[row].is_none() {
                self.map_row(row)?;
                return Ok(PagePtr::new(row as u8, DATA_FIRST_PAGE as u8));
            }
        }

        Err(FsError::NoSpace)
    }

    /// Assigns the lowest unused physical row to logical `row`.
    fn map_row(&mut self, row: usize) -> Result<()> {
        let mut used = [false; MAX_DATA_ROWS];
        for phys in self.row_remap.iter().flatten() {
            used[*phys as usize] = true;
        }
        let phys = (0..self.num_data_rows)
            .find(|&p| !used[p])
            .ok_or(FsError::NoSpace)?;

        let log = self.remap_addr(row);
        let slot = match self.first_free(log, 0, 1)? {
            Some(off) if off < self.remap_size() as usize => off,
            _ => return Err(FsError::NoSpace),
        };

        // 1. Start the physical row from a clean state
        self.flash.erase_big_row(big_row_addr(phys + META_ROWS))?;
        // 2. Commit the mapping
        self.flash.program(log + slot as u32, &[phys as u8])?;

        self.row_remap[row] = Some(phys as u8);
        self.data_free[row] = DATA_PAGES_PER_ROW as u8;
        debug!("snorfs: mapped row {} to phys {}", row, phys + META_ROWS);
        Ok(())
    }

    fn claim_data_page(&mut self, ptr: PagePtr) -> Result<()> {
        let addr = self.data_index_addr(ptr)?;
        self.flash.program(addr, &[PAGE_USED])?;
        let free = &mut self.data_free[ptr.row()];
        *free = free.saturating_sub(1);
        Ok(())
    }

    /// Finds, verifies and claims a content page. Pages whose content or next
    /// pointer is dirty (left over from an interrupted erase) are claimed and
    /// skipped so they are never handed out.
    pub(crate) fn alloc_data_page(&mut self, start_row: usize) -> Result<PagePtr> {
        loop {
            let ptr = self.find_free_data_page(start_row)?;
            let content = self.data_data_addr(ptr)?;
            let next = self.data_next_ptr_addr(ptr)?;
            let clean = self.is_erased(content, PAGE_SIZE)? && self.is_erased(next, 2)?;
            self.claim_data_page(ptr)?;
            if clean {
                return Ok(ptr);
            }
            warn!("snorfs: skipping dirty data page {:#06x}", ptr.0);
        }
    }

    /// Fails with `NoSpace` unless `data_pages` content pages and
    /// `meta_slots` meta slots are still free. Lets a mutation bail out
    /// before it programs anything.
    pub(crate) fn ensure_space(&self, data_pages: usize, meta_slots: usize) -> Result<()> {
        let stats = self.stats();
        if stats.free_data_pages < data_pages || stats.free_meta_slots < meta_slots {
            debug!(
                "snorfs: need {} pages / {} slots, have {} / {}",
                data_pages, meta_slots, stats.free_data_pages, stats.free_meta_slots
            );
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    pub(crate) fn find_free_meta_page(&mut self) -> Result<MetaPtr> {
        for row in 0..META_ROWS {
            if self.meta_free[row] == 0 {
                continue;
            }
            let index = meta_idx_addr(MetaPtr::new(row as u8, 0));
            match self.first_free(index, first_entry_page(row), 1)? {
                Some(page) if page < META_INDEX_PAGE => return Ok(MetaPtr::new(row as u8, page as u8)),
                _ => {
                    warn!("snorfs: meta row {} counted {} free slots but has none", row, self.meta_free[row]);
                    self.meta_free[row] = 0;
                }
            }
        }
        Err(FsError::NoSpace)
    }

    /// Successor of `ptr` in its chain.
    pub(crate) fn next_page(&mut self, ptr: PagePtr) -> Result<PagePtr> {
        let addr = self.data_next_ptr_addr(ptr)?;
        let mut raw = [0u8; 2];
        self.flash.read(addr, &mut raw)?;
        let next = LittleEndian::read_u16(&raw);
        if next == NO_NEXT {
            return Err(FsError::CorruptChain(ptr.0));
        }
        let next = PagePtr(next);
        self.check_data_ptr(next)?;
        Ok(next)
    }

    /// Points `prev` at `next`. The slot must never have been written.
    pub(crate) fn link(&mut self, prev: PagePtr, next: PagePtr) -> Result<()> {
        let addr = self.data_next_ptr_addr(prev)?;
        if !self.is_erased(addr, 2)? {
            return Err(FsError::CorruptChain(prev.0));
        }
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, next.0);
        self.flash.program(addr, &raw)?;
        Ok(())
    }

    pub(crate) fn read_data(&mut self, ptr: PagePtr, off: usize, out: &mut [u8]) -> Result<()> {
        let addr = self.data_data_addr(ptr)? + off as u32;
        self.flash.read(addr, out)?;
        Ok(())
    }

    /// Programs `data` at `off` inside content page `ptr`. The target bytes
    /// must still be erased: they may be dirty if an earlier append was cut.
    pub(crate) fn program_data(&mut self, ptr: PagePtr, off: usize, data: &[u8]) -> Result<()> {
        debug_assert!(off + data.len() <= PAGE_SIZE);
        let addr = self.data_data_addr(ptr)? + off as u32;
        if !self.is_erased(addr, data.len())? {
            return Err(FsError::CorruptChain(ptr.0));
        }
        self.flash.program(addr, data)?;
        Ok(())
    }
}
