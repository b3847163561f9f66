// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Meta entries: the flat directory.
//!
//! An entry is one page: the NUL-terminated name in the first `NAME_AREA`
//! bytes, then an append-only log of `MetaRecord`s. Slot states live in the
//! index page at the end of each meta row.

use log::{debug, warn};

use crate::config::{
    ERASED, META_INDEX_PAGE, META_ROWS, NAME_AREA, PAGE_SIZE, RECORD_SIZE,
};
use crate::error::{FsError, Result};
use crate::flash::SpiFlash;
use crate::fs::layout::{first_entry_page, meta_idx_addr, meta_page_addr};
use crate::fs::FsCore;
use crate::types::{MetaPtr, MetaRecord, PagePtr, SlotState};

/// Replayed state of an entry's record log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MetaLog {
    pub size: u32,
    pub first_page: Option<PagePtr>,
    /// Offset of the next unwritten record; `PAGE_SIZE` when the log is full.
    pub next_off: usize,
}

impl<F: SpiFlash> FsCore<F> {
    pub(crate) fn set_slot(&mut self, meta: MetaPtr, state: SlotState) -> Result<()> {
        self.flash.program(meta_idx_addr(meta), &[state.to_byte()])?;
        Ok(())
    }

    /// Reads the slot index page of `row` into `index`.
    pub(crate) fn read_slot_index(&mut self, row: usize, index: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.flash.read(meta_idx_addr(MetaPtr::new(row as u8, 0)), index)?;
        Ok(())
    }

    /// Copies the stored name of `meta` into `out` and returns its length.
    /// A name with no terminator or no bytes is corrupt.
    pub(crate) fn read_name(&mut self, meta: MetaPtr, out: &mut [u8; NAME_AREA]) -> Result<usize> {
        self.flash.read(meta_page_addr(meta), out)?;
        match out.iter().position(|&b| b == 0) {
            Some(len) if len > 0 => Ok(len),
            _ => Err(FsError::CorruptMeta),
        }
    }

    fn name_matches(&mut self, meta: MetaPtr, name: &[u8]) -> Result<bool> {
        let stored = &mut self.buf[..name.len() + 1];
        self.flash.read(meta_page_addr(meta), stored)?;
        Ok(&stored[..name.len()] == name && stored[name.len()] == 0)
    }

    /// Linear scan of live entries.
    pub(crate) fn find_meta_entry(&mut self, name: &[u8]) -> Result<Option<MetaPtr>> {
        let mut index = [0u8; PAGE_SIZE];
        for row in 0..META_ROWS {
            self.read_slot_index(row, &mut index)?;
            for page in first_entry_page(row)..META_INDEX_PAGE {
                if SlotState::from_byte(index[page]) != SlotState::Live {
                    continue;
                }
                let meta = MetaPtr::new(row as u8, page as u8);
                if self.name_matches(meta, name)? {
                    return Ok(Some(meta));
                }
            }
        }
        Ok(None)
    }

    /// Reserves a slot for a new entry and marks it pending. Slots whose page
    /// is not erased are retired.
    fn reserve_meta_page(&mut self) -> Result<MetaPtr> {
        loop {
            let meta = self.find_free_meta_page()?;
            let clean = self.is_erased(meta_page_addr(meta), PAGE_SIZE)?;
            if clean {
                self.set_slot(meta, SlotState::Pending)?;
            } else {
                warn!("snorfs: retiring dirty meta page {:#06x}", meta.0);
                self.set_slot(meta, SlotState::Deleted)?;
            }
            let free = &mut self.meta_free[meta.row()];
            *free = free.saturating_sub(1);
            if clean {
                return Ok(meta);
            }
        }
    }

    /// Stages an entry image in the scratch buffer: `name` (or the name
    /// already in the buffer) followed by `records`.
    fn stage_entry(&mut self, name: Option<&[u8]>, records: &[MetaRecord]) -> usize {
        if let Some(name) = name {
            self.buf[..NAME_AREA].fill(ERASED);
            self.buf[..name.len()].copy_from_slice(name);
            self.buf[name.len()] = 0;
        }
        self.buf[NAME_AREA..].fill(ERASED);
        let mut off = NAME_AREA;
        for record in records {
            self.buf[off..off + RECORD_SIZE].copy_from_slice(&record.encode());
            off += RECORD_SIZE;
        }
        off
    }

    /// Creates an entry holding `name` and a zero size record.
    pub(crate) fn create_meta_page(&mut self, name: &[u8]) -> Result<MetaPtr> {
        // 1. Pending: invisible to lookups, repaired by mount if we stop here
        let meta = self.reserve_meta_page()?;
        // 2. Entry content
        self.stage_entry(Some(name), &[MetaRecord::Size(0)]);
        self.flash.program(meta_page_addr(meta), &self.buf)?;
        // 3. Live
        self.set_slot(meta, SlotState::Live)?;
        debug!("snorfs: created entry {:#06x}", meta.0);
        Ok(meta)
    }

    /// Moves a full entry to a fresh page holding only `records`.
    ///
    /// Order: new slot pending, new page written, old slot deleted, new slot
    /// live. Mount finishes or discards a relocation cut at any step.
    pub(crate) fn relocate_meta(&mut self, old: MetaPtr, records: &[MetaRecord]) -> Result<(MetaPtr, usize)> {
        let new = self.reserve_meta_page()?;
        self.flash.read(meta_page_addr(old), &mut self.buf)?;
        let next_off = self.stage_entry(None, records);
        self.flash.program(meta_page_addr(new), &self.buf)?;
        self.set_slot(old, SlotState::Deleted)?;
        self.set_slot(new, SlotState::Live)?;
        debug!("snorfs: relocated entry {:#06x} -> {:#06x}", old.0, new.0);
        Ok((new, next_off))
    }

    pub(crate) fn append_meta_record(&mut self, meta: MetaPtr, off: usize, record: MetaRecord) -> Result<()> {
        debug_assert!(off + RECORD_SIZE <= PAGE_SIZE);
        let addr = meta_page_addr(meta) + off as u32;
        if !self.is_erased(addr, RECORD_SIZE)? {
            return Err(FsError::CorruptMeta);
        }
        self.flash.program(addr, &record.encode())?;
        Ok(())
    }

    /// Replays the record log of `meta`.
    pub(crate) fn load_meta_log(&mut self, meta: MetaPtr) -> Result<MetaLog> {
        self.flash.read(meta_page_addr(meta), &mut self.buf)?;

        let mut log = MetaLog {
            size: 0,
            first_page: None,
            next_off: PAGE_SIZE,
        };
        let mut off = NAME_AREA;
        while off + RECORD_SIZE <= PAGE_SIZE {
            match MetaRecord::decode(&self.buf[off..off + RECORD_SIZE])? {
                None => {
                    log.next_off = off;
                    break;
                }
                Some(MetaRecord::Size(n)) => {
                    log.size = n;
                    if n == 0 {
                        log.first_page = None;
                    }
                }
                Some(MetaRecord::Head(ptr)) => log.first_page = Some(ptr),
            }
            off += RECORD_SIZE;
        }

        if let Some(head) = log.first_page {
            self.check_data_ptr(head)?;
        }
        if log.size > 0 && log.first_page.is_none() {
            return Err(FsError::CorruptMeta);
        }
        Ok(log)
    }
}
