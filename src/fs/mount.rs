// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mount-time recovery and format.

use log::{error, info, warn};

use crate::config::{
    BIG_ROW_SIZE, DATA_END_PAGE, DATA_FIRST_PAGE, ERASED, MAX_BIG_ROWS, MAX_DATA_ROWS,
    META_INDEX_PAGE, META_ROWS, NAME_AREA, PAGE_FREE, PAGE_SIZE, SMALL_ROW_SIZE,
};
use crate::error::{FsError, Result};
use crate::flash::SpiFlash;
use crate::fs::layout::{big_row_addr, first_entry_page, meta_idx_addr};
use crate::fs::FsCore;
use crate::types::{MetaPtr, PagePtr, SlotState};

impl<F: SpiFlash> FsCore<F> {
    /// Number of big rows on the device, if it is a supported size.
    fn big_rows(&self) -> Result<usize> {
        let capacity = self.flash.capacity();
        let rows = (capacity / BIG_ROW_SIZE) as usize;
        if capacity % BIG_ROW_SIZE != 0 || rows <= META_ROWS || rows > MAX_BIG_ROWS {
            return Err(FsError::UnsupportedGeometry(self.flash.num_pages()));
        }
        Ok(rows)
    }

    pub(crate) fn mount(&mut self) -> Result<()> {
        if self.mounted {
            return Ok(());
        }
        self.num_data_rows = self.big_rows()? - META_ROWS;

        // 1. Remap table
        self.load_remap()?;
        // 2. Meta slots: finish or discard interrupted creates and relocations
        self.recover_pending()?;
        let live = self.load_meta_free()?;
        // 3. Data free counters
        self.load_data_free()?;

        self.mounted = true;
        info!(
            "snorfs: mounted {} data rows ({} mapped), {} files",
            self.num_data_rows,
            self.row_remap.iter().filter(|m| m.is_some()).count(),
            live
        );
        Ok(())
    }

    fn load_remap(&mut self) -> Result<()> {
        let n = self.num_data_rows;
        let size = self.remap_size() as usize;
        let mut used = [false; MAX_DATA_ROWS];

        self.row_remap.clear();
        for row in 0..n {
            let addr = self.remap_addr(row);
            self.flash.read(addr, &mut self.buf[..size])?;
            let programmed = self.buf[..size]
                .iter()
                .position(|&b| b == ERASED)
                .unwrap_or(size);

            let mapping = match programmed {
                0 => None,
                k => {
                    let phys = self.buf[k - 1] as usize;
                    if phys >= n || used[phys] {
                        error!("snorfs: remap log of row {} points at phys {}", row, phys);
                        return Err(FsError::CorruptMeta);
                    }
                    used[phys] = true;
                    Some(phys as u8)
                }
            };
            self.row_remap
                .push(mapping)
                .map_err(|_| FsError::UnsupportedGeometry(self.flash.num_pages()))?;
        }
        Ok(())
    }

    /// Resolves pending slots. A pending entry whose name is also live is an
    /// unfinished create or relocation and is dropped; otherwise the old slot
    /// is already gone and the pending one takes over.
    fn recover_pending(&mut self) -> Result<()> {
        let mut index = [0u8; PAGE_SIZE];
        let mut name = [0u8; NAME_AREA];

        for row in 0..META_ROWS {
            self.read_slot_index(row, &mut index)?;
            for page in first_entry_page(row)..META_INDEX_PAGE {
                if SlotState::from_byte(index[page]) != SlotState::Pending {
                    continue;
                }
                let meta = MetaPtr::new(row as u8, page as u8);
                let verdict = match self.read_name(meta, &mut name) {
                    Ok(len) => match self.find_meta_entry(&name[..len])? {
                        Some(_) => SlotState::Deleted,
                        None if self.load_meta_log(meta).is_ok() => SlotState::Live,
                        None => SlotState::Deleted,
                    },
                    Err(_) => SlotState::Deleted,
                };
                warn!("snorfs: pending entry {:#06x} recovered as {:?}", meta.0, verdict);
                self.set_slot(meta, verdict)?;
            }
        }
        Ok(())
    }

    /// Rebuilds `meta_free` and returns the number of live entries.
    fn load_meta_free(&mut self) -> Result<usize> {
        let mut index = [0u8; PAGE_SIZE];
        let mut live = 0;
        for row in 0..META_ROWS {
            self.read_slot_index(row, &mut index)?;
            let slots = &index[first_entry_page(row)..META_INDEX_PAGE];
            self.meta_free[row] = slots
                .iter()
                .filter(|&&b| SlotState::from_byte(b) == SlotState::Free)
                .count() as u8;
            live += slots
                .iter()
                .filter(|&&b| SlotState::from_byte(b) == SlotState::Live)
                .count();
        }
        Ok(live)
    }

    fn load_data_free(&mut self) -> Result<()> {
        self.data_free.clear();
        for row in 0..self.num_data_rows {
            let free = match self.row_remap[row] {
                Some(_) => {
                    let index = self.data_index_addr(PagePtr::new(row as u8, 0))?;
                    self.flash.read(index, &mut self.buf)?;
                    self.buf[DATA_FIRST_PAGE..DATA_END_PAGE]
                        .iter()
                        .filter(|&&b| b == PAGE_FREE)
                        .count() as u8
                }
                None => 0,
            };
            self.data_free
                .push(free)
                .map_err(|_| FsError::UnsupportedGeometry(self.flash.num_pages()))?;
        }
        Ok(())
    }

    /// Erases the device and drops all in-memory state.
    pub(crate) fn format(&mut self) -> Result<()> {
        let rows = self.big_rows()?;
        info!("snorfs: formatting {} rows", rows);

        // 1. Directory first: remap log and slot indexes. A cut after this
        //    point leaves an empty filesystem, never a half-erased file.
        self.flash.erase_small_row(0)?;
        for row in 0..META_ROWS {
            let index = meta_idx_addr(MetaPtr::new(row as u8, 0));
            self.flash.erase_small_row(index & !(SMALL_ROW_SIZE - 1))?;
        }
        // 2. Everything else
        for row in 0..rows {
            self.flash.erase_big_row(big_row_addr(row))?;
        }

        self.mounted = false;
        self.num_data_rows = 0;
        self.row_remap.clear();
        self.data_free.clear();
        self.meta_free = [0; META_ROWS];
        Ok(())
    }
}
