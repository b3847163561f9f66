// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Address translation.
//!
//! Physical layout, in big rows:
//!
//! ```text
//! meta row 0 : [remap log: 16 pages][entries ...][slot index]
//! meta row 1 : [entries ...................... ][slot index]
//! data row k : [page index][content pages 1..254][next-pointer table: 2 pages]
//! ```
//!
//! Data rows are addressed through the remap table; meta rows are fixed.

use core::cmp::min;

use crate::config::{
    BIG_ROW_SIZE, DATA_END_PAGE, DATA_FIRST_PAGE, META_ROWS, NEXT_PTR_PAGES, PAGE_SIZE,
    RESERVED_META_PAGES, SMALL_ROW_SIZE,
};
use crate::error::{FsError, Result};
use crate::flash::SpiFlash;
use crate::fs::FsCore;
use crate::types::{MetaPtr, PagePtr};

pub(crate) const fn big_row_addr(big_row: usize) -> u32 {
    big_row as u32 * BIG_ROW_SIZE
}

pub(crate) const fn meta_page_addr(meta: MetaPtr) -> u32 {
    big_row_addr(meta.row()) + (meta.page() * PAGE_SIZE) as u32
}

/// Byte describing `meta` inside its row's slot index page.
pub(crate) const fn meta_idx_addr(meta: MetaPtr) -> u32 {
    big_row_addr(meta.row() + 1) - PAGE_SIZE as u32 + meta.page() as u32
}

/// First page of a meta row that may hold an entry.
pub(crate) const fn first_entry_page(meta_row: usize) -> usize {
    if meta_row == 0 {
        RESERVED_META_PAGES
    } else {
        0
    }
}

impl<F: SpiFlash> FsCore<F> {
    /// Bytes of remap log per logical data row. One small row describes every row.
    pub(crate) fn remap_size(&self) -> u32 {
        if self.num_data_rows == 0 {
            return 0;
        }
        min(SMALL_ROW_SIZE / self.num_data_rows as u32, PAGE_SIZE as u32)
    }

    /// Start of the remap log of logical row `row` (inside meta row 0).
    pub(crate) fn remap_addr(&self, row: usize) -> u32 {
        row as u32 * self.remap_size()
    }

    pub(crate) fn data_row_addr(&self, row: usize) -> Result<u32> {
        match self.row_remap.get(row) {
            Some(Some(phys)) => Ok(big_row_addr(*phys as usize + META_ROWS)),
            _ => Err(FsError::CorruptChain(PagePtr::new(row as u8, 0).0)),
        }
    }

    /// Allocation byte of `ptr` in its row's index page.
    pub(crate) fn data_index_addr(&self, ptr: PagePtr) -> Result<u32> {
        Ok(self.data_row_addr(ptr.row())? + ptr.page() as u32)
    }

    pub(crate) fn data_next_ptr_addr(&self, ptr: PagePtr) -> Result<u32> {
        let table = BIG_ROW_SIZE - (NEXT_PTR_PAGES * PAGE_SIZE) as u32;
        Ok(self.data_row_addr(ptr.row())? + table + 2 * ptr.page() as u32)
    }

    pub(crate) fn data_data_addr(&self, ptr: PagePtr) -> Result<u32> {
        Ok(self.data_row_addr(ptr.row())? + (ptr.page() * PAGE_SIZE) as u32)
    }

    /// A content page in a mapped row.
    pub(crate) fn check_data_ptr(&self, ptr: PagePtr) -> Result<()> {
        let page_ok = (DATA_FIRST_PAGE..DATA_END_PAGE).contains(&ptr.page());
        let row_ok = matches!(self.row_remap.get(ptr.row()), Some(Some(_)));
        if page_ok && row_ok {
            Ok(())
        } else {
            Err(FsError::CorruptChain(ptr.0))
        }
    }

    /// Upper bound on the length of any chain.
    pub(crate) fn total_data_pages(&self) -> usize {
        self.num_data_rows * (DATA_END_PAGE - DATA_FIRST_PAGE)
    }
}
