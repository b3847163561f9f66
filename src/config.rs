// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Flash geometry and on-flash format constants.

/// Program granularity in bytes.
pub const PAGE_SIZE: usize = 256;

/// Small erase unit (4 KiB sector).
pub const SMALL_ROW_SIZE: u32 = 4096;
pub const SMALL_ROW_PAGES: usize = SMALL_ROW_SIZE as usize / PAGE_SIZE;

/// Big erase unit (64 KiB block).
pub const BIG_ROW_SIZE: u32 = 65536;
pub const BIG_ROW_PAGES: usize = BIG_ROW_SIZE as usize / PAGE_SIZE;

/// Big rows reserved for the directory. Each one holds roughly 240 files.
pub const META_ROWS: usize = 2;

/// Leading pages of meta row 0 that hold the row remap log.
pub const RESERVED_META_PAGES: usize = SMALL_ROW_PAGES;

/// Last page of every meta row is the slot index.
pub const META_INDEX_PAGE: usize = BIG_ROW_PAGES - 1;

/// Trailing pages of every data row hold the next-pointer table (2 bytes per page).
pub const NEXT_PTR_PAGES: usize = (2 * BIG_ROW_PAGES + PAGE_SIZE - 1) / PAGE_SIZE;

/// Page 0 of a data row is its allocation index.
pub const DATA_FIRST_PAGE: usize = 1;

/// First page past the content area of a data row.
pub const DATA_END_PAGE: usize = BIG_ROW_PAGES - NEXT_PTR_PAGES;

/// Content pages per data row.
pub const DATA_PAGES_PER_ROW: usize = DATA_END_PAGE - DATA_FIRST_PAGE;

/// Largest device: 16 MiB of 64 KiB rows, minus the meta rows.
pub const MAX_BIG_ROWS: usize = 256;
pub const MAX_DATA_ROWS: usize = MAX_BIG_ROWS - META_ROWS;

/// Bytes at the start of a meta entry reserved for the NUL-terminated name.
pub const NAME_AREA: usize = 64;
pub const MAX_NAME_LEN: usize = NAME_AREA - 1;

/// One meta log record (little-endian u32).
pub const RECORD_SIZE: usize = 4;
pub const RECORDS_PER_ENTRY: usize = (PAGE_SIZE - NAME_AREA) / RECORD_SIZE;

/// Value of every byte after an erase.
pub const ERASED: u8 = 0xFF;

/// Meta slot states, as stored in the meta index page. Transitions only clear bits.
pub const SLOT_FREE: u8 = 0xFF;
pub const SLOT_PENDING: u8 = 0x7F;
pub const SLOT_LIVE: u8 = 0x3F;
pub const SLOT_DELETED: u8 = 0x00;

/// Data page states, as stored in the data row index page.
pub const PAGE_FREE: u8 = 0xFF;
pub const PAGE_USED: u8 = 0x00;

/// Terminator in the next-pointer table.
pub const NO_NEXT: u16 = 0xFFFF;
