// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Geometry and directory manager.
//!
//! `Fs` is the public handle. All state lives in `FsCore`, behind a `RefCell`
//! so that several `File` cursors can share one manager on a single execution
//! context. `FsCore` methods are crate-private: address translation and page
//! allocation are only for the file cursor.

use core::cell::{RefCell, RefMut};

use heapless::Vec;
use log::debug;

use crate::config::{DATA_PAGES_PER_ROW, MAX_DATA_ROWS, MAX_NAME_LEN, META_ROWS, PAGE_SIZE};
use crate::error::{FsError, Result};
use crate::file::File;
use crate::flash::SpiFlash;

pub(crate) mod alloc;
pub(crate) mod layout;
pub(crate) mod meta;
pub(crate) mod mount;

/// Space accounting snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub data_rows: usize,
    pub mapped_rows: usize,
    pub free_data_pages: usize,
    pub free_meta_slots: usize,
}

pub(crate) struct FsCore<F> {
    pub(crate) flash: F,
    /// The one page-sized scratch buffer shared by every I/O path.
    pub(crate) buf: [u8; PAGE_SIZE],
    pub(crate) mounted: bool,
    pub(crate) num_data_rows: usize,
    /// Logical data row -> physical data row (big row minus `META_ROWS`).
    pub(crate) row_remap: Vec<Option<u8>, MAX_DATA_ROWS>,
    pub(crate) data_free: Vec<u8, MAX_DATA_ROWS>,
    pub(crate) meta_free: [u8; META_ROWS],
}

impl<F: SpiFlash> FsCore<F> {
    fn new(flash: F) -> Self {
        Self {
            flash,
            buf: [0u8; PAGE_SIZE],
            mounted: false,
            num_data_rows: 0,
            row_remap: Vec::new(),
            data_free: Vec::new(),
            meta_free: [0; META_ROWS],
        }
    }

    pub(crate) fn stats(&self) -> FsStats {
        let mut stats = FsStats {
            data_rows: self.num_data_rows,
            ..FsStats::default()
        };
        for (mapping, free) in self.row_remap.iter().zip(self.data_free.iter()) {
            match mapping {
                Some(_) => {
                    stats.mapped_rows += 1;
                    stats.free_data_pages += *free as usize;
                }
                None => stats.free_data_pages += DATA_PAGES_PER_ROW,
            }
        }
        stats.free_meta_slots = self.meta_free.iter().map(|&n| n as usize).sum();
        stats
    }

    fn dump(&self) {
        debug!(
            "snorfs: {} data rows, remap size {}, meta free {:?}",
            self.num_data_rows,
            self.remap_size(),
            self.meta_free
        );
        for (row, (mapping, free)) in self.row_remap.iter().zip(self.data_free.iter()).enumerate() {
            if let Some(phys) = mapping {
                debug!("snorfs:   row {} -> phys {} ({} free)", row, *phys as usize + META_ROWS, free);
            }
        }
    }
}

/// A filesystem bound to one flash device.
pub struct Fs<F: SpiFlash> {
    core: RefCell<FsCore<F>>,
}

impl<F: SpiFlash> Fs<F> {
    /// Binds the device. Nothing is read until the first `mount` or `open`.
    pub fn new(flash: F) -> Self {
        Self {
            core: RefCell::new(FsCore::new(flash)),
        }
    }

    pub(crate) fn core(&self) -> Result<RefMut<'_, FsCore<F>>> {
        self.core.try_borrow_mut().map_err(|_| FsError::Busy)
    }

    /// Rebuilds the in-memory tables from flash. Runs once; later calls are no-ops.
    pub fn mount(&self) -> Result<()> {
        self.core()?.mount()
    }

    /// Opens `name`. Returns `Ok(None)` if it does not exist and `create` is false.
    pub fn open(&self, name: &str, create: bool) -> Result<Option<File<'_, F>>> {
        let name = validate_name(name)?;
        let mut core = self.core()?;
        core.mount()?;

        let meta = match core.find_meta_entry(name)? {
            Some(meta) => meta,
            None if create => core.create_meta_page(name)?,
            None => return Ok(None),
        };
        let log = core.load_meta_log(meta)?;
        Ok(Some(File::new(self, meta, log)))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        let mut core = self.core()?;
        core.mount()?;
        Ok(core.find_meta_entry(name)?.is_some())
    }

    /// Erases the whole device. Needs exclusive access, so no cursor can be open.
    pub fn format(&mut self) -> Result<()> {
        self.core.get_mut().format()
    }

    pub fn stats(&self) -> Result<FsStats> {
        let mut core = self.core()?;
        core.mount()?;
        Ok(core.stats())
    }

    /// Logs geometry, remap table and free counters at debug level.
    pub fn dump(&self) -> Result<()> {
        let mut core = self.core()?;
        core.mount()?;
        core.dump();
        Ok(())
    }

    /// Hands the device back.
    pub fn into_inner(self) -> F {
        self.core.into_inner().flash
    }
}

fn validate_name(name: &str) -> Result<&[u8]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.contains(&0) {
        return Err(FsError::InvalidName);
    }
    Ok(bytes)
}
