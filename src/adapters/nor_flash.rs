// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! `embedded-storage` NOR driver adapter.
//!
//! Any HAL driver implementing `MultiwriteNorFlash` can back the filesystem,
//! provided it programs single bytes and its erase unit divides a small row.
//! Slot markers are rewritten in place (bits only ever cleared), hence the
//! multiwrite bound.

use embedded_storage::nor_flash::{
    MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::config::{BIG_ROW_SIZE, PAGE_SIZE, SMALL_ROW_SIZE};
use crate::flash::{FlashError, SpiFlash};

pub struct NorFlashDevice<N> {
    inner: N,
}

impl<N: MultiwriteNorFlash> NorFlashDevice<N> {
    pub fn new(inner: N) -> Result<Self, FlashError> {
        let erase = N::ERASE_SIZE as u32;
        if N::READ_SIZE != 1 || N::WRITE_SIZE != 1 || erase == 0 || SMALL_ROW_SIZE % erase != 0 {
            return Err(FlashError::NotAligned);
        }
        Ok(Self { inner })
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn into_inner(self) -> N {
        self.inner
    }

    fn erase_row(&mut self, addr: u32, size: u32) -> Result<(), FlashError> {
        if addr % size != 0 {
            return Err(FlashError::NotAligned);
        }
        let end = addr.checked_add(size).ok_or(FlashError::OutOfBounds)?;
        self.inner.erase(addr, end).map_err(map_err)
    }
}

fn map_err<E: NorFlashError>(e: E) -> FlashError {
    match e.kind() {
        NorFlashErrorKind::NotAligned => FlashError::NotAligned,
        NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
        _ => FlashError::Device,
    }
}

impl<N: MultiwriteNorFlash> SpiFlash for NorFlashDevice<N> {
    fn num_pages(&self) -> u32 {
        (self.inner.capacity() / PAGE_SIZE) as u32
    }

    fn capacity(&self) -> u32 {
        u32::try_from(self.inner.capacity()).unwrap_or(u32::MAX)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.inner.read(addr, buf).map_err(map_err)
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if addr as usize % PAGE_SIZE + data.len() > PAGE_SIZE {
            return Err(FlashError::PageBoundary);
        }
        self.inner.write(addr, data).map_err(map_err)
    }

    fn erase_small_row(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase_row(addr, SMALL_ROW_SIZE)
    }

    fn erase_big_row(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase_row(addr, BIG_ROW_SIZE)
    }
}
