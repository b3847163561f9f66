// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Raw flash device interface.

use thiserror::Error;

use crate::config::PAGE_SIZE;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("address out of bounds")]
    OutOfBounds,
    #[error("address not aligned to the erase unit")]
    NotAligned,
    #[error("program crosses a page boundary")]
    PageBoundary,
    #[error("device failure")]
    Device,
}

/// A SPI NOR chip as seen by the filesystem.
///
/// `program` may only clear bits relative to the current content; setting bits
/// requires an erase of the enclosing row. All calls block until the device is
/// idle again.
pub trait SpiFlash {
    /// Total number of `PAGE_SIZE` pages on the device.
    fn num_pages(&self) -> u32;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Programs `data` at `addr`. The range never crosses a page boundary.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erases the small row (sector) containing `addr`.
    fn erase_small_row(&mut self, addr: u32) -> Result<(), FlashError>;

    /// Erases the big row (block) containing `addr`.
    fn erase_big_row(&mut self, addr: u32) -> Result<(), FlashError>;

    /// Size in bytes. Saturates for parts beyond the 32-bit address space.
    fn capacity(&self) -> u32 {
        self.num_pages().saturating_mul(PAGE_SIZE as u32)
    }
}

impl<T: SpiFlash + ?Sized> SpiFlash for &mut T {
    fn num_pages(&self) -> u32 {
        (**self).num_pages()
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(addr, buf)
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).program(addr, data)
    }

    fn erase_small_row(&mut self, addr: u32) -> Result<(), FlashError> {
        (**self).erase_small_row(addr)
    }

    fn erase_big_row(&mut self, addr: u32) -> Result<(), FlashError> {
        (**self).erase_big_row(addr)
    }

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }
}
