// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! RAM-backed NOR flash simulator.

// -----------------------------------------------------------------------
// Simulated SPI NOR
// -----------------------------------------------------------------------
// Behaves like the real part where it matters to the filesystem:
// - erased state is 0xFF
// - program can only clear bits (new = old & data)
// - program may not cross a page boundary
// - erases are aligned to their row size
// A power cut can be injected with `fail_after`: once the budget of
// program/erase calls is spent every further call fails with `Device`.

use std::vec::Vec;

use crate::config::{BIG_ROW_SIZE, ERASED, PAGE_SIZE, SMALL_ROW_SIZE};
use crate::flash::{FlashError, SpiFlash};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub reads: u64,
    pub programs: u64,
    pub small_erases: u64,
    pub big_erases: u64,
}

#[derive(Debug, Clone)]
pub struct SimFlash {
    data: Vec<u8>,
    counts: OpCounts,
    write_budget: Option<u64>,
}

impl SimFlash {
    /// A fully erased device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![ERASED; size],
            counts: OpCounts::default(),
            write_budget: None,
        }
    }

    pub fn with_megabytes(mb: usize) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw access for fault injection in tests. Bypasses NOR semantics.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn counts(&self) -> OpCounts {
        self.counts
    }

    /// Allows `n` more program/erase calls, then fails every later one.
    pub fn fail_after(&mut self, n: u64) {
        self.write_budget = Some(n);
    }

    /// Restores power.
    pub fn heal(&mut self) {
        self.write_budget = None;
    }

    fn spend(&mut self) -> Result<(), FlashError> {
        match self.write_budget {
            Some(0) => Err(FlashError::Device),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), FlashError> {
        if addr as usize + len > self.data.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(())
    }

    fn erase(&mut self, addr: u32, row: u32) -> Result<(), FlashError> {
        if addr % row != 0 {
            return Err(FlashError::NotAligned);
        }
        self.check_range(addr, row as usize)?;
        self.spend()?;
        let start = addr as usize;
        self.data[start..start + row as usize].fill(ERASED);
        Ok(())
    }
}

impl SpiFlash for SimFlash {
    fn num_pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_range(addr, buf.len())?;
        self.counts.reads += 1;
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.check_range(addr, data.len())?;
        let page_offset = addr as usize % PAGE_SIZE;
        if page_offset + data.len() > PAGE_SIZE {
            return Err(FlashError::PageBoundary);
        }
        self.spend()?;
        self.counts.programs += 1;
        let start = addr as usize;
        for (cell, byte) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn erase_small_row(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase(addr, SMALL_ROW_SIZE)?;
        self.counts.small_erases += 1;
        Ok(())
    }

    fn erase_big_row(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase(addr, BIG_ROW_SIZE)?;
        self.counts.big_erases += 1;
        Ok(())
    }
}
