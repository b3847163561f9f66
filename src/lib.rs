// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! snorfs: a flat, append-only, power-loss tolerant filesystem for raw SPI NOR flash.
//!
//! The filesystem owns a [`flash::SpiFlash`] device and hands out [`file::File`]
//! cursors. Files are named byte streams; content is stored as a forward-linked
//! chain of pages and every size change is an append-only record, so nothing is
//! ever rewritten in place.

#[cfg(any(test, feature = "std"))]
#[macro_use]
extern crate std;

pub mod config;
pub mod error;
pub mod types;
pub mod flash;
pub mod adapters;
pub mod fs;
pub mod file;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use error::{FsError, FsResult};
pub use file::File;
pub use flash::{FlashError, SpiFlash};
pub use fs::{Fs, FsStats};

#[cfg(any(test, feature = "std"))]
pub use sim::SimFlash;

#[cfg(test)]
pub mod tests;
