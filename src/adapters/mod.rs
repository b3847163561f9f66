// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bridges from other flash abstractions to [`crate::flash::SpiFlash`].

pub mod nor_flash;

pub use nor_flash::NorFlashDevice;
