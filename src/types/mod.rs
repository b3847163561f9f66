// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod ptr;
pub mod record;

pub use ptr::{MetaPtr, PagePtr};
pub use record::{MetaRecord, SlotState};
