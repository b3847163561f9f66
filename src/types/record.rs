// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Meta log records and slot states.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::{RECORD_SIZE, SLOT_DELETED, SLOT_FREE, SLOT_LIVE, SLOT_PENDING};
use crate::error::{FsError, Result};
use crate::types::ptr::PagePtr;

const HEAD_TAG: u32 = 0x8000_0000;
const ERASED_RECORD: u32 = 0xFFFF_FFFF;

/// One entry of the append-only log that follows the name in a meta entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaRecord {
    /// New total file size. A size of 0 also drops the chain head.
    Size(u32),
    /// New first page of the chain.
    Head(PagePtr),
}

impl MetaRecord {
    pub const MAX_SIZE: u32 = HEAD_TAG - 1;

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let raw = match *self {
            MetaRecord::Size(n) => n & !HEAD_TAG,
            MetaRecord::Head(ptr) => HEAD_TAG | ptr.0 as u32,
        };
        let mut out = [0u8; RECORD_SIZE];
        LittleEndian::write_u32(&mut out, raw);
        out
    }

    /// Decodes one record. `Ok(None)` marks the erased end of the log.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < RECORD_SIZE {
            return Err(FsError::CorruptMeta);
        }
        let raw = LittleEndian::read_u32(bytes);
        if raw == ERASED_RECORD {
            return Ok(None);
        }
        if raw & HEAD_TAG == 0 {
            return Ok(Some(MetaRecord::Size(raw)));
        }
        if raw & 0x7FFF_0000 != 0 {
            return Err(FsError::CorruptMeta);
        }
        Ok(Some(MetaRecord::Head(PagePtr(raw as u16))))
    }
}

/// State of a meta slot, one byte per page in the meta index page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Pending,
    Live,
    Deleted,
}

impl SlotState {
    /// Anything that is not a known marker counts as deleted: the slot is
    /// neither reusable (bits are cleared) nor trustworthy.
    pub fn from_byte(b: u8) -> Self {
        match b {
            SLOT_FREE => SlotState::Free,
            SLOT_PENDING => SlotState::Pending,
            SLOT_LIVE => SlotState::Live,
            _ => SlotState::Deleted,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SlotState::Free => SLOT_FREE,
            SlotState::Pending => SLOT_PENDING,
            SlotState::Live => SLOT_LIVE,
            SlotState::Deleted => SLOT_DELETED,
        }
    }
}
