// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Composite page identifiers: high byte = logical row, low byte = page in row.

/// A content page in the data area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PagePtr(pub u16);

impl PagePtr {
    pub const fn new(row: u8, page: u8) -> Self {
        PagePtr(((row as u16) << 8) | page as u16)
    }

    pub const fn row(&self) -> usize {
        (self.0 >> 8) as usize
    }

    pub const fn page(&self) -> usize {
        (self.0 & 0xff) as usize
    }
}

/// A meta entry page. Doubles as the file identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MetaPtr(pub u16);

impl MetaPtr {
    pub const fn new(row: u8, page: u8) -> Self {
        MetaPtr(((row as u16) << 8) | page as u16)
    }

    pub const fn row(&self) -> usize {
        (self.0 >> 8) as usize
    }

    pub const fn page(&self) -> usize {
        (self.0 & 0xff) as usize
    }
}
