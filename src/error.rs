// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

use crate::flash::FlashError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("flash device error: {0}")]
    Flash(#[from] FlashError),

    /// No free meta or data page left. Nothing durable was changed.
    #[error("no free page available")]
    NoSpace,

    /// A next pointer or chain head references an invalid page, the chain ends
    /// before the recorded size, or an append target is no longer erased.
    #[error("corrupt page chain at {0:#06x}")]
    CorruptChain(u16),

    #[error("corrupt meta data")]
    CorruptMeta,

    #[error("file deleted")]
    FileDeleted,

    #[error("invalid file name")]
    InvalidName,

    #[error("unsupported flash geometry: {0} pages")]
    UnsupportedGeometry(u32),

    /// The filesystem is already in use by an overlapping operation.
    #[error("filesystem busy")]
    Busy,
}

pub type FsResult<T> = core::result::Result<T, FsError>;
pub type Result<T> = FsResult<T>;
