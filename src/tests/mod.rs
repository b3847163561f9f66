pub mod recovery_tests;

use std::vec::Vec;

use crate::file::File;
use crate::flash::SpiFlash;
use crate::sim::SimFlash;

/// A blank 1 MiB part: 2 meta rows, 14 data rows.
pub(crate) fn fresh() -> SimFlash {
    SimFlash::with_megabytes(1)
}

/// Deterministic bytes that differ between neighbouring pages.
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
}

/// Full content of `file`, read from offset 0.
pub(crate) fn read_all<F: SpiFlash>(file: &mut File<'_, F>) -> Vec<u8> {
    let mut out = vec![0u8; file.size() as usize];
    file.seek(0).unwrap();
    let n = file.read(&mut out).unwrap();
    assert_eq!(n, out.len());
    out
}
