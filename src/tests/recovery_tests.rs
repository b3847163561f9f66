// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Power loss, rollover and on-flash corruption.

use crate::config::{DATA_PAGES_PER_ROW, NAME_AREA};
use crate::error::FsError;
use crate::flash::FlashError;
use crate::fs::Fs;
use crate::sim::SimFlash;
use crate::tests::{fresh, pattern, read_all};
use crate::types::MetaRecord;

const POWER_CUT: FsError = FsError::Flash(FlashError::Device);

/// Address of the first data big row on a 1 MiB part (phys row 0).
const DATA_ROW_0: usize = 2 * 65536;

/// Creates "a" with `data` and returns the device.
fn with_file(data: &[u8]) -> SimFlash {
    let fs = Fs::new(fresh());
    {
        let mut file = fs.open("a", true).unwrap().unwrap();
        file.append(data).unwrap();
    }
    fs.into_inner()
}

/// Creates "a" and fills its meta log with one-byte appends. Returns the
/// device and the content.
fn with_full_log() -> (SimFlash, std::vec::Vec<u8>) {
    let data = pattern(46);
    let fs = Fs::new(fresh());
    {
        let mut file = fs.open("a", true).unwrap().unwrap();
        // Size(0) from create, Head + Size, then one Size per append: 48 records
        for b in data.chunks(1) {
            file.append(b).unwrap();
        }
    }
    (fs.into_inner(), data)
}

#[test]
fn test_cut_before_entry_written() {
    let mut flash = fresh();
    flash.fail_after(1);
    {
        let fs = Fs::new(&mut flash);
        assert!(matches!(fs.open("a", true), Err(POWER_CUT)));
    }
    flash.heal();

    // Pending slot with an empty page is discarded
    let fs = Fs::new(&mut flash);
    assert!(!fs.exists("a").unwrap());
    assert_eq!(fs.stats().unwrap().free_meta_slots, 239 + 255 - 1);
    let file = fs.open("a", true).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0011);
}

#[test]
fn test_cut_before_entry_live() {
    let mut flash = fresh();
    flash.fail_after(2);
    {
        let fs = Fs::new(&mut flash);
        assert!(matches!(fs.open("a", true), Err(POWER_CUT)));
    }
    flash.heal();

    // Entry is complete, so the create is finished at mount
    let fs = Fs::new(&mut flash);
    let file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0010);
    assert_eq!(file.size(), 0);
}

#[test]
fn test_cut_before_link_leaves_orphan() {
    let data = pattern(266);
    let mut flash = with_file(&data[..256]);

    // claim, program, then the link fails
    flash.fail_after(2);
    {
        let fs = Fs::new(&mut flash);
        let mut file = fs.open("a", false).unwrap().unwrap();
        assert_eq!(file.append(&data[256..]), Err(POWER_CUT));
    }
    flash.heal();

    let fs = Fs::new(&mut flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.size(), 256);
    assert_eq!(read_all(&mut file), &data[..256]);

    // The claimed page is skipped; the link slot is still clean
    file.append(&data[256..]).unwrap();
    assert_eq!(read_all(&mut file), data);
    assert_eq!(fs.stats().unwrap().free_data_pages, 14 * DATA_PAGES_PER_ROW - 3);
}

#[test]
fn test_cut_mid_append_keeps_committed_bytes() {
    let data = pattern(900);
    let mut flash = with_file(&data[..300]);

    // Tail of page 2, then claim and program page 3; the link fails
    flash.fail_after(3);
    {
        let fs = Fs::new(&mut flash);
        let mut file = fs.open("a", false).unwrap().unwrap();
        assert_eq!(file.append(&data[300..]), Err(POWER_CUT));
    }
    flash.heal();

    let fs = Fs::new(&mut flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.size(), 300);
    assert_eq!(read_all(&mut file), &data[..300]);

    // The uncommitted tail bytes are programmed, so the chain is closed
    assert_eq!(file.append(b"more"), Err(FsError::CorruptChain(0x0002)));
}

#[test]
fn test_meta_log_rollover() {
    let fs = Fs::new(fresh());
    let data = pattern(60);
    let mut file = fs.open("rolling", true).unwrap().unwrap();
    let id = file.file_id();
    for b in data.chunks(1) {
        file.append(b).unwrap();
    }
    assert_eq!(file.file_id(), id);
    assert_eq!(read_all(&mut file), data);
    let mut name = [0u8; NAME_AREA];
    assert_eq!(file.name(&mut name).unwrap(), "rolling");
    drop(file);

    // Old slot retired, entry lives on the next one
    assert_eq!(fs.stats().unwrap().free_meta_slots, 239 + 255 - 2);
    let fs = Fs::new(fs.into_inner());
    let mut file = fs.open("rolling", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0011);
    assert_eq!(read_all(&mut file), data);
}

#[test]
fn test_rollover_on_head_record() {
    let fs = Fs::new(fresh());
    {
        let mut file = fs.open("a", true).unwrap().unwrap();
        // 1 + 2 + 44 + 1 records: the truncate fills the log
        for b in pattern(45).chunks(1) {
            file.append(b).unwrap();
        }
        file.truncate().unwrap();
        file.append(b"xy").unwrap();
        assert_eq!(read_all(&mut file), b"xy");
    }
    let fs = Fs::new(fs.into_inner());
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.size(), 2);
    assert_eq!(read_all(&mut file), b"xy");
}

#[test]
fn test_rollover_on_truncate() {
    let (flash, _) = with_full_log();
    let fs = Fs::new(flash);
    {
        let mut file = fs.open("a", false).unwrap().unwrap();
        file.overwrite(b"new").unwrap();
    }
    let fs = Fs::new(fs.into_inner());
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0011);
    assert_eq!(read_all(&mut file), b"new");
}

#[test]
fn test_cut_during_rollover_keeps_old_entry() {
    let (mut flash, data) = with_full_log();

    // data byte, pending, new page; retiring the old slot fails
    flash.fail_after(3);
    {
        let fs = Fs::new(&mut flash);
        let mut file = fs.open("a", false).unwrap().unwrap();
        assert_eq!(file.append(b"!"), Err(POWER_CUT));
    }
    flash.heal();

    let fs = Fs::new(&mut flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0010);
    assert_eq!(read_all(&mut file), data);
    assert_eq!(fs.stats().unwrap().free_meta_slots, 239 + 255 - 2);
}

#[test]
fn test_cut_during_rollover_finishes_new_entry() {
    let (mut flash, data) = with_full_log();

    // Old slot retired; marking the new one live fails
    flash.fail_after(4);
    {
        let fs = Fs::new(&mut flash);
        let mut file = fs.open("a", false).unwrap().unwrap();
        assert_eq!(file.append(b"!"), Err(POWER_CUT));
    }
    flash.heal();

    let fs = Fs::new(&mut flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0011);
    assert_eq!(file.size(), 47);
    let content = read_all(&mut file);
    assert_eq!(&content[..46], &data[..]);
    assert_eq!(content[46], b'!');
}

#[test]
fn test_broken_next_pointer() {
    let mut flash = with_file(&pattern(600));
    // Next-pointer slot of page 1, erased back to "no successor"
    let slot = DATA_ROW_0 + 65536 - 512 + 2;
    flash.bytes_mut()[slot..slot + 2].copy_from_slice(&[0xFF, 0xFF]);

    let fs = Fs::new(flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    let mut buf = [0u8; 600];
    assert_eq!(file.read(&mut buf), Err(FsError::CorruptChain(0x0001)));

    file.seek(300).unwrap();
    assert_eq!(file.read(&mut buf[..10]), Err(FsError::CorruptChain(0x0001)));
}

#[test]
fn test_next_pointer_into_unmapped_row() {
    let mut flash = with_file(&pattern(600));
    let slot = DATA_ROW_0 + 65536 - 512 + 2;
    flash.bytes_mut()[slot..slot + 2].copy_from_slice(&[0x01, 0x05]);

    let fs = Fs::new(flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    file.seek(300).unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(file.read(&mut buf), Err(FsError::CorruptChain(0x0501)));
}

#[test]
fn test_corrupt_remap() {
    // Two logical rows claiming the same physical row
    let mut flash = fresh();
    flash.bytes_mut()[0] = 0;
    flash.bytes_mut()[256] = 0;
    assert_eq!(Fs::new(flash).mount(), Err(FsError::CorruptMeta));

    // Physical row past the end of the device
    let mut flash = fresh();
    flash.bytes_mut()[0] = 14;
    assert_eq!(Fs::new(flash).mount(), Err(FsError::CorruptMeta));
}

#[test]
fn test_remap_log_last_entry_wins() {
    let mut flash = fresh();
    flash.bytes_mut()[0] = 5;
    flash.bytes_mut()[1] = 3;

    let fs = Fs::new(flash);
    {
        let mut file = fs.open("a", true).unwrap().unwrap();
        file.append(b"abc").unwrap();
    }
    assert_eq!(fs.stats().unwrap().mapped_rows, 1);

    // Logical row 0 -> phys 3 -> big row 5
    let flash = fs.into_inner();
    let page = 5 * 65536 + 256;
    assert_eq!(&flash.bytes()[page..page + 3], b"abc");
}

#[test]
fn test_corrupt_meta_record() {
    let mut flash = with_file(b"abc");
    // Records: Size(0), Head, Size(3); garbage after them
    let off = 0x1000 + 64 + 12;
    flash.bytes_mut()[off..off + 4].copy_from_slice(&[0, 0, 1, 0x80]);
    let fs = Fs::new(flash);
    assert!(matches!(fs.open("a", false), Err(FsError::CorruptMeta)));
}

#[test]
fn test_size_without_head_is_corrupt() {
    let fs = Fs::new(fresh());
    fs.open("a", true).unwrap().unwrap();
    let mut flash = fs.into_inner();
    let off = 0x1000 + 64 + 4;
    flash.bytes_mut()[off..off + 4].copy_from_slice(&MetaRecord::Size(5).encode());

    let fs = Fs::new(flash);
    assert!(matches!(fs.open("a", false), Err(FsError::CorruptMeta)));
}

#[test]
fn test_dirty_data_page_skipped() {
    let data = pattern(310);
    let mut flash = with_file(&data[..10]);
    // Page 2 reads free in the index but holds stale bits
    flash.bytes_mut()[DATA_ROW_0 + 2 * 256 + 7] = 0x00;

    let fs = Fs::new(flash);
    let mut file = fs.open("a", false).unwrap().unwrap();
    file.append(&data[10..]).unwrap();
    assert_eq!(read_all(&mut file), data);
    assert_eq!(fs.stats().unwrap().free_data_pages, 14 * DATA_PAGES_PER_ROW - 3);
}

#[test]
fn test_dirty_meta_page_retired() {
    let mut flash = fresh();
    flash.bytes_mut()[0x1000 + 100] = 0x00;

    let fs = Fs::new(flash);
    let file = fs.open("a", true).unwrap().unwrap();
    assert_eq!(file.file_id(), 0x0011);
    assert_eq!(fs.stats().unwrap().free_meta_slots, 239 + 255 - 2);
}
