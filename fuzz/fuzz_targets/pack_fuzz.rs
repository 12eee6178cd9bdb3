#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use oxirdb::rdb::{ListPack, ZipList};

fuzz_target!(|data: &[u8]| {
    let buf = Bytes::copy_from_slice(data);

    if let Ok(pack) = ListPack::init(buf.clone()) {
        for el in pack {
            if el.is_err() {
                break;
            }
        }
    }

    if let Ok(list) = ZipList::init(buf) {
        for el in list {
            if el.is_err() {
                break;
            }
        }
    }
});
