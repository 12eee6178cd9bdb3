#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use oxirdb::rdb::encoder::{self, ListPackBuilder};
use oxirdb::rdb::{Decoder, ListPack, NullSink};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Chunk the input into string records and round-trip the container.
    let mut body = Vec::new();
    let mut count = 0u64;
    for chunk in data.chunks(17).take(64) {
        body.push(0x00);
        encoder::write_str(&mut body, b"k");
        encoder::write_str(&mut body, chunk);
        count += 1;
    }
    let mut image = encoder::container(9);
    image.extend_from_slice(&body);
    let image = Bytes::from(encoder::seal_container(image));
    let mut dec = Decoder::new(image, NullSink);
    dec.decode_all().unwrap();
    assert_eq!(dec.key_count(), count);

    // Same bytes through a listpack walk.
    let mut builder = ListPackBuilder::new();
    let mut pushed = 0usize;
    for chunk in data.chunks(23).take(64) {
        builder.push_str(chunk);
        pushed += 1;
    }
    let walked = ListPack::init(Bytes::from(builder.finish()))
        .unwrap()
        .map(|el| el.unwrap())
        .count();
    assert_eq!(walked, pushed);
});
