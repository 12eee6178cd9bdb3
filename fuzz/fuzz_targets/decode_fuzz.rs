#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use oxirdb::rdb::{Decoder, NullSink};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the decoder, only return errors.
    let _ = Decoder::new(Bytes::copy_from_slice(data), NullSink).decode_all();

    // Also fuzz the container path by prefixing a valid header.
    let mut image = b"REDIS0009".to_vec();
    image.extend_from_slice(data);
    let _ = Decoder::new(Bytes::from(image), NullSink).decode_all();
});
