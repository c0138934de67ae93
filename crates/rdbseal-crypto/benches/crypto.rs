use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rdbseal_crypto::{CipherEngine, ChunkedStreamProcessor, Framing};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn engine() -> CipherEngine {
    CipherEngine::from_base64(STANDARD.encode([0xABu8; 32]))
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encode_package(bencher: divan::Bencher, size: usize) {
    let session = engine().session().unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| rdbseal_crypto::encode_package(divan::black_box(&session), divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decode_package(bencher: divan::Bencher, size: usize) {
    let session = engine().session().unwrap();
    let data = make_data(size);
    let blob = rdbseal_crypto::encode_package(&session, &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| rdbseal_crypto::decode_package(divan::black_box(&session), divan::black_box(&blob)).unwrap());
}

#[divan::bench(args = [Framing::Split, Framing::Package, Framing::PackageFitted])]
fn bench_stream_4mib(bencher: divan::Bencher, framing: Framing) {
    let size = 4 * 1024 * 1024;
    let processor = ChunkedStreamProcessor::new(engine());
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + size / 64);
            processor
                .encrypt(framing, Cursor::new(divan::black_box(&data)), &mut out)
                .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
