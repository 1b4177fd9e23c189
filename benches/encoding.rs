use bacnet_mstp::datalink::mstp::crc::{data_crc16, header_crc_byte};
use bacnet_mstp::datalink::mstp::MstpFrame;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn header_crc_benchmark(c: &mut Criterion) {
    let header = [0x05u8, 0x7F, 0x01, 0x00, 0x64];
    c.bench_function("header_crc_byte", |b| {
        b.iter(|| header_crc_byte(black_box(&header)))
    });
}

fn data_crc_benchmark(c: &mut Criterion) {
    let data = vec![0xABu8; 256];
    c.bench_function("data_crc16_256b", |b| {
        b.iter(|| data_crc16(black_box(&data)))
    });
}

fn frame_encode_benchmark(c: &mut Criterion) {
    let frame = MstpFrame::bacnet_data(0x7F, 0x01, vec![0x42; 128], true).unwrap();
    c.bench_function("frame_encode_128b", |b| b.iter(|| black_box(frame.encode())));
}

fn frame_decode_benchmark(c: &mut Criterion) {
    let frame = MstpFrame::bacnet_data(0x7F, 0x01, vec![0x42; 128], true).unwrap();
    let encoded = frame.encode();
    c.bench_function("frame_decode_128b", |b| {
        b.iter(|| black_box(MstpFrame::decode(black_box(&encoded)).unwrap()))
    });
}

criterion_group!(
    benches,
    header_crc_benchmark,
    data_crc_benchmark,
    frame_encode_benchmark,
    frame_decode_benchmark
);
criterion_main!(benches);
