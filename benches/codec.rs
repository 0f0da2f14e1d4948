use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use railbus::protocol::codec;
use railbus::{LoopbackStream, Message};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    // Minimal broadcast (track state command).
    let small = Message::broadcast(0x48, 0, &[0x02]);
    group.throughput(Throughput::Bytes(u64::from(small.content_length())));
    group.bench_function("encode_small", |b| {
        b.iter(|| {
            black_box(codec::encode(&small));
        });
    });

    // Full payload, worst case for byte-stuffing (every byte escapes).
    let stuffed = Message::broadcast(0x30, 0, &[0xFE; 64]);
    group.throughput(Throughput::Bytes(u64::from(stuffed.content_length())));
    group.bench_function("encode_max_stuffed", |b| {
        b.iter(|| {
            black_box(codec::encode(&stuffed));
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let small_frame = codec::encode(&Message::broadcast(0x48, 0, &[0x02]));
    group.throughput(Throughput::Bytes(small_frame.len() as u64));
    group.bench_function("decode_small", |b| {
        let mut stream = LoopbackStream::new();
        b.iter(|| {
            stream.push(&small_frame);
            black_box(codec::decode(&mut stream).unwrap());
        });
    });

    let stuffed_frame = codec::encode(&Message::broadcast(0x30, 0, &[0xFE; 64]));
    group.throughput(Throughput::Bytes(stuffed_frame.len() as u64));
    group.bench_function("decode_max_stuffed", |b| {
        let mut stream = LoopbackStream::new();
        b.iter(|| {
            stream.push(&stuffed_frame);
            black_box(codec::decode(&mut stream).unwrap());
        });
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let msg = Message::broadcast(0x40, 0, &[0x03, 0x00, 0x02, 0x64, 0x10]);
    group.throughput(Throughput::Bytes(u64::from(msg.content_length())));
    group.bench_function("roundtrip_drive", |b| {
        let mut stream = LoopbackStream::new();
        b.iter(|| {
            let frame = codec::encode(&msg);
            stream.push(&frame);
            black_box(codec::decode(&mut stream).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_roundtrip);
criterion_main!(benches);
