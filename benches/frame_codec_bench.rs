// Frame codec benchmarks: encode/decode cost across body sizes and the
// streaming decode path a connection's reader task drives on every byte
// that arrives off the socket.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ringql::protocol::{Frame, FrameFlags, OpCode, ProtocolVersion};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for body_size in [0usize, 256, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(body_size), &body_size, |b, &body_size| {
            let frame = Frame::request(ProtocolVersion::V4, 1, OpCode::Query, FrameFlags::default(), vec![0u8; body_size]);
            b.iter(|| {
                let mut buf = BytesMut::new();
                frame.encode(&mut buf);
                black_box(buf);
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for body_size in [0usize, 256, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(body_size), &body_size, |b, &body_size| {
            let frame = Frame::request(ProtocolVersion::V4, 1, OpCode::Query, FrameFlags::default(), vec![0u8; body_size]);
            let mut encoded = BytesMut::new();
            frame.encode(&mut encoded);

            b.iter(|| {
                let mut buf = encoded.clone();
                let decoded = Frame::try_decode(&mut buf).unwrap();
                black_box(decoded);
            });
        });
    }

    group.finish();
}

fn bench_decode_fragmented_stream(c: &mut Criterion) {
    c.bench_function("frame_decode_fragmented_stream", |b| {
        let frame = Frame::request(ProtocolVersion::V4, 1, OpCode::Query, FrameFlags::default(), vec![0u8; 4096]);
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded);
        let chunks: Vec<Vec<u8>> = encoded.chunks(64).map(|c| c.to_vec()).collect();

        b.iter(|| {
            let mut buf = BytesMut::new();
            let mut decoded = None;
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
                if let Some(frame) = Frame::try_decode(&mut buf).unwrap() {
                    decoded = Some(frame);
                    break;
                }
            }
            black_box(decoded);
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_decode_fragmented_stream);
criterion_main!(benches);
