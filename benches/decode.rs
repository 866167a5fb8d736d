use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nfstop::collector::Collector;
use nfstop::nfs::Decoder;
use nfstop::stream::{Direction, TransportEvent};

#[path = "../src/testutil.rs"]
mod testutil;

use testutil::CallBuilder;

fn event() -> TransportEvent {
    TransportEvent {
        timestamp: chrono::Utc::now(),
        src: "10.1.1.1:700".parse().unwrap(),
        dst: "10.1.1.2:2049".parse().unwrap(),
        direction: Direction::Forward,
    }
}

fn decode_benchmark(c: &mut Criterion) {
    let stream: Vec<u8> = (0..256u32)
        .flat_map(|xid| CallBuilder::nfs3(xid, 6).uid(1000).gids(&[10, 20, 30]).record())
        .collect();
    let event = event();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("nfs3_calls_one_segment", |b| {
        let mut decoder = Decoder::default();
        b.iter(|| {
            let mut buf = stream.clone();
            let mut collector = Collector::new();
            decoder.decode(&mut buf, &event, &mut collector);
            black_box(collector.len())
        })
    });

    group.bench_function("nfs3_calls_1500_byte_segments", |b| {
        let mut decoder = Decoder::default();
        b.iter(|| {
            let mut buf = Vec::new();
            let mut collector = Collector::new();
            for chunk in stream.chunks(1448) {
                buf.extend_from_slice(chunk);
                decoder.decode(&mut buf, &event, &mut collector);
            }
            black_box(collector.len())
        })
    });

    group.finish();
}

criterion_group!(benches, decode_benchmark);
criterion_main!(benches);
