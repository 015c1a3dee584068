use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recdissect::binary::ByteSource;
use recdissect::frame::find_frame_end;
use recdissect::packet::PacketLog;
use recdissect::{RecFile, FILE_MAGIC, TRAILER_SIGNATURE};

fn encode_string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

fn synthetic_rec(packets: u32) -> Vec<u8> {
    let mut out = FILE_MAGIC.to_vec();
    out.extend(encode_string("Y8S4"));
    out.extend([0u8; 8]);
    out.extend(64u64.to_le_bytes());
    for i in 0..64 {
        out.extend(encode_string(&format!("key{}", i)));
        out.extend(encode_string(&format!("value{}", i)));
    }
    out.extend((packets + 1).to_le_bytes());
    out.extend([0u8; 12]);
    for id in 0..packets {
        out.extend(id.to_le_bytes());
        out.extend([0u8; 4]);
        out.extend((id * 16).to_le_bytes());
    }
    out.extend([0u8; 8]);
    out
}

fn bench_walk(c: &mut Criterion) {
    let data = synthetic_rec(100_000);

    c.bench_function("walk_100k_packets", |b| {
        b.iter(|| {
            let mut log = PacketLog::new();
            RecFile::read(&mut ByteSource::new(black_box(&data[..])), 1, &mut log).unwrap()
        })
    });
}

fn bench_frame_scan(c: &mut Criterion) {
    let payload: Vec<u8> = (0..1_000_000u32).flat_map(|i| (i % 4093).to_le_bytes()).collect();
    let mut raw = zstd::encode_all(&payload[..], 3).unwrap();
    raw.extend(TRAILER_SIGNATURE);

    c.bench_function("frame_end_4mb", |b| b.iter(|| find_frame_end(black_box(&raw)).unwrap()));
}

criterion_group!(benches, bench_walk, bench_frame_scan);
criterion_main!(benches);
