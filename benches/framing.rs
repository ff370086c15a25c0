use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tetris_battle::protocol::{
    decode_envelope, encode_envelope, encode_frame, read_frame, Envelope, NextQueue,
    StateSnapshot,
};
use tetris_battle::types::{PieceKind, DEFAULT_MAX_FRAME_LEN};

fn busy_snapshot() -> StateSnapshot {
    let mut s = StateSnapshot::standard();
    for y in 10..20 {
        for x in 0..9 {
            s.set_cell(x, y, Some(PieceKind::ALL[(x + y) % 7]));
        }
    }
    s.score = 123_456;
    s.level = 9;
    s.next = NextQueue::from_kinds([PieceKind::T, PieceKind::I, PieceKind::L]);
    s.held = Some(PieceKind::S.into());
    s
}

fn bench_encode_state(c: &mut Criterion) {
    let envelope = Envelope::State(busy_snapshot());

    c.bench_function("encode_state_frame", |b| {
        b.iter(|| {
            let payload = encode_envelope(black_box(&envelope)).unwrap();
            encode_frame(&payload).unwrap()
        })
    });
}

fn bench_decode_state(c: &mut Criterion) {
    let payload = encode_envelope(&Envelope::State(busy_snapshot())).unwrap();
    let frame = encode_frame(&payload).unwrap();

    c.bench_function("decode_state_frame", |b| {
        b.iter(|| {
            let mut reader = black_box(&frame[..]);
            let payload = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).unwrap();
            decode_envelope(&payload).unwrap()
        })
    });
}

fn bench_large_frame(c: &mut Criterion) {
    let frame = encode_frame(&vec![7u8; 1_000_000]).unwrap();

    c.bench_function("read_1mb_frame", |b| {
        b.iter(|| {
            let mut reader = black_box(&frame[..]);
            read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_state,
    bench_decode_state,
    bench_large_frame
);
criterion_main!(benches);
