use criterion::{black_box, criterion_group, criterion_main, Criterion};

use feedgate_core::{encode_record, validate_record, Content, Keypair, RecordBuilder};

fn bench_validate(c: &mut Criterion) {
    let keypair = Keypair::from_seed(&[0x42; 32]);
    let pk = keypair.public_key();

    let first = RecordBuilder::new(pk, 1)
        .timestamp(1000)
        .content(Content::init(&pk))
        .sign(&keypair);
    let second = RecordBuilder::new(pk, 2)
        .previous(first.compute_id())
        .timestamp(1001)
        .content(Content::new("post").with("text", "x".repeat(512)))
        .sign(&keypair);

    c.bench_function("encode_record", |b| b.iter(|| encode_record(black_box(&second))));

    c.bench_function("validate_record", |b| {
        b.iter(|| validate_record(black_box(&second), Some(&first), &pk))
    });
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
