use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use stembot::embeddings::chunking::{ChunkingConfig, ChunkingStrategy, chunk_text};

fn lecture_notes() -> String {
    (0..2_000)
        .map(|i| match i % 4 {
            0 => format!("Section {}: conservation of energy", i / 4),
            1 => "The total energy of an isolated system remains constant over time.".to_string(),
            2 => String::new(),
            _ => "ΔU = Q − W relates internal energy, heat and work.".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = lecture_notes();

    let lines = ChunkingConfig::default();
    c.bench_function("chunking_lines", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&lines)))
    });

    let fixed = ChunkingConfig {
        strategy: ChunkingStrategy::FixedWidth,
        ..ChunkingConfig::default()
    };
    c.bench_function("chunking_fixed_width", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&fixed)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
