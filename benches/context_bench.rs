//! Hot-path benchmarks for the context engine.
//!
//! Covers the per-turn work a host pays on every message: emotion scoring
//! (cold and cached), the LRU cache, validation, and a full manager turn.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use openpawz_context::atoms::config::{EmotionConfig, ValidationConfig};
use openpawz_context::engine::cache::TtlCache;
use openpawz_context::engine::emotion::{EmotionAnalyzer, EmotionContext};
use openpawz_context::engine::validation::ContextValidator;
use openpawz_context::{ContextEngineConfig, ContextManager, Message, SystemPolicy};

const SAMPLE_TEXTS: &[&str] = &[
    "I am very extremely happy about the concert tonight!",
    "Why does this keep failing? I'm so frustrated with it.",
    "Hmm, I'm not sure I understand how the scheduler works",
    "Remember that my sister's birthday is next week",
];

fn bench_emotion(c: &mut Criterion) {
    let mut group = c.benchmark_group("emotion");
    let ctx = EmotionContext::default();

    group.bench_function("analyze_uncached", |b| {
        let mut i = 0usize;
        b.iter(|| {
            // a fresh analyzer per call keeps every lookup a miss
            let mut analyzer = EmotionAnalyzer::new(&EmotionConfig::default());
            i = (i + 1) % SAMPLE_TEXTS.len();
            analyzer.analyze_emotional_state(black_box(SAMPLE_TEXTS[i]), &ctx)
        });
    });

    group.bench_function("analyze_cached", |b| {
        let mut analyzer = EmotionAnalyzer::new(&EmotionConfig::default());
        analyzer.analyze_emotional_state(SAMPLE_TEXTS[0], &ctx);
        b.iter(|| analyzer.analyze_emotional_state(black_box(SAMPLE_TEXTS[0]), &ctx));
    });

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    for size in [10usize, 100, 1000] {
        let cache: TtlCache<String> = TtlCache::with_capacity(size, 300);
        for i in 0..size {
            cache.set(&format!("k{}", i), format!("v{}", i), None);
        }

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, &size| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % size;
                cache.get(black_box(&format!("k{}", i)))
            });
        });

        group.bench_with_input(BenchmarkId::new("set_evict", size), &size, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i += 1;
                cache.set(black_box(&format!("new{}", i)), "x".to_string(), None);
            });
        });
    }

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut manager = ContextManager::new(ContextEngineConfig::default(), SystemPolicy::default());
    let mut context = None;
    for text in SAMPLE_TEXTS {
        context = Some(manager.process_message(Message::user(*text)));
    }
    let Some(context) = context else { return };
    let mut validator = ContextValidator::new(&ValidationConfig::default());

    c.bench_function("validate_context", |b| {
        b.iter(|| validator.validate_context(black_box(&context)))
    });
    c.bench_function("health_check", |b| {
        b.iter(|| validator.perform_health_check(black_box(&context)))
    });
}

fn bench_manager_turn(c: &mut Criterion) {
    c.bench_function("process_message", |b| {
        let mut manager =
            ContextManager::new(ContextEngineConfig::default(), SystemPolicy::default());
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            let text = format!("{} ({})", SAMPLE_TEXTS[i % SAMPLE_TEXTS.len()], i);
            manager.process_message(black_box(Message::user(text)))
        });
    });
}

criterion_group!(
    name = context_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(3));
    targets = bench_emotion, bench_cache, bench_validation, bench_manager_turn
);

criterion_main!(context_benches);
