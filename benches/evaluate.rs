use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use stream_regex::watch::evaluate;
use stream_regex::{
    AutomationId, ChatBuffer, EngineConfig, GenerationState, InMemorySettingsStore, RuleSet,
    StreamRegexEngine,
};

fn make_rules(count: usize) -> RuleSet {
    let mut rules = RuleSet::new();
    // Mix of patterns that mostly miss so evaluation walks every rule.
    for i in 0..count {
        let pattern = match i % 4 {
            0 => format!(r"/marker{i}\b/"),
            1 => format!("/^chapter {i}$/m"),
            2 => format!("/token-{i}/i"),
            _ => r"/\n\n/".to_string(),
        };
        rules
            .add(None, &pattern, AutomationId::from(format!("QR{i}")))
            .unwrap();
    }
    rules
}

fn streamed_text(len: usize) -> String {
    "The quick brown fox jumps over the lazy dog. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.throughput(Throughput::Elements(1));

    for &count in &[1usize, 16, 64] {
        let rules = make_rules(count);
        let text = streamed_text(4096);
        group.bench_function(format!("rules_{count}_text_4k"), |b| {
            b.iter(|| evaluate(black_box(&text), black_box(&rules)));
        });
    }
    group.finish();
}

fn bench_intercepted_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("intercepted_write");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_with_16_rules", |b| {
        b.iter_custom(|iters| {
            let engine = StreamRegexEngine::new(
                EngineConfig::default(),
                Arc::new(InMemorySettingsStore::new()),
            )
            .unwrap();
            for (i, rule) in make_rules(16).iter().enumerate() {
                engine
                    .rules()
                    .add(
                        Some(format!("r{i}").into()),
                        &rule.pattern.spec().to_string(),
                        rule.automation_id.clone(),
                    )
                    .unwrap();
            }

            let flag = Arc::new(GenerationState::new());
            let chat = Arc::new(ChatBuffer::new());
            chat.push("");
            let _events = engine.subscribe();
            let mut watcher = engine.watcher(flag.clone(), chat.clone());
            flag.start();
            watcher.poll_once();

            let mut text = String::new();
            let start = Instant::now();
            for i in 0..iters {
                text.push_str(if i % 32 == 31 { "\n\n" } else { "word " });
                chat.set_text(0, text.clone());
            }
            start.elapsed()
        })
    });
    group.finish();
}

criterion_group!(evaluate_benches, bench_evaluate, bench_intercepted_write);
criterion_main!(evaluate_benches);
