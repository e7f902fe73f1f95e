//! Benchmark for request classification
//!
//! Every intercepted request is classified before a strategy runs, so the
//! route table walk sits on the hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use offline_cache_worker::{
    FetchRequest, HttpNetworkClient, LoggingNotificationSurface, MemoryCacheStore, Method,
    OfflineWorker, WorkerConfig,
};
use std::sync::Arc;

fn build_worker() -> OfflineWorker {
    let config = WorkerConfig {
        origin: "https://app.test".to_string(),
        ..Default::default()
    };
    let network = HttpNetworkClient::new().expect("client");
    OfflineWorker::new(
        config,
        Arc::new(MemoryCacheStore::new()),
        Arc::new(network),
        Arc::new(LoggingNotificationSurface::new()),
    )
    .expect("worker")
}

fn sample_requests() -> Vec<FetchRequest> {
    vec![
        FetchRequest::get("https://app.test/api/symptoms?day=3").expect("api"),
        FetchRequest::get("https://images.unsplash.com/photo-123").expect("image"),
        FetchRequest::navigate("https://app.test/calendar").expect("navigation"),
        FetchRequest::get("https://app.test/assets/app.4f2c.js").expect("script"),
        FetchRequest::get("https://fonts.gstatic.com/s/inter.woff2").expect("font"),
        FetchRequest::get("https://app.test/manifest").expect("unmatched"),
        FetchRequest::new(Method::Post, "https://app.test/api/symptoms").expect("write"),
    ]
}

fn bench_classify(c: &mut Criterion) {
    let worker = build_worker();
    let requests = sample_requests();

    let mut group = c.benchmark_group("dispatcher");
    group.throughput(Throughput::Elements(requests.len() as u64));

    group.bench_function("classify_mixed", |b| {
        b.iter(|| {
            for request in &requests {
                black_box(worker.dispatcher().classify(black_box(request)));
            }
        });
    });

    group.finish();
}

fn bench_cache_key(c: &mut Criterion) {
    let request = FetchRequest::get("https://app.test/api/cycles?from=2024-01-01&to=2024-02-01")
        .expect("request");

    c.bench_function("request_cache_key", |b| {
        b.iter(|| black_box(request.cache_key()));
    });
}

criterion_group!(benches, bench_classify, bench_cache_key);
criterion_main!(benches);
