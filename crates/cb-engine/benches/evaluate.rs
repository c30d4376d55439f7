use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cb_core::types::{Request, RequestType};
use cb_engine::{ContentBlockingManager, ProfileMetadata, ProfileSource, ProfileStore};

fn synthetic_list(rules: usize) -> String {
    let mut text = String::from("[Adblock Plus 2.0]\n! Title: Synthetic\n");
    for i in 0..rules {
        match i % 5 {
            0 => text.push_str(&format!("||ads{i}.example.com^\n")),
            1 => text.push_str(&format!("/banner{i}/*$image\n")),
            2 => text.push_str(&format!("||tracker{i}.net^$third-party,script\n")),
            3 => text.push_str(&format!("@@||ads{}.example.com/allowed{i}.js\n", i - 3)),
            _ => text.push_str(&format!("example{i}.com##.ad-slot-{i}\n")),
        }
    }
    text
}

fn bench_evaluate(c: &mut Criterion) {
    let store = Arc::new(ProfileStore::new());
    store
        .add_profile(ProfileSource {
            metadata: ProfileMetadata::new("synthetic"),
            text: synthetic_list(20_000),
        })
        .expect("synthetic list loads");
    let manager = ContentBlockingManager::new(store, 256);

    let requests = [
        Request::new("https://ads500.example.com/a.js", "https://news.site/", RequestType::SCRIPT),
        Request::new("https://cdn.site/banner501/x.png", "https://news.site/", RequestType::IMAGE),
        Request::new("https://ads500.example.com/allowed503.js", "https://news.site/", RequestType::SCRIPT),
        Request::new("https://static.site/app.js", "https://news.site/", RequestType::SCRIPT),
    ];

    c.bench_function("evaluate_mixed", |b| {
        b.iter(|| {
            for request in &requests {
                black_box(manager.evaluate(black_box(request)));
            }
        })
    });

    c.bench_function("cosmetic_selectors_cached", |b| {
        b.iter(|| black_box(manager.cosmetic_selectors_for(black_box("www.example504.com"))))
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
