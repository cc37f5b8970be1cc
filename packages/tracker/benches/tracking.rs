use criterion::{black_box, criterion_group, criterion_main, Criterion};
use redline_document::builders::*;
use redline_document::Node;
use redline_tracker::{discover, set_status, track, Status, TrackConfig, TrackContext};
use redline_transform::Transform;

fn long_document(paragraphs: usize) -> Node {
    let body: Vec<Node> = (0..paragraphs)
        .map(|i| p(&format!("Paragraph {} of the benchmark document.", i)))
        .collect();
    doc(body)
}

fn track_typing(c: &mut Criterion) {
    let start = long_document(50);
    let config = TrackConfig::new("alice");

    c.bench_function("track_typing", |b| {
        b.iter(|| {
            let mut tr = Transform::new(start.clone());
            for offset in 0..10 {
                tr.insert_text(2 + offset, "x").unwrap();
            }
            let mut ctx = TrackContext::deterministic("alice", "b", 0);
            track(black_box(&tr), &config, &mut ctx).unwrap()
        })
    });
}

fn track_block_deletion(c: &mut Criterion) {
    let start = long_document(50);
    let config = TrackConfig::new("alice");
    let end = start.content().size();

    c.bench_function("track_block_deletion", |b| {
        b.iter(|| {
            let mut tr = Transform::new(start.clone());
            tr.delete(0, end / 2).unwrap();
            let mut ctx = TrackContext::deterministic("alice", "b", 0);
            track(black_box(&tr), &config, &mut ctx).unwrap()
        })
    });
}

fn discover_and_accept(c: &mut Criterion) {
    let start = long_document(50);
    let mut tr = Transform::new(start.clone());
    for offset in 0..10 {
        tr.insert_text(2 + offset * 3, "x").unwrap();
    }
    let mut ctx = TrackContext::deterministic("alice", "b", 0);
    let tracked = track(&tr, &TrackConfig::new("alice"), &mut ctx).unwrap();
    let edited = tracked.doc().clone();

    c.bench_function("discover_changes", |b| {
        b.iter(|| discover(black_box(&edited)))
    });

    c.bench_function("accept_all_changes", |b| {
        b.iter(|| {
            let changes = discover(&edited);
            let ids: Vec<&str> = changes.flatten().into_iter().map(|c| c.id.as_str()).collect();
            set_status(black_box(&edited), &changes, &ids, Status::Accepted, &ctx).unwrap()
        })
    });
}

criterion_group!(benches, track_typing, track_block_deletion, discover_and_accept);
criterion_main!(benches);
