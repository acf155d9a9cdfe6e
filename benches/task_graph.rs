use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use research_swarm::domain::models::{Task, TaskGraph, TaskKind};

/// One root fanning out to `width` independent tasks that all feed a sink.
fn wide_graph(width: usize) -> TaskGraph {
    let mut tasks = vec![Task::new("root", TaskKind::Retrieval, "root")];
    for i in 0..width {
        tasks.push(Task::new(format!("w{i}"), TaskKind::Discourse, format!("q{i}")).depends_on("root"));
    }
    tasks.push(
        Task::new("sink", TaskKind::Verification, "sink")
            .with_dependencies((0..width).map(|i| format!("w{i}"))),
    );
    TaskGraph::from_tasks(tasks).unwrap()
}

/// A single chain of `depth` tasks.
fn deep_graph(depth: usize) -> TaskGraph {
    let tasks = (0..depth).map(|i| {
        let task = Task::new(format!("d{i}"), TaskKind::Retrieval, format!("q{i}"));
        if i == 0 {
            task
        } else {
            task.depends_on(format!("d{}", i - 1))
        }
    });
    TaskGraph::from_tasks(tasks).unwrap()
}

fn bench_layers(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_layers");

    for size in [10, 100, 1000] {
        let wide = wide_graph(size);
        group.bench_with_input(BenchmarkId::new("wide", size), &wide, |b, graph| {
            b.iter(|| black_box(graph.get_topological_layers().unwrap()));
        });

        let deep = deep_graph(size);
        group.bench_with_input(BenchmarkId::new("deep", size), &deep, |b, graph| {
            b.iter(|| black_box(graph.get_topological_layers().unwrap()));
        });
    }

    group.finish();
}

fn bench_ready_tasks(c: &mut Criterion) {
    let graph = wide_graph(1000);
    c.bench_function("ready_tasks_wide_1000", |b| {
        b.iter(|| black_box(graph.get_ready_tasks().len()));
    });
}

criterion_group!(benches, bench_layers, bench_ready_tasks);
criterion_main!(benches);
