use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ekg_builder::config::AggregationPolicy;
use ekg_builder::discovery::{count_class_pairs, select_class_edges, DfThresholds};
use ekg_builder::gateway::StatementExecutor;
use ekg_builder::graph::{EdgeType, GraphStore, Label, NodeId, PropertyMap, PropertyValue};
use ekg_builder::query::{DfAggregation, Statement};

const CLASSES: u64 = 20;

/// One resource per 50 events, events cycling through the activity classes
fn event_graph(events: u64) -> GraphStore {
    let mut store = GraphStore::new();
    let classes: Vec<NodeId> = (0..CLASSES).map(|_| store.create_node("Activity")).collect();

    let mut previous: Option<(NodeId, NodeId)> = None;
    for i in 0..events {
        if i % 50 == 0 {
            previous = None;
        }
        let resource = match previous {
            Some((_, resource)) => resource,
            None => store.create_node("Resource"),
        };
        let event = store.create_node("Event");
        store.create_edge(event, resource, "CORR").unwrap();
        let class = classes[((i * 7 + i / 3) % CLASSES) as usize];
        store.create_edge(class, event, "OBSERVED").unwrap();

        if let Some((prev, _)) = previous {
            let mut props = PropertyMap::new();
            props.insert("entityType".to_string(), PropertyValue::from("Resource"));
            store.create_edge_with_properties(prev, event, "DF", props).unwrap();
        }
        previous = Some((event, resource));
    }
    store
}

fn aggregation(df_threshold: u64, relative_df_threshold: f64) -> Statement {
    Statement::AggregateDf(DfAggregation {
        entity_type: "Resource".to_string(),
        entity_label: Label::new("Resource"),
        df_label: EdgeType::new("DF"),
        dfc_label: EdgeType::new("DF_C"),
        event_label: Label::new("Event"),
        class_label: Label::new("Activity"),
        corr_type: EdgeType::new("CORR"),
        class_type: None,
        df_threshold,
        relative_df_threshold,
        exclude_self_loops: true,
        policy: AggregationPolicy::Overwrite,
    })
}

/// Benchmark class-level aggregation over the in-memory store
fn bench_aggregate_df(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_df");

    for size in [1_000u64, 10_000].iter() {
        let mut store = event_graph(*size);
        for (name, statement) in [("threshold_free", aggregation(0, 0.0)), ("threshold", aggregation(5, 1.5))] {
            group.bench_with_input(BenchmarkId::new(name, size), size, |b, _| {
                b.iter(|| {
                    let rows = StatementExecutor::new(&mut store).execute(&statement).unwrap();
                    criterion::black_box(rows.len());
                });
            });
        }
    }
    group.finish();
}

/// Benchmark pair counting and pruning alone
fn bench_select_class_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_class_edges");

    for size in [10_000u64, 100_000].iter() {
        let pairs: Vec<(u64, u64)> = (0..*size).map(|i| (i % 97, (i * 31) % 97)).collect();
        let counts = count_class_pairs(pairs);
        let thresholds = DfThresholds {
            df_threshold: 3,
            relative_df_threshold: 1.2,
            exclude_self_loops: true,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let edges = select_class_edges(&counts, &thresholds);
                criterion::black_box(edges.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate_df, bench_select_class_edges);
criterion_main!(benches);
