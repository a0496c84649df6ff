mod common;

use std::sync::Arc;

use common::{builder, import_trace, RecordingGateway, EVENTS_HEADER};
use ekg_builder::graph::{EdgeType, GraphStore, Label, PropertyValue};
use ekg_builder::{BuilderConfig, EmbeddedGateway};

const TRACE: &[(&str, &str)] = &[
    ("R1", "A"),
    ("R1", "B"),
    ("R2", "A"),
    ("R1", "A"),
    ("R2", "B"),
    ("R1", "B"),
];

fn label_count(store: &GraphStore, label: &str) -> usize {
    store.get_nodes_by_label(&Label::new(label)).len()
}

fn edge_count(store: &GraphStore, edge_type: &str) -> usize {
    store.get_edges_by_type(&EdgeType::new(edge_type)).len()
}

#[tokio::test]
async fn test_build_materialises_entities_and_df_edges() {
    let gateway = Arc::new(EmbeddedGateway::new());
    import_trace(&gateway, TRACE).await;

    let builder = builder(EVENTS_HEADER, Arc::clone(&gateway), BuilderConfig::default());
    builder.build().await.unwrap();

    let store = gateway.store_read().await;
    assert_eq!(label_count(&store, "Event"), 6);
    assert_eq!(label_count(&store, "Resource"), 2);
    assert_eq!(label_count(&store, "Activity"), 2);
    assert_eq!(edge_count(&store, "PREVALENCE"), 18);
    assert_eq!(edge_count(&store, "CORR"), 6);
    assert_eq!(edge_count(&store, "OBSERVED"), 6);
    // R1: A->B, B->A, A->B; R2: A->B
    assert_eq!(edge_count(&store, "DF"), 4);

    for df in store.get_edges_by_type(&EdgeType::new("DF")) {
        assert_eq!(df.get_property("entityType"), Some(&PropertyValue::from("Resource")));
        assert_eq!(df.get_property("type"), Some(&PropertyValue::from("DF")));
        let earlier = store.get_node(df.source).unwrap().get_property("timestamp").unwrap();
        let later = store.get_node(df.target).unwrap().get_property("timestamp").unwrap();
        assert!(earlier.as_datetime() < later.as_datetime());
    }

    // No transient markers survive a build
    assert!(store.all_nodes().all(|n| !n.has_property("_processed") && !n.has_property("_merged")));
}

#[tokio::test]
async fn test_build_is_idempotent() {
    let gateway = Arc::new(EmbeddedGateway::new());
    import_trace(&gateway, TRACE).await;
    let builder = builder(EVENTS_HEADER, Arc::clone(&gateway), BuilderConfig::default());

    builder.build().await.unwrap();
    let first = builder.statistics().await.unwrap();
    builder.build().await.unwrap();
    let second = builder.statistics().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.labels.get("Resource"), Some(&2));
    assert_eq!(second.relationships.get("DF"), Some(&4));
}

#[tokio::test]
async fn test_new_records_extend_an_existing_graph() {
    let gateway = Arc::new(EmbeddedGateway::new());
    import_trace(&gateway, &TRACE[..3]).await;
    let builder = builder(EVENTS_HEADER, Arc::clone(&gateway), BuilderConfig::default());
    builder.build().await.unwrap();

    gateway
        .import_records(
            &ekg_builder::graph::labels(["Record", "EventRecord"]),
            vec![common::event_record("late", "R1", "C", 99_000)],
        )
        .await;
    builder.build().await.unwrap();

    let store = gateway.store_read().await;
    assert_eq!(label_count(&store, "Event"), 4);
    assert_eq!(label_count(&store, "Resource"), 2);
    assert_eq!(label_count(&store, "Activity"), 3);
    // R1: A->B, B->C
    assert_eq!(edge_count(&store, "DF"), 2);
}

#[tokio::test]
async fn test_phases_run_in_order() {
    let gateway = Arc::new(RecordingGateway::new());
    import_trace(gateway.embedded(), TRACE).await;
    let builder = builder(EVENTS_HEADER, Arc::clone(&gateway), BuilderConfig::default());
    builder.build().await.unwrap();

    let kinds = gateway.kinds();
    let last_node = kinds.iter().rposition(|k| k.ends_with("nodes_by_record")).unwrap();
    let first_df = kinds.iter().position(|k| *k == "create_directly_follows").unwrap();
    let merge_df = kinds.iter().position(|k| *k == "merge_duplicate_df").unwrap();
    assert!(last_node < first_df);
    assert!(first_df < merge_df);

    // Every node phase clears its record markers
    let resets = kinds.iter().filter(|k| **k == "reset_processed_records").count();
    assert_eq!(resets, 3);
}

#[tokio::test]
async fn test_type_filter_limits_construction() {
    let gateway = Arc::new(EmbeddedGateway::new());
    import_trace(&gateway, TRACE).await;
    let builder = builder(EVENTS_HEADER, Arc::clone(&gateway), BuilderConfig::default());

    builder.create_nodes_by_records(&["Event".to_string()]).await.unwrap();

    let store = gateway.store_read().await;
    assert_eq!(label_count(&store, "Event"), 6);
    assert_eq!(label_count(&store, "Resource"), 0);
    assert_eq!(label_count(&store, "Activity"), 0);
}
