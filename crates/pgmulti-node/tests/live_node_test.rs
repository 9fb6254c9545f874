//! End-to-end batches against a real server.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use pgmulti_core::QUERY_COUNTS_FIELD;
use pgmulti_node::{NodeDefinition, PostgresNode};
use pgmulti_postgres::PostgresPool;
use pgmulti_test_utils::{message, HostEvent, RecordingHost};

async fn live_node() -> PostgresNode {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("failed to connect");

    PostgresNode::with_pool(
        NodeDefinition {
            id: "live".to_string(),
            output: true,
            ..Default::default()
        },
        Arc::new(PostgresPool::from_pool(pool)),
    )
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_select_one() {
    let node = live_node().await;
    let host = RecordingHost::new();

    node.on_input(message(json!([{"sql": "SELECT 1", "output": true}])), &host)
        .await;

    let sent = &host.sent()[0];
    assert_eq!(sent.payload(), Some(&json!([{"?column?": 1}])));
    assert_eq!(sent.get(QUERY_COUNTS_FIELD), Some(&json!([1])));
    node.close().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_bad_sql_then_select() {
    let node = live_node().await;
    let host = RecordingHost::new();

    node.on_input(
        message(json!([
            {"sql": "BAD SQL"},
            {"sql": "SELECT $id::int AS a, $id::int + 1 AS b", "params": {"id": 5}, "output": true}
        ])),
        &host,
    )
    .await;

    assert_eq!(
        host.events(),
        vec![HostEvent::Error("QueryError"), HostEvent::Sent, HostEvent::Done]
    );
    let sent = &host.sent()[0];
    assert_eq!(sent.get(QUERY_COUNTS_FIELD), Some(&json!([-1, 1])));
    assert_eq!(sent.payload(), Some(&json!([{"a": 5, "b": 6}])));
    node.close().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_temp_table_round_trip() {
    let node = live_node().await;
    let host = RecordingHost::new();

    node.on_input(
        message(json!([
            {"sql": "CREATE TEMP TABLE pgmulti_items (id int, name text)"},
            {"sql": "INSERT INTO pgmulti_items VALUES ($id, $name), ($id + 1, $name)", "params": {"id": 1, "name": "x"}},
            {"sql": "SELECT id, name FROM pgmulti_items ORDER BY id", "output": true}
        ])),
        &host,
    )
    .await;

    let sent = &host.sent()[0];
    assert_eq!(sent.get(QUERY_COUNTS_FIELD), Some(&json!([0, 0, 2])));
    assert_eq!(
        sent.payload(),
        Some(&json!([{"id": 1, "name": "x"}, {"id": 2, "name": "x"}]))
    );
    node.close().await;
}
