//! Tests against a real PostgreSQL server.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p pgmulti-postgres -- --ignored

use pgmulti_core::{ConnectionPool, QueryParams};
use pgmulti_postgres::PostgresPool;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgPoolOptions;

async fn live_pool() -> PostgresPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("pool creation failed");
    PostgresPool::from_pool(pool)
}

fn named(value: Value) -> QueryParams {
    match value {
        Value::Object(map) => QueryParams::Named(map),
        _ => QueryParams::Named(Map::new()),
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn select_one_returns_question_column() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let rows = conn.query("SELECT 1", &QueryParams::default()).await.expect("query failed");
    conn.release();

    assert_eq!(rows.len(), 1);
    assert_eq!(Value::Object(rows[0].clone()), json!({"?column?": 1}));
}

#[tokio::test]
#[ignore = "requires database"]
async fn repeated_named_parameter_binds_same_value() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let rows = conn
        .query(
            "SELECT x FROM (VALUES (4), (5), (6)) AS t(x) WHERE x = $id OR x + 1 = $id ORDER BY x",
            &named(json!({"id": 5})),
        )
        .await
        .expect("query failed");
    conn.release();

    let values: Vec<Value> = rows.into_iter().map(|r| r["x"].clone()).collect();
    assert_eq!(values, vec![json!(4), json!(5)]);
}

#[tokio::test]
#[ignore = "requires database"]
async fn bad_sql_reports_sqlstate() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let err = conn.query("BAD SQL", &QueryParams::default()).await.unwrap_err();
    // the connection stays usable after a failed statement
    let rows = conn.query("SELECT 2 AS two", &QueryParams::default()).await.expect("query failed");
    conn.release();

    assert_eq!(err.code.as_deref(), Some("42601"));
    assert_eq!(rows[0]["two"], json!(2));
}

#[tokio::test]
#[ignore = "requires database"]
async fn decodes_common_column_types() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let rows = conn
        .query(
            "SELECT true AS b, 'txt'::text AS t, 1.5::float8 AS f, '{\"k\":1}'::jsonb AS j, \
             NULL::int4 AS n, 12.50::numeric AS d, ARRAY[1,2]::int4[] AS a",
            &QueryParams::default(),
        )
        .await
        .expect("query failed");
    conn.release();

    let row = &rows[0];
    assert_eq!(row["b"], json!(true));
    assert_eq!(row["t"], json!("txt"));
    assert_eq!(row["f"], json!(1.5));
    assert_eq!(row["j"], json!({"k": 1}));
    assert_eq!(row["n"], Value::Null);
    assert_eq!(row["d"], json!("12.50"));
    assert_eq!(row["a"], json!([1, 2]));
}

#[tokio::test]
#[ignore = "requires database"]
async fn parameters_take_the_column_types() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    conn.query(
        "CREATE TEMP TABLE typed_params (qty int4, due date, ref uuid, price numeric)",
        &QueryParams::default(),
    )
    .await
    .expect("create failed");

    let id = "5f2b8a4e-8c1d-4a8e-9f6b-1d2c3e4f5a6b";
    conn.query(
        "INSERT INTO typed_params (qty, due, ref, price) VALUES ($qty, $due, $ref, $price)",
        &named(json!({"qty": null, "due": "2024-03-01", "ref": id, "price": "19.90"})),
    )
    .await
    .expect("insert failed");

    let rows = conn
        .query("SELECT * FROM typed_params WHERE ref = $ref", &named(json!({"ref": id})))
        .await
        .expect("select failed");

    let err = conn
        .query("SELECT * FROM typed_params WHERE due = $due", &named(json!({"due": "soon"})))
        .await
        .unwrap_err();
    conn.release();

    assert_eq!(
        Value::Object(rows[0].clone()),
        json!({"qty": null, "due": "2024-03-01", "ref": id, "price": "19.90"})
    );
    assert_eq!(err.message, "parameter $1: cannot convert \"soon\" to DATE");
}

#[tokio::test]
#[ignore = "requires database"]
async fn numeric_decodes_with_and_without_parameters() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let simple = conn
        .query("SELECT 12.50::numeric AS d", &QueryParams::default())
        .await
        .expect("query failed");
    let prepared = conn
        .query(
            "SELECT 12.50::numeric AS d, $n::numeric + 1 AS e, ARRAY[1.5, NULL]::numeric[] AS arr",
            &named(json!({"n": 2})),
        )
        .await
        .expect("query failed");
    conn.release();

    assert_eq!(simple[0]["d"], json!("12.50"));
    assert_eq!(prepared[0]["d"], json!("12.50"));
    assert_eq!(prepared[0]["e"], json!("3"));
    assert_eq!(prepared[0]["arr"], json!(["1.5", null]));
}

#[tokio::test]
#[ignore = "requires database"]
async fn binary_results_keep_interval_and_inet() {
    let pool = live_pool().await;
    let mut conn = pool.acquire().await.expect("acquire failed");

    let rows = conn
        .query(
            "SELECT '1 year 2 mons 3 days 04:05:06'::interval AS i, \
             '192.168.0.1/24'::inet AS net, '10.0.0.0/8'::cidr AS block, $x::int4 AS x",
            &named(json!({"x": 1})),
        )
        .await
        .expect("query failed");
    conn.release();

    let row = &rows[0];
    assert_eq!(row["i"], json!("1 year 2 mons 3 days 04:05:06"));
    assert_eq!(row["net"], json!("192.168.0.1/24"));
    assert_eq!(row["block"], json!("10.0.0.0/8"));
    assert_eq!(row["x"], json!(1));
}
