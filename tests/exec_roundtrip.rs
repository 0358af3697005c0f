//! Direct-execution and round-trip tests against live source and target
//! databases.
//!
//! Requires both `PGROCKET_TEST_URL` and `PGROCKET_TEST_TARGET_URL`; tests
//! skip cleanly when either is absent.

use std::collections::{BTreeMap, BTreeSet};

use pg_rocket::testing::{self, dataset};
use pg_rocket::{Connection, Engine, Executor, SqlWriter, TraversalOptions, TraversalState};
use tokio_util::sync::CancellationToken;

static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

fn both_dsns() -> Option<(String, String)> {
    match (testing::source_dsn(), testing::target_dsn()) {
        (Some(source), Some(target)) => Some((source, target)),
        _ => {
            eprintln!("skipping: PGROCKET_TEST_URL and PGROCKET_TEST_TARGET_URL not both set");
            None
        }
    }
}

/// Order-insensitive canonical form of an extracted snapshot.
fn canonical(state: &TraversalState) -> BTreeMap<String, BTreeSet<String>> {
    state
        .data
        .iter()
        .map(|(table, rows)| {
            let rendered: BTreeSet<String> =
                rows.iter().map(|row| format!("{row:?}")).collect();
            (table.clone(), rendered)
        })
        .collect()
}

#[tokio::test]
async fn test_direct_execution_round_trip() -> anyhow::Result<()> {
    let Some((source_dsn, target_dsn)) = both_dsns() else {
        return Ok(());
    };
    let _guard = DB_LOCK.lock().await;

    let cancel = CancellationToken::new();

    let source_admin = testing::connect(&source_dsn).await?;
    dataset::setup(&source_admin).await?;
    let target_admin = testing::connect(&target_dsn).await?;
    dataset::setup_empty(&target_admin).await?;

    let engine = Engine::new(Connection::connect(&source_dsn).await?, &cancel).await?;
    let options = TraversalOptions::default();
    let query = "SELECT * FROM projects WHERE id = 1";
    let state = engine.extract(&cancel, query, &options).await?;

    let mut executor = Executor::new(
        Connection::connect(&target_dsn).await?,
        engine.graph(),
        false,
    );
    executor.execute(&cancel, &state).await?;

    // Extracting the same query from the target yields the same row set.
    let target_engine = Engine::new(Connection::connect(&target_dsn).await?, &cancel).await?;
    let target_state = target_engine.extract(&cancel, query, &options).await?;

    assert_eq!(canonical(&state), canonical(&target_state));
    assert_eq!(state.row_count, target_state.row_count);

    Ok(())
}

#[tokio::test]
async fn test_upsert_execution_is_idempotent() -> anyhow::Result<()> {
    let Some((source_dsn, target_dsn)) = both_dsns() else {
        return Ok(());
    };
    let _guard = DB_LOCK.lock().await;

    let cancel = CancellationToken::new();

    let source_admin = testing::connect(&source_dsn).await?;
    dataset::setup(&source_admin).await?;
    let target_admin = testing::connect(&target_dsn).await?;
    dataset::setup_empty(&target_admin).await?;

    let engine = Engine::new(Connection::connect(&source_dsn).await?, &cancel).await?;
    let options = TraversalOptions::default();
    let query = "SELECT * FROM tasks WHERE id = 1";
    let state = engine.extract(&cancel, query, &options).await?;

    for _ in 0..2 {
        let mut executor = Executor::new(
            Connection::connect(&target_dsn).await?,
            engine.graph(),
            true,
        );
        executor.execute(&cancel, &state).await?;
    }

    let target_engine = Engine::new(Connection::connect(&target_dsn).await?, &cancel).await?;
    let target_state = target_engine.extract(&cancel, query, &options).await?;
    assert_eq!(canonical(&state), canonical(&target_state));

    Ok(())
}

#[tokio::test]
async fn test_execution_rolls_back_on_failure() -> anyhow::Result<()> {
    let Some((source_dsn, target_dsn)) = both_dsns() else {
        return Ok(());
    };
    let _guard = DB_LOCK.lock().await;

    let cancel = CancellationToken::new();

    let source_admin = testing::connect(&source_dsn).await?;
    dataset::setup(&source_admin).await?;
    let target_admin = testing::connect(&target_dsn).await?;
    dataset::setup_empty(&target_admin).await?;

    // A conflicting organization makes the plain INSERT fail mid-run.
    target_admin
        .execute(
            "INSERT INTO organizations (id, name) VALUES (1, 'Existing')",
            &[],
        )
        .await?;

    let engine = Engine::new(Connection::connect(&source_dsn).await?, &cancel).await?;
    let options = TraversalOptions::default();
    let state = engine
        .extract(&cancel, "SELECT * FROM projects WHERE id = 1", &options)
        .await?;

    let mut executor = Executor::new(
        Connection::connect(&target_dsn).await?,
        engine.graph(),
        false,
    );
    let err = executor.execute(&cancel, &state).await.unwrap_err();
    assert!(err.to_string().starts_with("exec:"), "{err}");

    // Nothing but the pre-existing row survives.
    let count: i64 = target_admin
        .query_one("SELECT count(*) FROM projects", &[])
        .await?
        .get(0);
    assert_eq!(count, 0);

    Ok(())
}

#[tokio::test]
async fn test_sql_output_applies_and_preserves_jsonb() -> anyhow::Result<()> {
    let Some((source_dsn, target_dsn)) = both_dsns() else {
        return Ok(());
    };
    let _guard = DB_LOCK.lock().await;

    let cancel = CancellationToken::new();

    let source_admin = testing::connect(&source_dsn).await?;
    dataset::setup(&source_admin).await?;
    let target_admin = testing::connect(&target_dsn).await?;
    dataset::setup_empty(&target_admin).await?;

    let engine = Engine::new(Connection::connect(&source_dsn).await?, &cancel).await?;
    let options = TraversalOptions::default();
    let state = engine
        .extract(&cancel, "SELECT * FROM tasks", &options)
        .await?;

    let mut sql = Vec::new();
    SqlWriter::new(&mut sql, engine.graph()).write(&state)?;
    target_admin.batch_execute(&String::from_utf8(sql)?).await?;

    // The stored jsonb type must be indistinguishable from the source,
    // including the SQL NULL / JSON null distinction.
    let probe = "
        SELECT id, jsonb_typeof(attributes), attributes::text
        FROM tasks ORDER BY id
    ";
    let source_rows = source_admin.query(probe, &[]).await?;
    let target_rows = target_admin.query(probe, &[]).await?;
    assert_eq!(source_rows.len(), target_rows.len());

    for (source_row, target_row) in source_rows.iter().zip(target_rows.iter()) {
        let id: i64 = source_row.get(0);
        let source_type: Option<String> = source_row.get(1);
        let target_type: Option<String> = target_row.get(1);
        assert_eq!(source_type, target_type, "jsonb_typeof mismatch for task {id}");

        let source_text: Option<String> = source_row.get(2);
        let target_text: Option<String> = target_row.get(2);
        assert_eq!(source_text, target_text, "jsonb value mismatch for task {id}");
    }

    // Row-set equality over every emitted table.
    let target_engine = Engine::new(Connection::connect(&target_dsn).await?, &cancel).await?;
    let target_state = target_engine
        .extract(&cancel, "SELECT * FROM tasks", &options)
        .await?;
    assert_eq!(canonical(&state), canonical(&target_state));

    Ok(())
}
