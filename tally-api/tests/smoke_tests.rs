//! End-to-end smoke tests against a live PostgreSQL instance.
//!
//! Run with `--features db-tests` and the `TALLY_DB_*` variables pointing at
//! a scratch database.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use tally_api::{ApiCache, CachedDbClient, DbClient, DbConfig, InvalidationPolicy, NewTransaction};
use tally_core::{TallyResult, TransactionKind};
use tally_storage::{CacheAside, CacheConfig, InMemoryCacheBackend, TransactionUpdate};

async fn test_client() -> TallyResult<CachedDbClient> {
    let config = DbConfig::from_env()?;
    let db = DbClient::from_config(&config)?;
    db.ensure_schema().await?;
    let cache: Arc<ApiCache> = Arc::new(CacheAside::new(
        Arc::new(InMemoryCacheBackend::new()),
        CacheConfig::default(),
    ));
    Ok(CachedDbClient::new(Arc::new(db), cache, InvalidationPolicy::Strict))
}

#[tokio::test]
async fn smoke_test_full_crud_chain() -> TallyResult<()> {
    let client = test_client().await?;
    let email = format!("smoke-{}@example.com", uuid::Uuid::now_v7());

    let user = client.register("Smoke", &email, "secret").await?;
    let logged_in = client.login(&email, "secret").await?;
    assert_eq!(logged_in.user_id, user.user_id);

    let project = client.create_project(user.user_id, "smoke-project", 1000.0).await?;
    assert_eq!(client.my_projects(user.user_id).await?.len(), 1);

    let mut ids = Vec::new();
    for (amount, kind) in [
        (500.0, TransactionKind::Income),
        (200.0, TransactionKind::Expense),
        (300.0, TransactionKind::Income),
    ] {
        let t = client
            .create_transaction(NewTransaction {
                project_id: project.project_id,
                amount,
                kind,
                category: "smoke".to_string(),
                description: None,
            })
            .await?;
        ids.push(t.transaction_id);
    }

    let stats = client.project_stats(project.project_id).await?;
    assert_eq!(stats.current_balance, 600.0);
    assert_eq!(stats.progress_percent, 60.0);

    let updated = client
        .update_transaction(
            ids[1],
            TransactionUpdate {
                amount: Some(250.0),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.amount, 250.0);
    assert_eq!(updated.category, "smoke");

    assert!(client.delete_transaction(ids[0]).await?);
    assert_eq!(client.user_transactions(user.user_id).await?.len(), 2);

    let duplicate = client.register("Smoke again", &email, "secret").await;
    assert!(duplicate.is_err());

    Ok(())
}
