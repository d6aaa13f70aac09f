//! PostgreSQL Store
//!
//! `DbClient` implements [`FinanceStore`] over a deadpool-postgres pool with
//! parameterized SQL. Unique and foreign-key violations are mapped to the
//! domain's `Conflict` and `NotFound`; every other database failure is logged
//! and reported as `StorageError::Backend`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use tally_core::{
    ConfigError, EntityIdType, EntityType, Project, ProjectId, StorageError, TallyError,
    TallyResult, Transaction, TransactionId, TransactionKind, User, UserId,
};
use tally_storage::{FinanceStore, TransactionUpdate};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::{parse_var, EnvSource, ProcessEnv};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long a request waits for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tally".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Load from `TALLY_DB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    /// Load from an arbitrary source.
    pub fn from_source(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str, default: String| env.var(key).unwrap_or(default);

        let max_size = parse_var(env, "TALLY_DB_POOL_SIZE", defaults.max_size)?;
        if max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_DB_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        Ok(Self {
            host: text("TALLY_DB_HOST", defaults.host),
            port: parse_var(env, "TALLY_DB_PORT", defaults.port)?,
            dbname: text("TALLY_DB_NAME", defaults.dbname),
            user: text("TALLY_DB_USER", defaults.user),
            password: text("TALLY_DB_PASSWORD", defaults.password),
            max_size,
            timeout: Duration::from_secs(parse_var(
                env,
                "TALLY_DB_TIMEOUT",
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> TallyResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            TallyError::Storage(StorageError::Backend {
                reason: format!("failed to create pool: {}", e),
            })
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS projects (
    id         UUID PRIMARY KEY,
    user_id    UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    budget     DOUBLE PRECISION NOT NULL CHECK (budget >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS transactions (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    amount      DOUBLE PRECISION NOT NULL CHECK (amount >= 0),
    type        TEXT NOT NULL CHECK (type IN ('income', 'expense')),
    category    TEXT NOT NULL,
    description TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_projects_user_id ON projects (user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_project_id ON transactions (project_id, created_at DESC);
"#;

const TRANSACTION_COLUMNS: &str =
    "t.id, t.project_id, t.amount, t.type, t.category, t.description, t.created_at";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn backend(context: &str, err: tokio_postgres::Error) -> TallyError {
    tracing::error!(context, error = ?err, "Database error");
    TallyError::Storage(StorageError::Backend {
        reason: format!("{}: {}", context, err),
    })
}

/// A pool that timed out or was closed is a transient outage, not a query
/// failure.
fn pool_error(err: PoolError) -> TallyError {
    tracing::error!(error = ?err, "Connection pool error");
    let storage = match err {
        PoolError::Timeout(_) => StorageError::Unavailable {
            reason: "timed out waiting for a database connection".to_string(),
        },
        PoolError::Closed => StorageError::Unavailable {
            reason: "connection pool is closed".to_string(),
        },
        other => StorageError::Backend {
            reason: format!("pool: {}", other),
        },
    };
    TallyError::Storage(storage)
}

/// Map an insert failure: unique violation is a conflict, a dangling foreign
/// key means the parent row is missing.
fn insert_error(
    err: tokio_postgres::Error,
    entity_type: EntityType,
    parent: Option<(EntityType, Uuid)>,
) -> TallyError {
    let code = err.code().cloned();
    match (code, parent) {
        (Some(code), _) if code == SqlState::UNIQUE_VIOLATION => {
            TallyError::Storage(StorageError::Conflict {
                entity_type,
                reason: err
                    .as_db_error()
                    .and_then(|db| db.detail().map(str::to_string))
                    .unwrap_or_else(|| "duplicate key".to_string()),
            })
        }
        (Some(code), Some((parent_type, parent_id))) if code == SqlState::FOREIGN_KEY_VIOLATION => {
            TallyError::not_found(parent_type, parent_id)
        }
        _ => backend("insert", err),
    }
}

// ============================================================================
// ROW PARSING
// ============================================================================

fn column<'a, T>(row: &'a Row, name: &str) -> TallyResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| backend("decode row", e))
}

fn user_from_row(row: &Row) -> TallyResult<User> {
    Ok(User {
        user_id: UserId::new(column(row, "id")?),
        email: column(row, "email")?,
        name: column(row, "name")?,
        password_hash: column(row, "password_hash")?,
        created_at: column(row, "created_at")?,
    })
}

fn project_from_row(row: &Row) -> TallyResult<Project> {
    Ok(Project {
        project_id: ProjectId::new(column(row, "id")?),
        user_id: UserId::new(column(row, "user_id")?),
        name: column(row, "name")?,
        budget: column(row, "budget")?,
        created_at: column(row, "created_at")?,
    })
}

fn transaction_from_row(row: &Row) -> TallyResult<Transaction> {
    let kind: String = column(row, "type")?;
    let kind = TransactionKind::from_db_str(&kind).map_err(|e| {
        TallyError::Storage(StorageError::Backend {
            reason: format!("corrupt transaction row: {}", e),
        })
    })?;
    Ok(Transaction {
        transaction_id: TransactionId::new(column(row, "id")?),
        project_id: ProjectId::new(column(row, "project_id")?),
        amount: column(row, "amount")?,
        kind,
        category: column(row, "category")?,
        description: column(row, "description")?,
        created_at: column(row, "created_at")?,
    })
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// PostgreSQL-backed [`FinanceStore`].
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> TallyResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    async fn get_conn(&self) -> TallyResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the tables if they do not exist. Safe to run on every start.
    pub async fn ensure_schema(&self) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| backend("ensure schema", e))?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn owner_query(&self, sql: &str, id: Uuid) -> TallyResult<Option<UserId>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(sql, &[&id])
            .await
            .map_err(|e| backend("owner lookup", e))?;
        row.map(|r| column::<Uuid>(&r, "user_id").map(UserId::new))
            .transpose()
    }
}

#[async_trait]
impl FinanceStore for DbClient {
    async fn user_insert(&self, user: &User) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO users (id, email, name, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &user.user_id.as_uuid(),
                &user.email,
                &user.name,
                &user.password_hash,
                &user.created_at,
            ],
        )
        .await
        .map_err(|e| insert_error(e, EntityType::User, None))?;
        Ok(())
    }

    async fn user_get_by_email(&self, email: &str) -> TallyResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, email, name, password_hash, created_at FROM users WHERE email = $1",
                &[&email],
            )
            .await
            .map_err(|e| backend("user by email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn project_insert(&self, project: &Project) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO projects (id, user_id, name, budget, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &project.project_id.as_uuid(),
                &project.user_id.as_uuid(),
                &project.name,
                &project.budget,
                &project.created_at,
            ],
        )
        .await
        .map_err(|e| {
            insert_error(
                e,
                EntityType::Project,
                Some((EntityType::User, project.user_id.as_uuid())),
            )
        })?;
        Ok(())
    }

    async fn project_get(&self, id: ProjectId) -> TallyResult<Option<Project>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, user_id, name, budget, created_at FROM projects WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await
            .map_err(|e| backend("project get", e))?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn project_owner(&self, id: ProjectId) -> TallyResult<Option<UserId>> {
        self.owner_query("SELECT user_id FROM projects WHERE id = $1", id.as_uuid())
            .await
    }

    async fn project_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Project>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, user_id, name, budget, created_at FROM projects \
                 WHERE user_id = $1 ORDER BY created_at DESC",
                &[&user_id.as_uuid()],
            )
            .await
            .map_err(|e| backend("project list", e))?;
        rows.iter().map(project_from_row).collect()
    }

    async fn transaction_insert(&self, t: &Transaction) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO transactions (id, project_id, amount, type, category, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &t.transaction_id.as_uuid(),
                &t.project_id.as_uuid(),
                &t.amount,
                &t.kind.as_db_str(),
                &t.category,
                &t.description,
                &t.created_at,
            ],
        )
        .await
        .map_err(|e| {
            insert_error(
                e,
                EntityType::Transaction,
                Some((EntityType::Project, t.project_id.as_uuid())),
            )
        })?;
        Ok(())
    }

    async fn transaction_get(&self, id: TransactionId) -> TallyResult<Option<Transaction>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = $1");
        let row = conn
            .query_opt(sql.as_str(), &[&id.as_uuid()])
            .await
            .map_err(|e| backend("transaction get", e))?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn transaction_owner(&self, id: TransactionId) -> TallyResult<Option<UserId>> {
        self.owner_query(
            "SELECT p.user_id FROM transactions t JOIN projects p ON p.id = t.project_id \
             WHERE t.id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn transaction_update(
        &self,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> TallyResult<Option<Transaction>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE transactions t SET \
                 amount = COALESCE($2, t.amount), \
                 category = COALESCE($3, t.category), \
                 description = COALESCE($4, t.description), \
                 type = COALESCE($5, t.type) \
             WHERE t.id = $1 RETURNING {TRANSACTION_COLUMNS}"
        );
        let kind = update.kind.map(|k| k.as_db_str());
        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &id.as_uuid(),
                    &update.amount,
                    &update.category,
                    &update.description,
                    &kind,
                ],
            )
            .await
            .map_err(|e| backend("transaction update", e))?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn transaction_delete(&self, id: TransactionId) -> TallyResult<bool> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute("DELETE FROM transactions WHERE id = $1", &[&id.as_uuid()])
            .await
            .map_err(|e| backend("transaction delete", e))?;
        Ok(removed > 0)
    }

    async fn transaction_list_by_project(
        &self,
        project_id: ProjectId,
    ) -> TallyResult<Vec<Transaction>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
             WHERE t.project_id = $1 ORDER BY t.created_at DESC"
        );
        let rows = conn
            .query(sql.as_str(), &[&project_id.as_uuid()])
            .await
            .map_err(|e| backend("project transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn transaction_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Transaction>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
             JOIN projects p ON p.id = t.project_id \
             WHERE p.user_id = $1 ORDER BY t.created_at DESC"
        );
        let rows = conn
            .query(sql.as_str(), &[&user_id.as_uuid()])
            .await
            .map_err(|e| backend("user transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn ping(&self) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| backend("ping", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_source(&env(&[])).unwrap();
        assert_eq!(config, DbConfig::default());
        assert_eq!(config.dbname, "tally");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_db_config_overrides() {
        let config = DbConfig::from_source(&env(&[
            ("TALLY_DB_HOST", "db.internal"),
            ("TALLY_DB_PORT", "6543"),
            ("TALLY_DB_POOL_SIZE", "4"),
            ("TALLY_DB_TIMEOUT", "5"),
        ]))
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_db_config_rejects_bad_values() {
        assert!(DbConfig::from_source(&env(&[("TALLY_DB_PORT", "postgres")])).is_err());
        assert!(DbConfig::from_source(&env(&[("TALLY_DB_POOL_SIZE", "0")])).is_err());
    }

    #[test]
    fn test_closed_pool_is_unavailable() {
        let err = pool_error(PoolError::Closed);
        assert!(matches!(
            err,
            TallyError::Storage(StorageError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_pool_surfaces_unavailable_from_store() {
        let pool = DbConfig::default().create_pool().unwrap();
        pool.close();
        let db = DbClient::new(pool);
        let err = db.ping().await.unwrap_err();
        assert!(matches!(
            err,
            TallyError::Storage(StorageError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_schema_is_idempotent_ddl() {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "non-idempotent statement: {statement}"
            );
        }
    }
}
