//! GraphQL API Routes
//!
//! Every resolver maps onto one `CachedDbClient` operation. Output fields are
//! snake_case (`created_at`, `project_id`) and a transaction's kind travels
//! as the string field `type`, which is what the web client already sends
//! and reads.
//!
//! Endpoints:
//! - POST /graphql - Execute GraphQL queries/mutations
//! - GET /graphql/playground - GraphiQL playground

use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, Object, Result as GqlResult, Schema,
    SimpleObject, ID,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use tally_core::{
    EntityIdType, Project, ProjectId, ProjectStats, TallyError, Transaction, TransactionId,
    TransactionKind, User, UserId,
};
use tally_storage::TransactionUpdate;
use uuid::Uuid;

use crate::cached_db::{CachedDbClient, NewTransaction};
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// GRAPHQL TYPES
// ============================================================================

/// GraphQL user object. The password digest is never exposed.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "User", rename_fields = "snake_case")]
pub struct GqlUser {
    pub id: ID,
    pub email: String,
    pub name: String,
}

impl From<User> for GqlUser {
    fn from(u: User) -> Self {
        Self {
            id: ID(u.user_id.to_string()),
            email: u.email,
            name: u.name,
        }
    }
}

/// GraphQL project object.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Project", rename_fields = "snake_case")]
pub struct GqlProject {
    pub id: ID,
    pub user_id: ID,
    pub name: String,
    pub budget: f64,
    pub created_at: String,
}

impl From<Project> for GqlProject {
    fn from(p: Project) -> Self {
        Self {
            id: ID(p.project_id.to_string()),
            user_id: ID(p.user_id.to_string()),
            name: p.name,
            budget: p.budget,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

/// GraphQL transaction object.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Transaction", rename_fields = "snake_case")]
pub struct GqlTransaction {
    pub id: ID,
    pub project_id: ID,
    pub amount: f64,
    #[graphql(name = "type")]
    pub kind: String,
    pub category: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<Transaction> for GqlTransaction {
    fn from(t: Transaction) -> Self {
        Self {
            id: ID(t.transaction_id.to_string()),
            project_id: ID(t.project_id.to_string()),
            amount: t.amount,
            kind: t.kind.as_db_str().to_string(),
            category: t.category,
            description: t.description,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

/// GraphQL project statistics object.
#[derive(Debug, Clone, Copy, SimpleObject)]
#[graphql(name = "ProjectStats", rename_fields = "snake_case")]
pub struct GqlProjectStats {
    pub current_balance: f64,
    pub progress_percent: f64,
    pub income_total: f64,
    pub expense_total: f64,
}

impl From<ProjectStats> for GqlProjectStats {
    fn from(s: ProjectStats) -> Self {
        Self {
            current_balance: s.current_balance,
            progress_percent: s.progress_percent,
            income_total: s.income_total,
            expense_total: s.expense_total,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn gql_error(err: TallyError) -> async_graphql::Error {
    ApiError::from(err).extend()
}

fn parse_id<T: EntityIdType>(field: &str, id: &ID) -> GqlResult<T> {
    Uuid::parse_str(id.as_str())
        .map(T::new)
        .map_err(|_| ApiError::invalid_format(field, "UUID").extend())
}

fn parse_kind(kind: &str) -> GqlResult<TransactionKind> {
    kind.parse::<TransactionKind>().map_err(|e| {
        ApiError::validation_failed(e.to_string())
            .with_details(serde_json::json!({ "field": "type" }))
            .extend()
    })
}

// ============================================================================
// QUERY ROOT
// ============================================================================

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Projects owned by a user, newest first.
    async fn my_projects(&self, ctx: &Context<'_>, user_id: ID) -> GqlResult<Vec<GqlProject>> {
        let db = ctx.data::<CachedDbClient>()?;
        let user_id: UserId = parse_id("userId", &user_id)?;
        let projects = db.my_projects(user_id).await.map_err(gql_error)?;
        Ok(projects.into_iter().map(GqlProject::from).collect())
    }

    /// Transactions of one project, newest first.
    async fn project_transactions(
        &self,
        ctx: &Context<'_>,
        project_id: ID,
    ) -> GqlResult<Vec<GqlTransaction>> {
        let db = ctx.data::<CachedDbClient>()?;
        let project_id: ProjectId = parse_id("projectId", &project_id)?;
        let transactions = db.project_transactions(project_id).await.map_err(gql_error)?;
        Ok(transactions.into_iter().map(GqlTransaction::from).collect())
    }

    /// Transactions across all of a user's projects, newest first.
    async fn user_transactions(
        &self,
        ctx: &Context<'_>,
        user_id: ID,
    ) -> GqlResult<Vec<GqlTransaction>> {
        let db = ctx.data::<CachedDbClient>()?;
        let user_id: UserId = parse_id("userId", &user_id)?;
        let transactions = db.user_transactions(user_id).await.map_err(gql_error)?;
        Ok(transactions.into_iter().map(GqlTransaction::from).collect())
    }

    /// Balance and budget progress of a project.
    async fn project_stats(&self, ctx: &Context<'_>, project_id: ID) -> GqlResult<GqlProjectStats> {
        let db = ctx.data::<CachedDbClient>()?;
        let project_id: ProjectId = parse_id("projectId", &project_id)?;
        let stats = db.project_stats(project_id).await.map_err(gql_error)?;
        Ok(stats.into())
    }
}

// ============================================================================
// MUTATION ROOT
// ============================================================================

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_project(
        &self,
        ctx: &Context<'_>,
        name: String,
        budget: f64,
        user_id: ID,
    ) -> GqlResult<GqlProject> {
        let db = ctx.data::<CachedDbClient>()?;
        let user_id: UserId = parse_id("userId", &user_id)?;
        let project = db
            .create_project(user_id, &name, budget)
            .await
            .map_err(gql_error)?;
        Ok(project.into())
    }

    async fn create_transaction(
        &self,
        ctx: &Context<'_>,
        project_id: ID,
        amount: f64,
        category: String,
        description: Option<String>,
        #[graphql(name = "type")] kind: String,
    ) -> GqlResult<GqlTransaction> {
        let db = ctx.data::<CachedDbClient>()?;
        let input = NewTransaction {
            project_id: parse_id("projectId", &project_id)?,
            amount,
            kind: parse_kind(&kind)?,
            category,
            description,
        };
        let transaction = db.create_transaction(input).await.map_err(gql_error)?;
        Ok(transaction.into())
    }

    /// Partial update: omitted arguments keep their stored value.
    async fn update_transaction(
        &self,
        ctx: &Context<'_>,
        id: ID,
        amount: Option<f64>,
        category: Option<String>,
        description: Option<String>,
        #[graphql(name = "type")] kind: Option<String>,
    ) -> GqlResult<GqlTransaction> {
        let db = ctx.data::<CachedDbClient>()?;
        let id: TransactionId = parse_id("id", &id)?;
        let update = TransactionUpdate {
            amount,
            category,
            description,
            kind: kind.as_deref().map(parse_kind).transpose()?,
        };
        let transaction = db.update_transaction(id, update).await.map_err(gql_error)?;
        Ok(transaction.into())
    }

    async fn delete_transaction(&self, ctx: &Context<'_>, id: ID) -> GqlResult<bool> {
        let db = ctx.data::<CachedDbClient>()?;
        let id: TransactionId = parse_id("id", &id)?;
        db.delete_transaction(id).await.map_err(gql_error)
    }

    async fn register(
        &self,
        ctx: &Context<'_>,
        name: String,
        email: String,
        password: String,
    ) -> GqlResult<GqlUser> {
        let db = ctx.data::<CachedDbClient>()?;
        let user = db
            .register(&name, &email, &password)
            .await
            .map_err(gql_error)?;
        Ok(user.into())
    }

    async fn login(&self, ctx: &Context<'_>, email: String, password: String) -> GqlResult<GqlUser> {
        let db = ctx.data::<CachedDbClient>()?;
        let user = db.login(&email, &password).await.map_err(gql_error)?;
        Ok(user.into())
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub type TallySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema with the coordinator as shared resolver data.
pub fn create_schema(cached_db: CachedDbClient) -> TallySchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(cached_db)
        .finish()
}

/// Handler for GraphQL requests.
pub async fn graphql_handler(State(schema): State<TallySchema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the GraphQL routes router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(graphql_handler))
        .route("/playground", get(graphiql_handler))
}
