use crate::constants::{BLOCKS_PER_BATCH, MAX_BLOCKS_PER_REQUEST};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use carbon_core::{
    constants::TOKEN_SYMBOL, Block, CancelToken, ChainError, ChainStatus, LedgerError, MineError,
    MiningControl, ProjectRecord, RegistryError, SharedChain, TokenOperation, Violation,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub chain: SharedChain,
    pub mine_timeout: Duration,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain/head", get(head))
        .route("/chain/blocks", get(blocks))
        .route("/chain/validate", get(validate))
        .route("/projects", get(list_projects).post(register_project))
        .route("/projects/{id}", get(get_project))
        .route("/balances", get(balances))
        .route("/balances/{account}", get(balance))
        .route("/transfers", post(transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
struct BlocksQuery {
    start: Option<u64>,
    limit: Option<usize>,
    #[serde(default)]
    dir: Direction,
}

#[derive(Serialize)]
struct Validation {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    violation: Option<Violation>,
}

#[derive(Serialize)]
struct Balances {
    symbol: &'static str,
    total_supply: u64,
    balances: BTreeMap<String, u64>,
}

#[derive(Serialize)]
struct Balance {
    account: String,
    symbol: &'static str,
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct TransferIn {
    from_account: String,
    to_account: String,
    amount: u64,
}

#[derive(Serialize)]
struct Committed {
    index: u64,
    hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    issue: Option<TokenOperation>,
}

impl Committed {
    fn of(block: &Block, issue: Option<TokenOperation>) -> Self {
        Self {
            index: block.index,
            hash: block.hash_hex(),
            issue,
        }
    }
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn head(State(state): State<AppState>) -> Json<ChainStatus> {
    Json(state.chain.status())
}

async fn blocks(
    State(state): State<AppState>,
    Query(query): Query<BlocksQuery>,
) -> Json<Vec<Block>> {
    let limit = query
        .limit
        .unwrap_or(BLOCKS_PER_BATCH)
        .min(MAX_BLOCKS_PER_REQUEST);
    let page = state.chain.view(|chain| {
        let blocks = chain.blocks();
        match query.dir {
            Direction::Asc => {
                let start = query.start.unwrap_or(0) as usize;
                blocks.iter().skip(start).take(limit).cloned().collect()
            }
            Direction::Desc => {
                let start = query.start.unwrap_or_else(|| chain.height()) as usize;
                let end = start.saturating_add(1).min(blocks.len());
                blocks[..end].iter().rev().take(limit).cloned().collect()
            }
        }
    });
    Json(page)
}

async fn validate(State(state): State<AppState>) -> Result<Json<Validation>, ApiError> {
    let chain = state.chain.clone();
    let result = tokio::task::spawn_blocking(move || chain.validate_full())
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;
    match result {
        Ok(()) => Ok(Json(Validation {
            valid: true,
            index: None,
            violation: None,
        })),
        Err(ChainError::InvalidBlock { index, violation }) => Ok(Json(Validation {
            valid: false,
            index: Some(index),
            violation: Some(violation),
        })),
        Err(err) => Err(err.into()),
    }
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<ProjectRecord>>, ApiError> {
    Ok(Json(state.chain.projects()?))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectRecord>, ApiError> {
    Ok(Json(state.chain.project(&id)?))
}

async fn balances(State(state): State<AppState>) -> Result<Json<Balances>, ApiError> {
    let balances = state.chain.balances()?.into_iter().collect();
    Ok(Json(Balances {
        symbol: TOKEN_SYMBOL,
        total_supply: state.chain.total_supply()?,
        balances,
    }))
}

async fn balance(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Result<Json<Balance>, ApiError> {
    let balance = state.chain.balance_of(&account)?;
    Ok(Json(Balance {
        account,
        symbol: TOKEN_SYMBOL,
        balance,
    }))
}

async fn register_project(
    State(state): State<AppState>,
    body: Result<Json<ProjectRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<Committed>), ApiError> {
    let Json(record) = body?;
    let project_id = record.project_id.clone();
    let (block, issue) = mine_blocking(&state, move |chain, control| {
        chain.register_and_submit(record, &control)
    })
    .await?;
    info!(%project_id, index = block.index, "project registered");
    Ok((StatusCode::CREATED, Json(Committed::of(&block, Some(issue)))))
}

async fn transfer(
    State(state): State<AppState>,
    body: Result<Json<TransferIn>, JsonRejection>,
) -> Result<(StatusCode, Json<Committed>), ApiError> {
    let Json(req) = body?;
    let block = mine_blocking(&state, move |chain, control| {
        chain.transfer(req.from_account, req.to_account, req.amount, &control)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(Committed::of(&block, None))))
}

/// Abandons the search when the request future is dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs a mining job on the blocking pool under the node's deadline.
async fn mine_blocking<T, F>(state: &AppState, job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(SharedChain, MiningControl) -> Result<T, ChainError> + Send + 'static,
{
    let chain = state.chain.clone();
    let control = MiningControl::new().with_timeout(state.mine_timeout);
    let _guard = CancelOnDrop(control.cancel_token());
    let result = tokio::task::spawn_blocking(move || job(chain, control))
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;
    Ok(result?)
}

pub(crate) enum ApiError {
    Chain(ChainError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

fn status_for(err: &ChainError) -> StatusCode {
    match err {
        ChainError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
        ChainError::Registry(
            RegistryError::DuplicateProject(_) | RegistryError::AlreadySuperseded { .. },
        ) => StatusCode::CONFLICT,
        ChainError::Registry(_) => StatusCode::BAD_REQUEST,
        ChainError::Ledger(LedgerError::InsufficientBalance { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ChainError::Ledger(LedgerError::SupplyOverflow { .. }) => StatusCode::BAD_REQUEST,
        ChainError::InvalidBlock { .. } => StatusCode::BAD_REQUEST,
        ChainError::Linkage { .. } | ChainError::RetriesExhausted { .. } => StatusCode::CONFLICT,
        ChainError::Mining(MineError::DeadlineExceeded | MineError::Cancelled) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ChainError::Untrusted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Chain(err) => (status_for(&err), err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")),
        };
        if status.is_server_error() {
            error!(%status, %message, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
