use crate::db;
use crate::errors::ApiError;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let employer_routes = Router::new()
        .route("/api/v1/employees", post(register_employee).get(list_employees))
        .route("/api/v1/employees/:id", patch(update_employee))
        .route("/api/v1/payroll/runs", post(run_payroll))
        .route("/api/v1/payroll/batches", get(list_batches))
        .route("/api/v1/payroll/summary", get(get_summary))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/wallets/:wallet", get(own_view))
        .route("/api/v1/payroll/batches/:id/verify", get(verify_batch))
        .route("/api/v1/verify/proof", post(verify_proof))
        .merge(employer_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key.as_bytes() == state.api_key.as_bytes() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

async fn register_employee(State(state): State<AppState>, Json(req): Json<NewEmployee>) -> Result<Json<Employee>, ApiError> {
    let _writes = state.writes.lock().await;
    let employee = state.payroll.register(req).await?;
    let position = state.payroll.position(employee.id).await.ok_or(ApiError::Internal)?;
    db::insert_employee(&state.db, &employee, position).await?;
    Ok(Json(employee))
}

async fn list_employees(State(state): State<AppState>) -> Json<Vec<Employee>> {
    Json(state.payroll.list_all().await)
}

async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EmployeeUpdate>,
) -> Result<Json<Employee>, ApiError> {
    let _writes = state.writes.lock().await;
    let employee = state.payroll.update(id, req).await?;
    db::update_employee(&state.db, &employee).await?;
    Ok(Json(employee))
}

async fn run_payroll(State(state): State<AppState>) -> Result<Json<PayrollBatch>, ApiError> {
    let run = state.payroll.start_run_with_ledgers().await?;

    // A registration holds the gate until its row exists, so every employee this run paid has one.
    let _writes = state.writes.lock().await;
    db::record_batch(&state.db, &run.batch, &run.ledgers).await?;

    Ok(Json(run.batch))
}

async fn list_batches(State(state): State<AppState>) -> Json<Vec<PayrollBatch>> {
    Json(state.payroll.history().await)
}

async fn get_summary(State(state): State<AppState>) -> Result<Json<PayrollSummary>, ApiError> {
    Ok(Json(state.payroll.summary().await?))
}

async fn own_view(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Query(params): Query<OwnViewParams>,
) -> Result<Json<OwnView>, ApiError> {
    match state.payroll.own_view(&wallet, params.reveal.unwrap_or(false)).await {
        ViewOutcome::Found(view) => Ok(Json(*view)),
        ViewOutcome::EmployeeNotFound => Err(ApiError::NotFound("employee not found".to_string())),
    }
}

async fn verify_batch(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<BatchVerification>, ApiError> {
    state
        .payroll
        .verify_batch(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("batch not found".to_string()))
}

async fn verify_proof(State(state): State<AppState>, Json(req): Json<VerifyProofRequest>) -> Json<VerifyProofResponse> {
    Json(VerifyProofResponse { ok: state.payroll.verify_proof(req.token).await })
}
