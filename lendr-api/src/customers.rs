use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lendr_core::{CustomerBalance, Customer, CustomerStatus, NewCustomer};

use crate::import::{import_customers, ImportSummary};
use crate::{error::AppError, state::AppState, ApiJson};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub external_id: String,
    pub score: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub external_id: String,
    pub status: CustomerStatus,
    pub score: Decimal,
    pub preapproved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            external_id: c.external_id,
            status: c.status,
            score: c.score,
            preapproved_at: c.preapproved_at,
            created_at: c.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route("/customers/upload", post(upload_customers))
        .route("/customers/{external_id}", get(get_customer))
        .route("/customers/{external_id}/balance", get(customer_balance))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /customers
async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerResponse>>, AppError> {
    let customers = state.repo.list_customers().await?;
    Ok(Json(customers.into_iter().map(CustomerResponse::from).collect()))
}

/// POST /customers
/// New customers always start active.
async fn create_customer(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    let customer = state
        .repo
        .create_customer(NewCustomer::new(req.external_id, req.score))
        .await?;

    tracing::info!(customer = %customer.external_id, score = %customer.score, "customer created");
    Ok((StatusCode::CREATED, Json(customer.into())))
}

/// GET /customers/{external_id}
async fn get_customer(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<CustomerResponse>, AppError> {
    let customer = state
        .repo
        .get_customer(&external_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("customer {external_id}")))?;

    Ok(Json(customer.into()))
}

/// GET /customers/{external_id}/balance
/// Total open debt and remaining credit.
async fn customer_balance(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<CustomerBalance>, AppError> {
    let balance = state
        .repo
        .customer_balance(&external_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("customer {external_id}")))?;

    Ok(Json(balance))
}

/// POST /customers/upload
/// Multipart form with a `file` field holding `external_id,score[,preapproved_at]` lines.
async fn upload_customers(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportSummary>, AppError> {
    let mut multipart = multipart?;
    let mut raw = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::field("file", e.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::field("file", e.body_text()))?;
            raw = Some(bytes);
            break;
        }
    }

    let bytes = raw.ok_or_else(|| AppError::field("file", "No file was submitted."))?;
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| AppError::field("file", "The submitted file is not valid UTF-8 text."))?;

    let summary = import_customers(state.repo.as_ref(), content).await?;
    tracing::info!(
        created = summary.created.len(),
        errors = summary.errors.len(),
        "customer import finished"
    );
    Ok(Json(summary))
}
