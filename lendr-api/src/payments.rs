use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lendr_core::{NewPayment, Payment, PaymentDetail, PaymentStatus};

use crate::{error::AppError, state::AppState, ApiJson, CustomerFilter};

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentDetailResponse {
    pub loan_external_id: String,
    pub amount: Decimal,
}

impl From<PaymentDetail> for PaymentDetailResponse {
    fn from(d: PaymentDetail) -> Self {
        Self {
            loan_external_id: d.loan_external_id,
            amount: d.amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub external_id: String,
    pub customer_external_id: String,
    pub total_amount: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub payment_details: Vec<PaymentDetailResponse>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            external_id: p.external_id,
            customer_external_id: p.customer_external_id,
            total_amount: p.total_amount,
            status: p.status,
            paid_at: p.paid_at,
            created_at: p.created_at,
            payment_details: p.details.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments).post(create_payment))
        .route("/payments/{external_id}", get(get_payment))
}

/// GET /payments?customer_external_id=
async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<CustomerFilter>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    let payments = state.repo.list_payments(filter.as_deref()).await?;
    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}

/// POST /payments
/// A payment larger than the customer's open debt is stored as REJECTED.
async fn create_payment(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewPayment>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let payment = state.repo.create_payment(req).await?;

    match payment.status {
        PaymentStatus::Completed => tracing::info!(
            payment = %payment.external_id,
            customer = %payment.customer_external_id,
            total = %payment.total_amount,
            loans = payment.details.len(),
            "payment allocated"
        ),
        PaymentStatus::Rejected => tracing::warn!(
            payment = %payment.external_id,
            customer = %payment.customer_external_id,
            total = %payment.total_amount,
            "payment exceeds open debt, recorded as rejected"
        ),
    }

    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// GET /payments/{external_id}
async fn get_payment(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .repo
        .get_payment(&external_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("payment {external_id}")))?;

    Ok(Json(payment.into()))
}
