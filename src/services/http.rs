use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::trace::TraceLayer;

use super::customers::CustomerRequest;
use super::ingestion::IngestionRequest;
use super::jobs::JobsRequest;
use super::notifications::NotificationRequest;
use super::payments::PaymentRequest;
use super::ServiceError;
use crate::models::customers::{RegisterCustomer, UpdateCustomer};
use crate::models::payments::{ImagePayment, ManualPayment, StatusUpdate};
use crate::models::webhook::{strip_channel_prefix, InboundMessage, VerifyParams};

#[derive(Clone)]
struct AppState {
    ingestion_channel: mpsc::Sender<IngestionRequest>,
    payment_channel: mpsc::Sender<PaymentRequest>,
    customer_channel: mpsc::Sender<CustomerRequest>,
    notification_channel: mpsc::Sender<NotificationRequest>,
    jobs_channel: mpsc::Sender<JobsRequest>,
    verify_token: String,
}

/// Sends one request to a service and waits for its reply.
async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("Http".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("Http".to_string(), e.to_string()))?
}

fn error_response(error: ServiceError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::AccessDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("Request failed: {}", error);
        return (status, Json(json!({"error": "Internal server error."})));
    }

    (status, Json(json!({"error": error.to_string()})))
}

fn respond<T: Serialize>(result: Result<T, ServiceError>, success: StatusCode) -> (StatusCode, Json<Value>) {
    match result {
        Ok(value) => (success, Json(json!(value))),
        Err(e) => error_response(e),
    }
}

/// Session issuance lives upstream; the authenticated operator id arrives in
/// a trusted header.
fn user_id(headers: &HeaderMap) -> Result<String, (StatusCode, Json<Value>)> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing x-user-id header"})),
        ))
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match (params.verify_token, params.challenge) {
        (Some(token), Some(challenge)) if token == state.verify_token => {
            (StatusCode::OK, challenge)
        }
        _ => (StatusCode::FORBIDDEN, "Verification failed".to_string()),
    }
}

/// The gateway redelivers on anything but success, so every event that
/// reaches the pipeline is acknowledged with 200 regardless of how it was
/// classified. Only a dead ingestion channel answers 500.
async fn receive_webhook(
    State(state): State<AppState>,
    Form(inbound): Form<InboundMessage>,
) -> impl IntoResponse {
    let sender_phone = strip_channel_prefix(&inbound.from).to_string();
    let recipient_number = strip_channel_prefix(&inbound.to).to_string();

    let (response_tx, response_rx) = oneshot::channel();

    let sent = state
        .ingestion_channel
        .send(IngestionRequest::InboundMessage {
            sender_phone,
            recipient_number,
            media_url: inbound.media_url,
            response: response_tx,
        })
        .await;

    if let Err(e) = sent {
        log::error!("Ingestion channel unavailable: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook");
    }

    match response_rx.await {
        Ok(outcome) => log::info!("Webhook processed: {:?}", outcome),
        Err(e) => log::error!("Ingestion pipeline dropped the event: {}", e),
    }

    (StatusCode::OK, "OK")
}

async fn create_manual_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payment): Json<ManualPayment>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.payment_channel, |response| PaymentRequest::ManualEntry {
        user_id,
        payment,
        response,
    })
    .await;

    respond(result, StatusCode::CREATED)
}

async fn create_payment_from_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ImagePayment>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.payment_channel, |response| PaymentRequest::FromImage {
        user_id,
        request,
        response,
    })
    .await;

    respond(result, StatusCode::CREATED)
}

async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.payment_channel, |response| PaymentRequest::Get {
        user_id,
        payment_id,
        response,
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn update_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.payment_channel, |response| PaymentRequest::UpdateStatus {
        user_id,
        payment_id,
        status: update.status,
        response,
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn list_business_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.payment_channel, |response| {
        PaymentRequest::ListForBusiness {
            user_id,
            business_id,
            response,
        }
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn register_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterCustomer>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.customer_channel, |response| CustomerRequest::Register {
        user_id,
        request,
        response,
    })
    .await;

    respond(result, StatusCode::CREATED)
}

async fn list_business_customers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.customer_channel, |response| CustomerRequest::List {
        user_id,
        business_id,
        response,
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn get_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(customer_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.customer_channel, |response| CustomerRequest::Get {
        user_id,
        customer_id,
        response,
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn update_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(customer_id): Path<String>,
    Json(update): Json<UpdateCustomer>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.customer_channel, |response| CustomerRequest::Update {
        user_id,
        customer_id,
        update,
        response,
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn delete_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(customer_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.customer_channel, |response| CustomerRequest::Delete {
        user_id,
        customer_id,
        response,
    })
    .await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": "Customer deleted successfully"})),
        ),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct NotificationFilter {
    is_read: Option<bool>,
}

async fn list_business_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(filter): Query<NotificationFilter>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.notification_channel, |response| {
        NotificationRequest::ListForBusiness {
            user_id,
            business_id,
            is_read: filter.is_read,
            response,
        }
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.notification_channel, |response| {
        NotificationRequest::MarkRead {
            user_id,
            notification_id,
            response,
        }
    })
    .await;

    respond(result, StatusCode::OK)
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return e,
    };

    let result = dispatch(&state.notification_channel, |response| {
        NotificationRequest::MarkAllRead {
            user_id,
            business_id,
            response,
        }
    })
    .await;

    match result {
        Ok(updated) => (StatusCode::OK, Json(json!({"updated": updated}))),
        Err(e) => error_response(e),
    }
}

async fn trigger_overdue_scan(State(state): State<AppState>) -> impl IntoResponse {
    let result = dispatch(&state.jobs_channel, |response| JobsRequest::RunOverdueScan {
        response,
    })
    .await;

    match result {
        Ok(flagged) => (StatusCode::OK, Json(json!({"ok": true, "flagged": flagged}))),
        Err(e) => error_response(e),
    }
}

async fn trigger_metrics_recalculation(State(state): State<AppState>) -> impl IntoResponse {
    let result = dispatch(&state.jobs_channel, |response| {
        JobsRequest::RunMetricsRecalculation { response }
    })
    .await;

    match result {
        Ok(recalculated) => (StatusCode::OK, Json(json!({"ok": true, "result": recalculated}))),
        Err(e) => error_response(e),
    }
}

pub async fn start_http_server(
    listen_addr: &str,
    verify_token: String,
    ingestion_channel: mpsc::Sender<IngestionRequest>,
    payment_channel: mpsc::Sender<PaymentRequest>,
    customer_channel: mpsc::Sender<CustomerRequest>,
    notification_channel: mpsc::Sender<NotificationRequest>,
    jobs_channel: mpsc::Sender<JobsRequest>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        ingestion_channel,
        payment_channel,
        customer_channel,
        notification_channel,
        jobs_channel,
        verify_token,
    };

    let app = Router::new()
        .route("/api/webhook", get(verify_webhook).post(receive_webhook))
        .route("/api/payments", post(create_manual_payment))
        .route("/api/payments/from-image", post(create_payment_from_image))
        .route("/api/payments/{payment_id}", get(get_payment))
        .route("/api/payments/{payment_id}/status", put(update_payment_status))
        .route("/api/businesses/{business_id}/payments", get(list_business_payments))
        .route("/api/customers", post(register_customer))
        .route("/api/businesses/{business_id}/customers", get(list_business_customers))
        .route(
            "/api/customers/{customer_id}",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route(
            "/api/businesses/{business_id}/notifications",
            get(list_business_notifications),
        )
        .route(
            "/api/notifications/{notification_id}/read",
            put(mark_notification_read),
        )
        .route(
            "/api/businesses/{business_id}/notifications/read-all",
            put(mark_all_notifications_read),
        )
        .route("/api/dev/jobs/overdue", post(trigger_overdue_scan))
        .route("/api/dev/jobs/metrics", post(trigger_metrics_recalculation))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    let mut shutdown = shutdown;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}
