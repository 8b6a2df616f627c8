use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};

use crate::repositories::extraction::ExtractionRepository;
use crate::repositories::whatsapp::WhatsappRepository;
use crate::settings::Settings;

mod customers;
mod http;
mod ingestion;
mod jobs;
mod notifications;
mod payments;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("External service error: {0} -> {1} => {2}")]
    ExternalService(String, String, String),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Access denied")]
    AccessDenied,
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(
    pool: PgPool,
    settings: Settings,
    shutdown: watch::Receiver<bool>,
) -> Result<(), anyhow::Error> {
    let (ingestion_tx, mut ingestion_rx) = mpsc::channel(512);
    let (payment_tx, mut payment_rx) = mpsc::channel(512);
    let (customer_tx, mut customer_rx) = mpsc::channel(512);
    let (notification_tx, mut notification_rx) = mpsc::channel(512);
    let (jobs_tx, mut jobs_rx) = mpsc::channel(512);

    let extraction = Arc::new(ExtractionRepository::new(
        settings.anthropic.clone(),
        settings.twilio.clone(),
    ));
    let whatsapp = Arc::new(WhatsappRepository::new(
        settings.twilio.clone(),
        settings.messages.clone(),
    ));

    log::info!("Starting ingestion service.");
    let ingestion_pool = pool.clone();
    let ingestion_extraction = extraction.clone();
    let ingestion_whatsapp = whatsapp.clone();
    let ingestion_grace_days = settings.jobs.grace_days;
    tokio::spawn(async move {
        let mut service = ingestion::IngestionService::new();
        service
            .run(
                ingestion::IngestionRequestHandler::new(
                    ingestion_pool,
                    ingestion_extraction,
                    ingestion_whatsapp,
                    ingestion_grace_days,
                ),
                &mut ingestion_rx,
            )
            .await;
    });

    log::info!("Starting payment service.");
    let payment_pool = pool.clone();
    let payment_extraction = extraction.clone();
    let payment_grace_days = settings.jobs.grace_days;
    tokio::spawn(async move {
        let mut service = payments::PaymentService::new();
        service
            .run(
                payments::PaymentRequestHandler::new(
                    payment_pool,
                    payment_extraction,
                    payment_grace_days,
                ),
                &mut payment_rx,
            )
            .await;
    });

    log::info!("Starting customer service.");
    let customer_pool = pool.clone();
    tokio::spawn(async move {
        let mut service = customers::CustomerService::new();
        service
            .run(
                customers::CustomerRequestHandler::new(customer_pool),
                &mut customer_rx,
            )
            .await;
    });

    log::info!("Starting notification service.");
    let notification_pool = pool.clone();
    tokio::spawn(async move {
        let mut service = notifications::NotificationService::new();
        service
            .run(
                notifications::NotificationRequestHandler::new(notification_pool),
                &mut notification_rx,
            )
            .await;
    });

    log::info!("Starting maintenance jobs.");
    let jobs_pool = pool.clone();
    let jobs_config = settings.jobs.clone();
    let jobs_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let handler = jobs::JobsRequestHandler::new(jobs_pool, jobs_config);
        handler.start_schedulers(jobs_shutdown);

        let mut service = jobs::JobsService::new();
        service.run(handler, &mut jobs_rx).await;
    });

    log::info!("Starting HTTP server.");
    let http_shutdown = shutdown.clone();
    let listen_addr = settings.http.listen_addr.clone();
    let verify_token = settings.webhook.verify_token.clone();
    tokio::spawn(async move {
        if let Err(e) = http::start_http_server(
            &listen_addr,
            verify_token,
            ingestion_tx,
            payment_tx,
            customer_tx,
            notification_tx,
            jobs_tx,
            http_shutdown,
        )
        .await
        {
            log::error!("HTTP server stopped: {}", e);
        }
    });

    log::info!("All services started.");
    Ok(())
}
