//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::TokenVerifier;
use crate::brand::BrandService;
use crate::collaboration::CollaborationService;
use crate::config::Config;
use crate::document::{DocumentService, HttpPdfRenderer, JsonSnapshotRenderer, PdfRenderer};
use crate::negotiation::NegotiationService;
use crate::notification::{DatabaseSink, NotificationSink, Notifier};
use crate::reconciliation::{BankFeed, HttpBankFeed, ReconciliationService};
use crate::reference::ReferenceGenerator;
use crate::storage::{FileStore, LocalFileStore};
use crate::talent::TalentService;
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub talent_service: Arc<TalentService>,
    pub brand_service: Arc<BrandService>,
    pub negotiation_service: Arc<NegotiationService>,
    pub collaboration_service: Arc<CollaborationService>,
    pub document_service: Arc<DocumentService>,
    pub reconciliation_service: Arc<ReconciliationService>,
    pub notifier: Notifier,
    pub token_verifier: Arc<TokenVerifier>,
    pub ws_state: WsState,
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Wire every service from the configuration
    pub fn from_config(config: &Config, db_pool: PgPool, ws_state: WsState) -> Self {
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![
            Arc::new(DatabaseSink::new(db_pool.clone())),
            Arc::new(ws_state.clone()),
        ];
        let notifier = Notifier::new(db_pool.clone(), sinks);
        let references = ReferenceGenerator::new(db_pool.clone(), config.reference_retry_budget);

        let renderer: Arc<dyn PdfRenderer> = match &config.pdf_renderer_url {
            Some(url) => Arc::new(HttpPdfRenderer::new(url.clone())),
            None => {
                tracing::warn!("PDF_RENDERER_URL not set, documents are stored as JSON snapshots");
                Arc::new(JsonSnapshotRenderer)
            }
        };
        let files: Arc<dyn FileStore> =
            Arc::new(LocalFileStore::new(config.document_storage_dir.clone()));
        let bank_feed: Option<Arc<dyn BankFeed>> = config.bank_feed_url.as_ref().map(|url| {
            Arc::new(HttpBankFeed::new(url.clone(), config.bank_feed_token.clone()))
                as Arc<dyn BankFeed>
        });

        Self {
            talent_service: Arc::new(TalentService::new(db_pool.clone())),
            brand_service: Arc::new(BrandService::new(db_pool.clone())),
            negotiation_service: Arc::new(NegotiationService::new(
                db_pool.clone(),
                references.clone(),
                notifier.clone(),
            )),
            collaboration_service: Arc::new(CollaborationService::new(
                db_pool.clone(),
                notifier.clone(),
            )),
            document_service: Arc::new(DocumentService::new(
                db_pool.clone(),
                references,
                notifier.clone(),
                renderer,
                files,
                config.default_payment_terms_days,
            )),
            reconciliation_service: Arc::new(ReconciliationService::new(
                db_pool.clone(),
                bank_feed,
                notifier.clone(),
            )),
            notifier,
            token_verifier: Arc::new(TokenVerifier::new(config.jwt_secret.clone())),
            ws_state,
            webhook_secret: config.webhook_secret.clone(),
            db_pool,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Notifier {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notifier.clone()
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.token_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<TalentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.talent_service.clone()
    }
}

impl FromRef<AppState> for Arc<BrandService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.brand_service.clone()
    }
}

impl FromRef<AppState> for Arc<NegotiationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.negotiation_service.clone()
    }
}

impl FromRef<AppState> for Arc<CollaborationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.collaboration_service.clone()
    }
}

impl FromRef<AppState> for Arc<DocumentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.document_service.clone()
    }
}

impl FromRef<AppState> for Arc<ReconciliationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciliation_service.clone()
    }
}
