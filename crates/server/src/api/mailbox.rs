//! Push endpoint of the webhook mailbox.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::debug;
use triage_core::{InboundMail, IngestReceipt};

use crate::metrics::WEBHOOK_MAILS;
use crate::state::AppState;

/// Accept one mail notification from the mail system.
///
/// Always 202: a mail that arrives while no session is listening is
/// acknowledged with `delivered: false` and dropped.
pub async fn ingest_notification(
    State(state): State<Arc<AppState>>,
    Json(mail): Json<InboundMail>,
) -> (StatusCode, Json<IngestReceipt>) {
    let receipt = state.mailbox().ingest(mail);
    WEBHOOK_MAILS
        .with_label_values(&[if receipt.delivered { "true" } else { "false" }])
        .inc();
    debug!(item_id = %receipt.item_id, delivered = receipt.delivered, "Webhook mail ingested");
    (StatusCode::ACCEPTED, Json(receipt))
}
