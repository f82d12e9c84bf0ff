//! Audit trail emission.
//!
//! Audit writes are fire-and-forget: a failed append is logged and
//! swallowed so that bookkeeping can never break a record mutation or an
//! import run.

use chrono::Utc;
use tracing::warn;

use crate::models::{AuditEvent, RecordType};
use crate::store::CatalogStore;

/// Append an audit event; failures are logged and swallowed.
#[allow(clippy::too_many_arguments)]
pub async fn emit(
    store: &dyn CatalogStore,
    record_id: &str,
    record_type: RecordType,
    action: &str,
    actor: &str,
    diff: Option<serde_json::Value>,
    correlation_id: Option<String>,
) {
    let event = AuditEvent {
        timestamp: Utc::now(),
        actor: actor.to_string(),
        record_type,
        record_id: record_id.to_string(),
        action: action.to_string(),
        diff,
        correlation_id,
    };

    if let Err(e) = store.append_audit(&event).await {
        warn!(
            record_id = event.record_id,
            action = event.action,
            error = %e,
            "failed to write audit event"
        );
    }
}
