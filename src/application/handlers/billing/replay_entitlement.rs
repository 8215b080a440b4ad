//! ReplayEntitlementHandler - Rebuilds a projection from the ledger and
//! compares it with the stored one.

use std::sync::Arc;

use crate::domain::billing::{projector, BillingError, EntitlementProjection, ProductKey};
use crate::domain::foundation::UserId;
use crate::ports::BillingStore;

/// Query to verify one projection against its ledger.
#[derive(Debug, Clone)]
pub struct ReplayEntitlementQuery {
    pub user_id: UserId,
    pub product_key: ProductKey,
}

/// Outcome of a replay.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Projection folded from the ledger.
    pub rebuilt: EntitlementProjection,
    /// Projection currently stored, if any.
    pub stored: Option<EntitlementProjection>,
    /// True when `rebuilt` equals the stored projection (or the empty one
    /// when nothing is stored).
    pub consistent: bool,
    pub event_count: usize,
}

/// Handler for replay verification. Never writes.
pub struct ReplayEntitlementHandler {
    store: Arc<dyn BillingStore>,
}

impl ReplayEntitlementHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: ReplayEntitlementQuery) -> Result<ReplayReport, BillingError> {
        let events = self
            .store
            .list_events(&query.user_id, query.product_key)
            .await?;
        let rebuilt = projector::replay(
            &query.user_id,
            query.product_key,
            events.iter().map(|row| &row.event),
        )?;

        let stored = self
            .store
            .find_entitlement(&query.user_id, query.product_key)
            .await?;
        let consistent = match &stored {
            Some(stored) => stored == &rebuilt,
            None => rebuilt == EntitlementProjection::empty(query.user_id.clone(), query.product_key),
        };

        if !consistent {
            tracing::warn!(
                user_id = %query.user_id,
                product_key = %query.product_key,
                event_count = events.len(),
                "Stored entitlement differs from ledger replay"
            );
        }

        Ok(ReplayReport {
            rebuilt,
            stored,
            consistent,
            event_count: events.len(),
        })
    }
}
