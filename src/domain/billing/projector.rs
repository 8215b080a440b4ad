//! Entitlement projector.
//!
//! Pure function from (current projection, event) to next projection. The
//! same ordered history always yields the same projection, which is what
//! makes the projection re-derivable from the ledger.

use super::catalog::{PlanType, ProductKey};
use super::entitlement::{EntitlementProjection, EntitlementStatus};
use super::errors::BillingError;
use super::event::CanonicalEvent;
use crate::domain::foundation::UserId;

/// Applies one event to a projection.
///
/// # Errors
///
/// Returns `InvariantViolation` if the event belongs to a different
/// (user, product) or if the resulting projection breaks a structural rule.
pub fn apply(
    current: &EntitlementProjection,
    event: &CanonicalEvent,
) -> Result<EntitlementProjection, BillingError> {
    if current.user_id != event.user_id || current.product_key != event.product_key {
        return Err(BillingError::InvariantViolation(format!(
            "event {} targets {}/{} but projection is {}/{}",
            event.event_id, event.user_id, event.product_key, current.user_id, current.product_key
        )));
    }

    let mut next = current.clone();
    let event_type = event.event_type();

    next.product_key = event.product_key;
    next.plan_type = event.plan_type;
    next.last_event_id = Some(event.event_id.clone());
    next.last_event_type = Some(event_type);
    next.updated_at = Some(event.received_at);
    next.version = current.version + 1;

    if event_type.is_grant() {
        next.status = EntitlementStatus::Active;
        next.provider = Some(event.provider);
        if next.active_from.is_none() {
            next.active_from = Some(event.occurred_at);
        }
        next.active_until = None;

        if let Some(customer_id) = event.payload.customer_id() {
            next.provider_customer_id = Some(customer_id.to_string());
        }
        if let Some(account_id) = event.payload.account_id() {
            next.provider_account_id = Some(account_id.to_string());
        }

        if event.plan_type.is_subscription() {
            if let Some(period) = event.payload.subscription() {
                next.period_start = Some(period.period_start);
                next.period_end = Some(period.period_end);
                next.auto_renew = Some(period.auto_renew);
            }
        }
    } else if event_type.is_revocation() {
        next.status = EntitlementStatus::Revoked;
        next.active_until = Some(event.occurred_at);
        if next.provider.is_none() {
            next.provider = Some(event.provider);
        }
    }

    if next.plan_type == PlanType::OneTime {
        next.period_start = None;
        next.period_end = None;
        next.auto_renew = None;
    }

    next.check_invariants().map_err(|reason| {
        BillingError::InvariantViolation(format!("after {}: {}", event.event_id, reason))
    })?;

    Ok(next)
}

/// Rebuilds a projection by folding an ordered history from empty.
pub fn replay<'a>(
    user_id: &UserId,
    product_key: ProductKey,
    events: impl IntoIterator<Item = &'a CanonicalEvent>,
) -> Result<EntitlementProjection, BillingError> {
    events
        .into_iter()
        .try_fold(EntitlementProjection::empty(user_id.clone(), product_key), |current, event| {
            apply(&current, event)
        })
}
