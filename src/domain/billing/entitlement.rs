//! Entitlement projection: the current access state for one user and product.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::catalog::{PlanType, ProductKey, Provider};
use super::event::{EventId, EventType};
use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// Access state of an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// No grant has ever been applied.
    #[default]
    None,
    Active,
    Revoked,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::None => "none",
            EntitlementStatus::Active => "active",
            EntitlementStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitlementStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EntitlementStatus::None),
            "active" => Ok(EntitlementStatus::Active),
            "revoked" => Ok(EntitlementStatus::Revoked),
            other => Err(ValidationError::unknown_value("status", other)),
        }
    }
}

/// Current entitlement for a (user, product) pair, derived from the ledger.
///
/// Never written directly: every change goes through the projector, and the
/// whole record can be rebuilt by replaying the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementProjection {
    pub user_id: UserId,
    pub product_key: ProductKey,
    pub plan_type: PlanType,
    pub status: EntitlementStatus,
    pub provider: Option<Provider>,
    pub provider_customer_id: Option<String>,
    pub provider_account_id: Option<String>,
    pub active_from: Option<Timestamp>,
    pub active_until: Option<Timestamp>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub auto_renew: Option<bool>,
    pub last_event_id: Option<EventId>,
    pub last_event_type: Option<EventType>,
    /// Incremented once per applied event; 0 means never written.
    pub version: i64,
    pub updated_at: Option<Timestamp>,
}

impl EntitlementProjection {
    /// The projection that exists before any event has been applied.
    pub fn empty(user_id: UserId, product_key: ProductKey) -> Self {
        Self {
            user_id,
            product_key,
            plan_type: product_key.default_plan_type(),
            status: EntitlementStatus::None,
            provider: None,
            provider_customer_id: None,
            provider_account_id: None,
            active_from: None,
            active_until: None,
            period_start: None,
            period_end: None,
            auto_renew: None,
            last_event_id: None,
            last_event_type: None,
            version: 0,
            updated_at: None,
        }
    }

    /// True only while the entitlement is active.
    pub fn has_access(&self) -> bool {
        self.status == EntitlementStatus::Active
    }

    /// Checks the structural invariants every persisted projection satisfies.
    ///
    /// Returns a description of the first violated rule.
    pub fn check_invariants(&self) -> Result<(), String> {
        match self.status {
            EntitlementStatus::None => {
                if self.provider.is_some()
                    || self.provider_customer_id.is_some()
                    || self.provider_account_id.is_some()
                {
                    return Err("status none must not carry provider identity".to_string());
                }
            }
            EntitlementStatus::Active => {
                if self.provider.is_none() {
                    return Err("active entitlement requires a provider".to_string());
                }
                if self.active_from.is_none() {
                    return Err("active entitlement requires active_from".to_string());
                }
                if self.active_until.is_some() {
                    return Err("active entitlement must not have active_until".to_string());
                }
            }
            EntitlementStatus::Revoked => {
                if self.provider.is_none() {
                    return Err("revoked entitlement requires a provider".to_string());
                }
                if self.active_until.is_none() {
                    return Err("revoked entitlement requires active_until".to_string());
                }
            }
        }

        if self.plan_type == PlanType::OneTime
            && (self.period_start.is_some() || self.period_end.is_some() || self.auto_renew.is_some())
        {
            return Err("one_time entitlement must not carry period fields".to_string());
        }

        if self.version < 0 {
            return Err(format!("version must not be negative, got {}", self.version));
        }
        if self.version > 0 && self.last_event_id.is_none() {
            return Err("written projection requires last_event_id".to_string());
        }

        Ok(())
    }
}
