//! Catalog enums shared by events and projections.
//!
//! Providers, purchasable products and plan types are closed sets; any string
//! arriving from the outside world is parsed into one of these or rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Payment provider that reported a billing fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Granted or revoked by an operator, no external system involved.
    Manual,
    /// Hosted checkout processor.
    Stripe,
    /// Apple in-app purchase.
    IosIap,
    /// Google Play in-app purchase.
    AndroidIap,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Manual => "manual",
            Provider::Stripe => "stripe",
            Provider::IosIap => "ios_iap",
            Provider::AndroidIap => "android_iap",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Provider::Manual),
            "stripe" => Ok(Provider::Stripe),
            "ios_iap" => Ok(Provider::IosIap),
            "android_iap" => Ok(Provider::AndroidIap),
            other => Err(ValidationError::unknown_value("provider", other)),
        }
    }
}

/// Whether a product is bought once or renews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    OneTime,
    Subscription,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::OneTime => "one_time",
            PlanType::Subscription => "subscription",
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self, PlanType::Subscription)
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(PlanType::OneTime),
            "subscription" => Ok(PlanType::Subscription),
            other => Err(ValidationError::unknown_value("plan_type", other)),
        }
    }
}

/// Product a user can hold an entitlement for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKey {
    /// Lifetime access, single payment.
    Lifetime,
    /// Pro features, billed monthly.
    ProMonthly,
    /// Pro features, billed yearly.
    ProAnnual,
}

impl ProductKey {
    /// Every product in the catalog.
    pub const ALL: [ProductKey; 3] = [
        ProductKey::Lifetime,
        ProductKey::ProMonthly,
        ProductKey::ProAnnual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKey::Lifetime => "lifetime",
            ProductKey::ProMonthly => "pro_monthly",
            ProductKey::ProAnnual => "pro_annual",
        }
    }

    /// Plan type used when the provider does not say otherwise.
    pub fn default_plan_type(&self) -> PlanType {
        match self {
            ProductKey::Lifetime => PlanType::OneTime,
            ProductKey::ProMonthly | ProductKey::ProAnnual => PlanType::Subscription,
        }
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductKey::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::unknown_value("product_key", s))
    }
}
