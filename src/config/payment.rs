//! Payment provider configuration

use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;
use crate::adapters::stripe::StripeConfig;
use crate::domain::billing::ProductKey;

/// Stripe configuration
#[derive(Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Allowed clock distance for signed webhook timestamps
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    pub lifetime_price_id: Option<String>,

    pub pro_monthly_price_id: Option<String>,

    pub pro_annual_price_id: Option<String>,

    /// Pages scanned by the restore lookup when search is unavailable
    #[serde(default = "default_restore_max_pages")]
    pub restore_max_pages: u32,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    /// Configured Stripe price for a product
    pub fn price_id(&self, product: ProductKey) -> Option<&str> {
        match product {
            ProductKey::Lifetime => self.lifetime_price_id.as_deref(),
            ProductKey::ProMonthly => self.pro_monthly_price_id.as_deref(),
            ProductKey::ProAnnual => self.pro_annual_price_id.as_deref(),
        }
    }

    /// Adapter configuration for the Stripe provider
    pub fn stripe_config(&self) -> StripeConfig {
        let config = StripeConfig::new(
            SecretString::new(self.stripe_api_key.clone()),
            SecretString::new(self.stripe_webhook_secret.clone()),
        )
        .with_base_url(&self.api_base_url)
        .with_signature_tolerance(self.signature_tolerance_secs)
        .with_restore_max_pages(self.restore_max_pages)
        .with_require_livemode(self.is_live_mode());

        ProductKey::ALL
            .iter()
            .fold(config, |config, product| match self.price_id(*product) {
                Some(price) => config.with_price_id(*product, price),
                None => config,
            })
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if !(1..=3600).contains(&self.signature_tolerance_secs) {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidApiBaseUrl);
        }
        if !(1..=50).contains(&self.restore_max_pages) {
            return Err(ValidationError::InvalidRestorePages);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            signature_tolerance_secs: default_signature_tolerance(),
            api_base_url: default_api_base_url(),
            lifetime_price_id: None,
            pro_monthly_price_id: None,
            pro_annual_price_id: None,
            restore_max_pages: default_restore_max_pages(),
        }
    }
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("stripe_api_key", &"[REDACTED]")
            .field("stripe_webhook_secret", &"[REDACTED]")
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .field("api_base_url", &self.api_base_url)
            .field("lifetime_price_id", &self.lifetime_price_id)
            .field("pro_monthly_price_id", &self.pro_monthly_price_id)
            .field("pro_annual_price_id", &self.pro_annual_price_id)
            .field("restore_max_pages", &self.restore_max_pages)
            .finish()
    }
}

fn default_signature_tolerance() -> i64 {
    300
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_restore_max_pages() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: "sk_test_abcd1234".to_string(),
            stripe_webhook_secret: "whsec_xyz789".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PaymentConfig::default();
        assert_eq!(config.signature_tolerance_secs, 300);
        assert_eq!(config.restore_max_pages, 5);
        assert_eq!(config.api_base_url, "https://api.stripe.com");
    }

    #[test]
    fn test_mode_detection() {
        assert!(valid().is_test_mode());
        let live = PaymentConfig {
            stripe_api_key: "sk_live_xxx".to_string(),
            ..valid()
        };
        assert!(live.is_live_mode());
        assert!(!live.is_test_mode());
    }

    #[test]
    fn test_price_lookup() {
        let config = PaymentConfig {
            pro_monthly_price_id: Some("price_monthly".to_string()),
            ..valid()
        };
        assert_eq!(config.price_id(ProductKey::ProMonthly), Some("price_monthly"));
        assert_eq!(config.price_id(ProductKey::Lifetime), None);
    }

    #[test]
    fn test_validation() {
        assert!(valid().validate().is_ok());
        assert_eq!(
            PaymentConfig::default().validate(),
            Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"))
        );
        assert_eq!(
            PaymentConfig {
                stripe_api_key: "pk_test_xxx".to_string(),
                ..valid()
            }
            .validate(),
            Err(ValidationError::InvalidStripeKey)
        );
        assert_eq!(
            PaymentConfig {
                stripe_webhook_secret: "secret_xxx".to_string(),
                ..valid()
            }
            .validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        );
        assert_eq!(
            PaymentConfig {
                signature_tolerance_secs: 0,
                ..valid()
            }
            .validate(),
            Err(ValidationError::InvalidSignatureTolerance)
        );
        assert_eq!(
            PaymentConfig {
                restore_max_pages: 0,
                ..valid()
            }
            .validate(),
            Err(ValidationError::InvalidRestorePages)
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("sk_test_abcd1234"));
        assert!(!rendered.contains("whsec_xyz789"));
    }
}
