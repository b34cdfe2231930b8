//! # Receipt Payload
//!
//! The receipt entity as carried through the sync queue, plus the warranty
//! expiry math the app surfaces on receipt cards.
//!
//! The sync layer itself treats payloads as opaque JSON; this type exists so
//! embedders and tests have a concrete, validated payload to enqueue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Receipt
// =============================================================================

/// A purchase receipt tracked by the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    /// Unique identifier.
    pub id: String,

    /// Merchant the purchase was made at.
    pub merchant: String,

    /// Total in cents. Integer money, never floats.
    pub total_cents: i64,

    /// When the purchase happened.
    pub purchased_at: DateTime<Utc>,

    /// Optional user-assigned category (electronics, groceries, ...).
    pub category: Option<String>,

    /// Warranty length in months, if the item carries one.
    pub warranty_months: Option<u32>,

    /// URI of the captured receipt image, if any.
    pub image_uri: Option<String>,
}

impl Receipt {
    /// Validates the receipt before it is enqueued.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::EmptyReceiptId);
        }
        if self.merchant.trim().is_empty() {
            return Err(CoreError::InvalidReceipt("merchant is empty".into()));
        }
        if self.total_cents < 0 {
            return Err(CoreError::InvalidReceipt(format!(
                "negative total: {} cents",
                self.total_cents
            )));
        }
        Ok(())
    }

    /// When the warranty runs out, if the receipt has one.
    ///
    /// Months are approximated as 30 days, matching the coarse granularity
    /// the app displays.
    pub fn warranty_expires_at(&self) -> Option<DateTime<Utc>> {
        self.warranty_months
            .map(|months| self.purchased_at + Duration::days(30 * i64::from(months)))
    }

    /// Current warranty standing relative to `now`.
    pub fn warranty_standing(&self, now: DateTime<Utc>) -> Option<WarrantyStanding> {
        let expires_at = self.warranty_expires_at()?;
        let days_remaining = (expires_at - now).num_days();

        let status = if days_remaining <= 0 {
            WarrantyStatus::Expired
        } else if days_remaining <= 90 {
            WarrantyStatus::Expiring
        } else {
            WarrantyStatus::Active
        };

        Some(WarrantyStanding {
            expires_at,
            days_remaining,
            status,
        })
    }
}

// =============================================================================
// Warranty Standing
// =============================================================================

/// Coarse warranty status buckets shown as badges in the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum WarrantyStatus {
    /// More than 90 days remaining.
    Active,

    /// 90 days or fewer remaining.
    Expiring,

    /// Past the expiry date.
    Expired,
}

/// Computed warranty position for a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WarrantyStanding {
    /// When the warranty runs out.
    pub expires_at: DateTime<Utc>,

    /// Days until expiry; negative once expired.
    pub days_remaining: i64,

    /// Bucketed status.
    pub status: WarrantyStatus,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(warranty_months: Option<u32>) -> Receipt {
        Receipt {
            id: "r1".into(),
            merchant: "Hardware Depot".into(),
            total_cents: 12_99,
            purchased_at: Utc::now(),
            category: Some("tools".into()),
            warranty_months,
            image_uri: None,
        }
    }

    #[test]
    fn test_validate() {
        assert!(receipt(None).validate().is_ok());

        let mut bad = receipt(None);
        bad.id = "  ".into();
        assert!(matches!(bad.validate(), Err(CoreError::EmptyReceiptId)));

        let mut bad = receipt(None);
        bad.merchant = String::new();
        assert!(bad.validate().is_err());

        let mut bad = receipt(None);
        bad.total_cents = -1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_no_warranty_means_no_standing() {
        assert!(receipt(None).warranty_expires_at().is_none());
        assert!(receipt(None).warranty_standing(Utc::now()).is_none());
    }

    #[test]
    fn test_warranty_buckets() {
        let r = receipt(Some(12)); // ~360 days
        let standing = r.warranty_standing(Utc::now()).unwrap();
        assert_eq!(standing.status, WarrantyStatus::Active);

        // 11 months in, inside the 90-day window
        let later = Utc::now() + Duration::days(300);
        let standing = r.warranty_standing(later).unwrap();
        assert_eq!(standing.status, WarrantyStatus::Expiring);

        // Past expiry
        let much_later = Utc::now() + Duration::days(400);
        let standing = r.warranty_standing(much_later).unwrap();
        assert_eq!(standing.status, WarrantyStatus::Expired);
        assert!(standing.days_remaining <= 0);
    }
}
