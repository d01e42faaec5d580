use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tandem_shared::Cents;

use crate::CoreError;

/// Runtime switches editable from the back-office
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSettings {
    pub maintenance_mode: bool,
    pub coming_soon: bool,
    pub max_commission_levels: i32,
    pub strict_referrals: bool,
    pub min_payout_cents: Cents,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPlacement {
    Head,
    Body,
}

impl ScriptPlacement {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptPlacement::Head => "head",
            ScriptPlacement::Body => "body",
        }
    }
}

impl FromStr for ScriptPlacement {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(ScriptPlacement::Head),
            "body" => Ok(ScriptPlacement::Body),
            other => Err(CoreError::UnknownVariant { kind: "script placement", value: other.to_string() }),
        }
    }
}

/// Third-party tag (analytics, pixels) injected by the storefront
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvertisingScript {
    pub id: Uuid,
    pub name: String,
    pub placement: ScriptPlacement,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsConsent {
    pub user_id: Uuid,
    pub analytics: bool,
    pub marketing: bool,
    pub updated_at: DateTime<Utc>,
}

impl AnalyticsConsent {
    /// No consent is recorded until the user answers the banner.
    pub fn denied(user_id: Uuid) -> Self {
        Self { user_id, analytics: false, marketing: false, updated_at: Utc::now() }
    }
}
