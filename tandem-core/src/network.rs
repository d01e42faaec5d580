use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tandem_shared::{BasisPoints, Masked};

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Member,
    Admin,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Member => "member",
            ProfileRole::Admin => "admin",
        }
    }
}

impl FromStr for ProfileRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(ProfileRole::Member),
            "admin" => Ok(ProfileRole::Admin),
            other => Err(CoreError::UnknownVariant { kind: "profile role", value: other.to_string() }),
        }
    }
}

/// A platform user. `sponsor_id` links to the upline in the referral tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: Masked<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub referral_code: String,
    pub sponsor_id: Option<Uuid>,
    pub role: ProfileRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(email: String, referral_code: String, sponsor_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: Masked(email),
            full_name: None,
            phone: None,
            referral_code,
            sponsor_id,
            role: ProfileRole::Member,
            created_at: now,
            updated_at: now,
        }
    }

    /// Referral codes are compared trimmed and case-insensitively.
    pub fn referral_code_matches(&self, candidate: &str) -> bool {
        self.referral_code.trim().eq_ignore_ascii_case(candidate.trim())
    }
}

/// Fields a member may change on their own profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Waitlisted,
    Inactive,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Waitlisted => "waitlisted",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "waitlisted" => Ok(SubscriptionStatus::Waitlisted),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(CoreError::UnknownVariant { kind: "subscription status", value: other.to_string() }),
        }
    }
}

/// Membership of the compensation plan. Only `Active` members sponsor and earn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub phase: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user_id: Uuid, status: SubscriptionStatus, phase: i32) -> Self {
        let now = Utc::now();
        Self { user_id, status, phase, created_at: now, updated_at: now }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Rank tier. Decides the rates a sponsor earns and how deep into the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseLevel {
    pub phase: i32,
    pub name: String,
    /// Rate on orders from the sponsor's direct referrals
    pub direct_rate_bps: BasisPoints,
    /// Rate on orders from deeper levels
    pub network_rate_bps: BasisPoints,
    /// Deepest network level paid out for this phase
    pub max_depth: i32,
    pub is_active: bool,
}

impl PhaseLevel {
    /// Rate for a commission `depth` levels below the sponsor, if this phase pays it.
    pub fn rate_for_depth(&self, depth: i32) -> Option<BasisPoints> {
        if !self.is_active || depth < 1 || depth > self.max_depth {
            return None;
        }
        if depth == 1 {
            Some(self.direct_rate_bps)
        } else {
            Some(self.network_rate_bps)
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.phase < 0 {
            return Err(CoreError::ValidationError("phase must be non-negative".into()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError("phase name is required".into()));
        }
        for rate in [self.direct_rate_bps, self.network_rate_bps] {
            if !(0..=10_000).contains(&rate) {
                return Err(CoreError::ValidationError("rates must be between 0 and 10000 bps".into()));
            }
        }
        if self.max_depth < 0 {
            return Err(CoreError::ValidationError("max_depth must be non-negative".into()));
        }
        Ok(())
    }
}
