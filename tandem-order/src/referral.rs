//! Affiliate attribution and the fraud checks that guard it.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use tandem_core::repository::ProfileRepository;
use tandem_core::{Profile, RepoError, SubscriptionStatus};

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("A buyer cannot refer their own order")]
    SelfReferral,

    #[error("Unknown affiliate: {0}")]
    UnknownAffiliate(String),

    #[error("Sponsor {0} has no active subscription")]
    InactiveSponsor(Uuid),

    #[error("Sponsor {0} is still on the waitlist")]
    WaitlistedSponsor(Uuid),

    #[error("Referral code does not belong to the affiliate")]
    ReferralCodeMismatch,

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl ReferralError {
    /// Whether this error is a rejected reference rather than a storage failure
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ReferralError::Repository(_))
    }
}

/// What a checkout claims about who referred the buyer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffiliateRef {
    pub affiliate_id: Option<Uuid>,
    pub referral_code: Option<String>,
}

impl AffiliateRef {
    fn code(&self) -> Option<&str> {
        self.referral_code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Attribution {
    /// The checkout named an affiliate and it passed every check
    Referred { affiliate_id: Uuid },
    /// No reference given; the buyer's own active sponsor is credited
    Sponsor { affiliate_id: Uuid },
    Unattributed,
}

impl Attribution {
    pub fn affiliate_id(&self) -> Option<Uuid> {
        match self {
            Attribution::Referred { affiliate_id } | Attribution::Sponsor { affiliate_id } => Some(*affiliate_id),
            Attribution::Unattributed => None,
        }
    }
}

/// Referral standing of a member, as shown on their profile
#[derive(Debug, Clone, Serialize)]
pub struct ReferralStatus {
    pub user_id: Uuid,
    pub referral_code: String,
    pub sponsor_id: Option<Uuid>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub phase: Option<i32>,
    pub can_refer: bool,
    pub direct_referrals: i64,
}

pub struct ReferralValidator {
    profiles: Arc<dyn ProfileRepository>,
}

impl ReferralValidator {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }

    /// Decide who, if anyone, is credited for `buyer_id`'s order.
    pub async fn validate(&self, buyer_id: Uuid, reference: &AffiliateRef) -> Result<Attribution, ReferralError> {
        let affiliate = match (reference.affiliate_id, reference.code()) {
            (None, None) => return self.sponsor_fallback(buyer_id).await,
            (Some(id), code) => {
                if id == buyer_id {
                    return Err(ReferralError::SelfReferral);
                }
                let profile = self
                    .profiles
                    .get_profile(id)
                    .await?
                    .ok_or_else(|| ReferralError::UnknownAffiliate(id.to_string()))?;
                if let Some(code) = code {
                    if !profile.referral_code_matches(code) {
                        return Err(ReferralError::ReferralCodeMismatch);
                    }
                }
                profile
            }
            (None, Some(code)) => self
                .profiles
                .find_by_referral_code(code)
                .await?
                .ok_or_else(|| ReferralError::UnknownAffiliate(code.to_string()))?,
        };

        if affiliate.id == buyer_id {
            return Err(ReferralError::SelfReferral);
        }

        self.ensure_active(&affiliate).await?;
        debug!(%buyer_id, affiliate_id = %affiliate.id, "Referral accepted");
        Ok(Attribution::Referred { affiliate_id: affiliate.id })
    }

    async fn ensure_active(&self, affiliate: &Profile) -> Result<(), ReferralError> {
        match self.profiles.get_subscription(affiliate.id).await? {
            Some(sub) if sub.is_active() => Ok(()),
            Some(sub) if sub.status == SubscriptionStatus::Waitlisted => {
                Err(ReferralError::WaitlistedSponsor(affiliate.id))
            }
            _ => Err(ReferralError::InactiveSponsor(affiliate.id)),
        }
    }

    async fn sponsor_fallback(&self, buyer_id: Uuid) -> Result<Attribution, ReferralError> {
        let Some(sponsor_id) = self.profiles.get_profile(buyer_id).await?.and_then(|p| p.sponsor_id) else {
            return Ok(Attribution::Unattributed);
        };
        if sponsor_id == buyer_id {
            return Ok(Attribution::Unattributed);
        }

        let active = self
            .profiles
            .get_subscription(sponsor_id)
            .await?
            .is_some_and(|s| s.is_active());

        if active {
            Ok(Attribution::Sponsor { affiliate_id: sponsor_id })
        } else {
            debug!(%buyer_id, %sponsor_id, "Sponsor inactive, order left unattributed");
            Ok(Attribution::Unattributed)
        }
    }

    pub async fn status(&self, user_id: Uuid) -> Result<ReferralStatus, ReferralError> {
        let profile = self
            .profiles
            .get_profile(user_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("profile {}", user_id)))?;
        let subscription = self.profiles.get_subscription(user_id).await?;
        let direct_referrals = self.profiles.count_direct_referrals(user_id).await?;

        Ok(ReferralStatus {
            user_id,
            referral_code: profile.referral_code,
            sponsor_id: profile.sponsor_id,
            can_refer: subscription.as_ref().is_some_and(|s| s.is_active()),
            subscription_status: subscription.as_ref().map(|s| s.status),
            phase: subscription.map(|s| s.phase),
            direct_referrals,
        })
    }
}
