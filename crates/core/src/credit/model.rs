//! Credit model definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::plan::Plan;
use crate::Result;

/// The two kinds of credits an organization spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    Enrichment,
    Icp,
}

impl CreditType {
    pub const ALL: [CreditType; 2] = [CreditType::Enrichment, CreditType::Icp];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrichment => "enrichment",
            Self::Icp => "icp",
        }
    }
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "enrichment" => Ok(Self::Enrichment),
            "icp" => Ok(Self::Icp),
            _ => Err(Error::InvalidCreditType(value.to_string())),
        }
    }
}

/// Role of a member inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn can_manage_credits(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl FromStr for MemberRole {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(Error::InvalidInput(format!("Unsupported role '{}'", value))),
        }
    }
}

/// End of a billing cycle that starts at `start`: one calendar month later.
pub fn cycle_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(1))
        .unwrap_or_else(|| start + Duration::days(30))
}

/// Organization-wide credit pool for the current billing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCredit {
    pub org_id: String,
    pub plan_id: String,
    pub enrichment_limit: i64,
    pub enrichment_used: i64,
    pub icp_limit: i64,
    pub icp_used: i64,
    pub billing_cycle_start: DateTime<Utc>,
    pub billing_cycle_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationCredit {
    /// Fresh record on `plan` with a cycle starting at `now`.
    pub fn seeded(org_id: impl Into<String>, plan: &Plan, now: DateTime<Utc>) -> Self {
        Self {
            org_id: org_id.into(),
            plan_id: plan.id.to_string(),
            enrichment_limit: plan.enrichment_limit,
            enrichment_used: 0,
            icp_limit: plan.icp_limit,
            icp_used: 0,
            billing_cycle_start: now,
            billing_cycle_end: cycle_end(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn limit(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Enrichment => self.enrichment_limit,
            CreditType::Icp => self.icp_limit,
        }
    }

    pub fn used(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Enrichment => self.enrichment_used,
            CreditType::Icp => self.icp_used,
        }
    }

    pub(crate) fn used_mut(&mut self, credit_type: CreditType) -> &mut i64 {
        match credit_type {
            CreditType::Enrichment => &mut self.enrichment_used,
            CreditType::Icp => &mut self.icp_used,
        }
    }

    /// Remaining balance, floored at zero when a plan downgrade left usage
    /// above the new limit.
    pub fn remaining(&self, credit_type: CreditType) -> i64 {
        (self.limit(credit_type) - self.used(credit_type)).max(0)
    }

    pub fn balance(&self, credit_type: CreditType) -> CreditBalance {
        CreditBalance {
            used: self.used(credit_type),
            limit: self.limit(credit_type),
            remaining: self.remaining(credit_type),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.billing_cycle_end < now
    }

    /// Organization-scope admission check for spending `amount`.
    pub fn authorize(&self, credit_type: CreditType, amount: i64) -> Result<()> {
        let remaining = self.remaining(credit_type);
        if remaining < amount {
            return Err(Error::OrganizationLimitExceeded {
                remaining,
                requested: amount,
            });
        }
        Ok(())
    }

    pub(crate) fn reset_cycle(&mut self, now: DateTime<Utc>) {
        self.enrichment_used = 0;
        self.icp_used = 0;
        self.billing_cycle_start = now;
        self.billing_cycle_end = cycle_end(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
}

/// A user's membership in an organization with optional personal caps.
///
/// A `None` limit means the member has no personal cap and is only bounded by
/// the organization pool; `Some(0)` blocks that credit type entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub org_id: String,
    pub user_id: String,
    pub role: MemberRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub enrichment_limit: Option<i64>,
    pub enrichment_used: i64,
    pub icp_limit: Option<i64>,
    pub icp_used: i64,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationMember {
    pub fn new(
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            role,
            email: None,
            display_name: None,
            enrichment_limit: None,
            enrichment_used: 0,
            icp_limit: None,
            icp_used: 0,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn limit(&self, credit_type: CreditType) -> Option<i64> {
        match credit_type {
            CreditType::Enrichment => self.enrichment_limit,
            CreditType::Icp => self.icp_limit,
        }
    }

    pub fn used(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Enrichment => self.enrichment_used,
            CreditType::Icp => self.icp_used,
        }
    }

    pub(crate) fn used_mut(&mut self, credit_type: CreditType) -> &mut i64 {
        match credit_type {
            CreditType::Enrichment => &mut self.enrichment_used,
            CreditType::Icp => &mut self.icp_used,
        }
    }

    /// Personal remaining balance, `None` when uncapped.
    pub fn remaining(&self, credit_type: CreditType) -> Option<i64> {
        self.limit(credit_type)
            .map(|limit| (limit - self.used(credit_type)).max(0))
    }

    pub fn balance(&self, credit_type: CreditType) -> MemberBalance {
        MemberBalance {
            used: self.used(credit_type),
            limit: self.limit(credit_type),
            remaining: self.remaining(credit_type),
        }
    }

    /// Member-scope admission check for spending `amount`.
    pub fn authorize(&self, credit_type: CreditType, amount: i64) -> Result<()> {
        if self.is_blocked {
            return Err(Error::MemberBlocked);
        }
        if let Some(remaining) = self.remaining(credit_type) {
            if remaining < amount {
                return Err(Error::MemberLimitExceeded {
                    remaining,
                    requested: amount,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn reset_usage(&mut self, now: DateTime<Utc>) {
        self.enrichment_used = 0;
        self.icp_used = 0;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBalance {
    pub used: i64,
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
}

/// Immutable audit record of one successful consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistory {
    pub id: Uuid,
    pub org_id: String,
    pub user_id: String,
    pub credit_type: CreditType,
    pub transaction_type: String,
    pub credits_used: i64,
    /// Organization-level remaining balance right after this transaction.
    pub balance_after: i64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A debit to apply at both organization and member scope.
#[derive(Debug, Clone)]
pub struct Debit {
    pub org_id: String,
    pub user_id: String,
    pub credit_type: CreditType,
    pub amount: i64,
    pub transaction_type: String,
    pub description: String,
    pub search_id: Option<String>,
    pub company_id: Option<String>,
    pub metadata: Value,
    pub at: DateTime<Utc>,
}

/// Result of a committed debit: the rows as they stand after the commit.
#[derive(Debug, Clone)]
pub struct DebitReceipt {
    pub organization: OrganizationCredit,
    pub member: OrganizationMember,
    pub entry: CreditHistory,
}

/// Outcome of a conditional billing-cycle rollover.
#[derive(Debug, Clone)]
pub struct Rollover {
    pub credit: OrganizationCredit,
    /// `false` when another caller already moved the window.
    pub applied: bool,
    pub members_reset: usize,
}

/// Identity data pushed by the identity provider when a user joins an org.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSync {
    pub org_id: String,
    pub user_id: String,
    pub role: MemberRole,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Partial update of a member's personal limits.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears the cap.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLimitsPatch {
    #[serde(default, deserialize_with = "explicit_null")]
    pub enrichment_limit: Option<Option<i64>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub icp_limit: Option<Option<i64>>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
}

impl MemberLimitsPatch {
    pub fn is_empty(&self) -> bool {
        self.enrichment_limit.is_none() && self.icp_limit.is_none() && self.is_blocked.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("enrichmentLimit", self.enrichment_limit),
            ("icpLimit", self.icp_limit),
        ] {
            if let Some(Some(limit)) = value {
                if limit < 0 {
                    return Err(Error::InvalidInput(format!(
                        "{} cannot be negative",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&self, member: &mut OrganizationMember, now: DateTime<Utc>) {
        if let Some(limit) = self.enrichment_limit {
            member.enrichment_limit = limit;
        }
        if let Some(limit) = self.icp_limit {
            member.icp_limit = limit;
        }
        if let Some(blocked) = self.is_blocked {
            member.is_blocked = blocked;
        }
        member.updated_at = now;
    }
}

fn explicit_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filter for history reads.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub org_id: Option<String>,
    pub credit_type: Option<CreditType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
