//! Request and view types of the ledger's public operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::credit::{
    CreditBalance, CreditHistory, CreditType, MemberBalance, MemberRole, OrganizationCredit,
    OrganizationMember,
};
use crate::plan::{resolve_plan, Plan};

/// A request to spend credits, as received from a caller.
///
/// `credit_type` stays a raw string so that an unknown type surfaces as
/// [`crate::Error::InvalidCreditType`] from the ledger itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    #[serde(rename = "type", default)]
    pub credit_type: String,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub search_id: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl ConsumeRequest {
    pub fn new(credit_type: impl Into<String>, amount: i64) -> Self {
        Self {
            credit_type: credit_type.into(),
            amount,
            description: None,
            transaction_type: None,
            search_id: None,
            company_id: None,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_transaction_type(mut self, transaction_type: impl Into<String>) -> Self {
        self.transaction_type = Some(transaction_type.into());
        self
    }

    pub fn with_search_id(mut self, search_id: impl Into<String>) -> Self {
        self.search_id = Some(search_id.into());
        self
    }

    pub fn with_company_id(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionResult {
    pub credit_type: CreditType,
    pub consumed: i64,
    pub remaining: i64,
    pub used: i64,
    pub limit: i64,
    pub history_id: Uuid,
}

/// The authenticated caller of an admin operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub role: MemberRole,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name.to_string(),
            price_cents: plan.price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingCycle {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Balances of an organization for the current cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub org_id: String,
    pub enrichment: CreditBalance,
    pub icp: CreditBalance,
    pub plan: PlanSummary,
    pub billing_cycle: BillingCycle,
}

impl From<&OrganizationCredit> for CreditSummary {
    fn from(credit: &OrganizationCredit) -> Self {
        Self {
            org_id: credit.org_id.clone(),
            enrichment: credit.balance(CreditType::Enrichment),
            icp: credit.balance(CreditType::Icp),
            plan: PlanSummary::from(resolve_plan(&credit.plan_id)),
            billing_cycle: BillingCycle {
                start: credit.billing_cycle_start,
                end: credit.billing_cycle_end,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChange {
    pub org_id: String,
    pub plan: PlanSummary,
    pub enrichment_limit: i64,
    pub icp_limit: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCreditSnapshot {
    pub org_id: String,
    pub user_id: String,
    pub role: MemberRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub enrichment: MemberBalance,
    pub icp: MemberBalance,
    pub is_blocked: bool,
}

impl From<&OrganizationMember> for MemberCreditSnapshot {
    fn from(member: &OrganizationMember) -> Self {
        Self {
            org_id: member.org_id.clone(),
            user_id: member.user_id.clone(),
            role: member.role,
            email: member.email.clone(),
            display_name: member.display_name.clone(),
            enrichment: member.balance(CreditType::Enrichment),
            icp: member.balance(CreditType::Icp),
            is_blocked: member.is_blocked,
        }
    }
}

/// A history row joined with the spending member's display identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub entry: CreditHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub used: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationUsage {
    pub org_id: String,
    pub plan_id: String,
    pub enrichment: CreditBalance,
    pub icp: CreditBalance,
    pub billing_cycle_end: DateTime<Utc>,
}

/// Platform-wide usage across every organization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub organization_count: usize,
    pub organizations_by_plan: Vec<PlanCount>,
    pub enrichment: UsageTotals,
    pub icp: UsageTotals,
    pub transaction_count: usize,
    pub top_organizations: Vec<OrganizationUsage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCount {
    pub plan_id: String,
    pub organizations: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterReconciliation {
    pub credit_type: CreditType,
    pub counter: i64,
    pub replayed: i64,
    pub consistent: bool,
}

/// Comparison of the mutable counters with a replay of the audit log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub org_id: String,
    pub cycle_start: DateTime<Utc>,
    pub counters: Vec<CounterReconciliation>,
    pub consistent: bool,
}
