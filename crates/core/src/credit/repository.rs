//! Credit repository trait
//!
//! Storage contract for the ledger. Implementations must make every method
//! atomic with respect to concurrent callers: `insert_org_credit_if_absent`
//! is an upsert, `rollover_cycle` is a compare-and-swap on the cycle end and
//! `commit_debit` re-checks both scopes, increments both counters and appends
//! the audit row as one unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{
    CreditHistory, Debit, DebitReceipt, HistoryQuery, MemberLimitsPatch, MemberSync,
    OrganizationCredit, OrganizationMember, Rollover,
};
use crate::plan::Plan;
use crate::Result;

#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// Get an organization's credit record
    async fn get_org_credit(&self, org_id: &str) -> Result<Option<OrganizationCredit>>;

    /// Store `seed` unless a record for its org exists; returns the stored record
    async fn insert_org_credit_if_absent(
        &self,
        seed: OrganizationCredit,
    ) -> Result<OrganizationCredit>;

    /// All organization credit records
    async fn list_org_credits(&self) -> Result<Vec<OrganizationCredit>>;

    /// Reset org and member usage and open a new window starting at `now`,
    /// only if the stored cycle still ends at `expected_end`
    async fn rollover_cycle(
        &self,
        org_id: &str,
        expected_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Rollover>;

    /// Move an organization onto `plan` without touching usage
    async fn set_plan(
        &self,
        org_id: &str,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<OrganizationCredit>;

    async fn get_member(&self, org_id: &str, user_id: &str) -> Result<Option<OrganizationMember>>;

    async fn list_members(&self, org_id: &str) -> Result<Vec<OrganizationMember>>;

    /// Create or refresh a member from identity data, keeping limits and usage
    async fn upsert_member(
        &self,
        sync: MemberSync,
        now: DateTime<Utc>,
    ) -> Result<OrganizationMember>;

    async fn update_member_limits(
        &self,
        org_id: &str,
        user_id: &str,
        patch: &MemberLimitsPatch,
        now: DateTime<Utc>,
    ) -> Result<OrganizationMember>;

    /// Apply a debit at both scopes and append its audit row, or change nothing
    async fn commit_debit(&self, debit: Debit) -> Result<DebitReceipt>;

    /// History rows matching `query`, newest first
    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<CreditHistory>>;

    /// Total number of history rows across all organizations
    async fn count_history(&self) -> Result<usize>;
}
