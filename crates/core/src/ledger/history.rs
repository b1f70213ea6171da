//! Read-side views over the audit history and the counters

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::engine::{require_id, CreditLedger};
use super::model::{
    CounterReconciliation, HistoryEntry, OrganizationUsage, PlanCount, PlatformStats,
    Reconciliation, UsageTotals,
};
use crate::credit::{CreditType, HistoryQuery};
use crate::Result;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_TOP_ORGANIZATIONS: usize = 10;

impl CreditLedger {
    /// Most recent transactions of an organization, newest first.
    pub async fn history(
        &self,
        org_id: &str,
        credit_type: Option<CreditType>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>> {
        let org_id = require_id("orgId", org_id)?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let entries = self
            .store
            .list_history(&HistoryQuery {
                org_id: Some(org_id.to_string()),
                credit_type,
                since: None,
                limit: Some(limit),
            })
            .await?;

        let members: HashMap<String, _> = self
            .store
            .list_members(org_id)
            .await?
            .into_iter()
            .map(|member| (member.user_id.clone(), member))
            .collect();
        debug!(org_id, rows = entries.len(), "Loaded credit history");

        Ok(entries
            .into_iter()
            .map(|entry| {
                let member = members.get(&entry.user_id);
                HistoryEntry {
                    member_email: member.and_then(|member| member.email.clone()),
                    member_name: member.and_then(|member| member.display_name.clone()),
                    entry,
                }
            })
            .collect())
    }

    /// Usage across every organization, for platform operators.
    ///
    /// Counters of organizations whose cycle lapsed without a later access are
    /// reported as stored.
    pub async fn platform_stats(&self, top: Option<usize>) -> Result<PlatformStats> {
        let top = top.unwrap_or(DEFAULT_TOP_ORGANIZATIONS).clamp(1, 100);
        let mut credits = self.store.list_org_credits().await?;
        let transaction_count = self.store.count_history().await?;

        let mut by_plan: BTreeMap<String, usize> = BTreeMap::new();
        let mut enrichment = UsageTotals::default();
        let mut icp = UsageTotals::default();
        for credit in &credits {
            *by_plan.entry(credit.plan_id.clone()).or_default() += 1;
            enrichment.used += credit.enrichment_used;
            enrichment.limit += credit.enrichment_limit;
            icp.used += credit.icp_used;
            icp.limit += credit.icp_limit;
        }

        let organization_count = credits.len();
        credits.sort_by(|left, right| {
            right
                .enrichment_used
                .cmp(&left.enrichment_used)
                .then_with(|| left.org_id.cmp(&right.org_id))
        });
        let top_organizations = credits
            .iter()
            .take(top)
            .map(|credit| OrganizationUsage {
                org_id: credit.org_id.clone(),
                plan_id: credit.plan_id.clone(),
                enrichment: credit.balance(CreditType::Enrichment),
                icp: credit.balance(CreditType::Icp),
                billing_cycle_end: credit.billing_cycle_end,
            })
            .collect();

        Ok(PlatformStats {
            organization_count,
            organizations_by_plan: by_plan
                .into_iter()
                .map(|(plan_id, organizations)| PlanCount {
                    plan_id,
                    organizations,
                })
                .collect(),
            enrichment,
            icp,
            transaction_count,
            top_organizations,
        })
    }

    /// Compare the current cycle's counters with a replay of the audit log.
    pub async fn reconcile(&self, org_id: &str) -> Result<Reconciliation> {
        let org_id = require_id("orgId", org_id)?;
        let credit = self.cycles.ensure_current_cycle(org_id).await?;
        let entries = self
            .store
            .list_history(&HistoryQuery {
                org_id: Some(org_id.to_string()),
                credit_type: None,
                since: Some(credit.billing_cycle_start),
                limit: None,
            })
            .await?;

        let counters: Vec<CounterReconciliation> = CreditType::ALL
            .iter()
            .map(|&credit_type| {
                let replayed: i64 = entries
                    .iter()
                    .filter(|entry| entry.credit_type == credit_type)
                    .map(|entry| entry.credits_used)
                    .sum();
                let counter = credit.used(credit_type);
                CounterReconciliation {
                    credit_type,
                    counter,
                    replayed,
                    consistent: counter == replayed,
                }
            })
            .collect();
        let consistent = counters.iter().all(|counter| counter.consistent);
        if !consistent {
            warn!(org_id, ?counters, "Credit counters drifted from audit history");
        }

        Ok(Reconciliation {
            org_id: org_id.to_string(),
            cycle_start: credit.billing_cycle_start,
            counters,
            consistent,
        })
    }
}
