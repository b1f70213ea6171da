//! Billing cycle manager

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::credit::{CreditRepository, OrganizationCredit};
use crate::plan::default_plan;
use crate::Result;

/// Keeps an organization's counters aligned with its current one-month window.
///
/// There is no scheduler: the first access after a window lapses performs the
/// reset. Creation and rollover are delegated to the repository's atomic
/// upsert and compare-and-swap, so concurrent callers converge on one record.
#[derive(Clone)]
pub struct BillingCycleManager {
    store: Arc<dyn CreditRepository>,
}

impl BillingCycleManager {
    pub fn new(store: Arc<dyn CreditRepository>) -> Self {
        Self { store }
    }

    pub async fn ensure_current_cycle(&self, org_id: &str) -> Result<OrganizationCredit> {
        self.ensure_current_cycle_at(org_id, Utc::now()).await
    }

    /// Load (or lazily create) the org record and roll it over if its window
    /// ended before `now`.
    pub async fn ensure_current_cycle_at(
        &self,
        org_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrganizationCredit> {
        let credit = match self.store.get_org_credit(org_id).await? {
            Some(credit) => credit,
            None => {
                let seed = OrganizationCredit::seeded(org_id, default_plan(), now);
                let credit = self.store.insert_org_credit_if_absent(seed).await?;
                info!(org_id, plan = %credit.plan_id, "Initialized organization credits");
                credit
            }
        };

        if !credit.is_expired_at(now) {
            return Ok(credit);
        }

        let rollover = self
            .store
            .rollover_cycle(org_id, credit.billing_cycle_end, now)
            .await?;
        if rollover.applied {
            info!(
                org_id,
                members_reset = rollover.members_reset,
                cycle_end = %rollover.credit.billing_cycle_end,
                "Billing cycle rolled over"
            );
        } else {
            debug!(org_id, "Billing cycle already rolled over by a concurrent request");
        }
        Ok(rollover.credit)
    }
}
