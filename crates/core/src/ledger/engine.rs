//! Credit consumption engine
//!
//! Every paid action funnels through [`CreditLedger::consume`]. Checks run in
//! a fixed order and fail fast without mutating anything; the mutation itself
//! is a single [`CreditRepository::commit_debit`] call that re-validates both
//! scopes atomically, so concurrent consumers can never overdraw a balance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::model::{ConsumeRequest, ConsumptionResult, CreditSummary};
use crate::billing::BillingCycleManager;
use crate::credit::{CreditRepository, CreditType, Debit, OrganizationMember};
use crate::{Error, Result};

pub const DEFAULT_TRANSACTION_TYPE: &str = "manual";

/// Entry point for reading and spending an organization's credits.
#[derive(Clone)]
pub struct CreditLedger {
    pub(super) store: Arc<dyn CreditRepository>,
    pub(super) cycles: BillingCycleManager,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditRepository>) -> Self {
        let cycles = BillingCycleManager::new(Arc::clone(&store));
        Self { store, cycles }
    }

    pub fn cycles(&self) -> &BillingCycleManager {
        &self.cycles
    }

    /// Current balances; rolls the cycle over first if it has lapsed.
    pub async fn credits(&self, org_id: &str) -> Result<CreditSummary> {
        let org_id = require_id("orgId", org_id)?;
        let credit = self.cycles.ensure_current_cycle(org_id).await?;
        Ok(CreditSummary::from(&credit))
    }

    /// Spend credits on behalf of a member.
    ///
    /// Credits are charged whether or not the caller's downstream provider
    /// call later succeeds.
    pub async fn consume(
        &self,
        org_id: &str,
        user_id: &str,
        request: ConsumeRequest,
    ) -> Result<ConsumptionResult> {
        self.consume_at(org_id, user_id, request, Utc::now()).await
    }

    pub async fn consume_at(
        &self,
        org_id: &str,
        user_id: &str,
        request: ConsumeRequest,
        now: DateTime<Utc>,
    ) -> Result<ConsumptionResult> {
        let org_id = require_id("orgId", org_id)?;
        let user_id = require_id("userId", user_id)?;
        let credit_type: CreditType = request.credit_type.parse()?;
        let amount = request.amount;
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        let member = self.load_member(org_id, user_id).await?;
        if let Err(err) = member.authorize(credit_type, amount) {
            // A member cap rejection may come from last cycle's counters.
            let stale = matches!(err, Error::MemberLimitExceeded { .. })
                && self.cycle_lapsed(org_id, now).await?;
            if !stale {
                warn!(org_id, user_id, %credit_type, amount, "Consumption rejected: {}", err);
                return Err(err);
            }
            self.cycles.ensure_current_cycle_at(org_id, now).await?;
            let member = self.load_member(org_id, user_id).await?;
            if let Err(err) = member.authorize(credit_type, amount) {
                warn!(org_id, user_id, %credit_type, amount, "Consumption rejected: {}", err);
                return Err(err);
            }
        }

        let organization = self.cycles.ensure_current_cycle_at(org_id, now).await?;
        if let Err(err) = organization.authorize(credit_type, amount) {
            warn!(org_id, user_id, %credit_type, amount, "Consumption rejected: {}", err);
            return Err(err);
        }

        let debit = Debit {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            credit_type,
            amount,
            transaction_type: non_empty(request.transaction_type)
                .unwrap_or_else(|| DEFAULT_TRANSACTION_TYPE.to_string()),
            description: non_empty(request.description)
                .unwrap_or_else(|| format!("{} {} credits consumed", amount, credit_type)),
            search_id: non_empty(request.search_id),
            company_id: non_empty(request.company_id),
            metadata: request.metadata.unwrap_or(Value::Null),
            at: now,
        };
        let receipt = match self.store.commit_debit(debit).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(org_id, user_id, %credit_type, amount, "Debit not committed: {}", err);
                return Err(err);
            }
        };

        let balance = receipt.organization.balance(credit_type);
        info!(
            org_id,
            user_id,
            %credit_type,
            amount,
            remaining = balance.remaining,
            transaction_type = %receipt.entry.transaction_type,
            "Credits consumed"
        );
        Ok(ConsumptionResult {
            credit_type,
            consumed: amount,
            remaining: balance.remaining,
            used: balance.used,
            limit: balance.limit,
            history_id: receipt.entry.id,
        })
    }
}

impl CreditLedger {
    async fn load_member(&self, org_id: &str, user_id: &str) -> Result<OrganizationMember> {
        self.store
            .get_member(org_id, user_id)
            .await?
            .ok_or_else(|| Error::MemberNotFound {
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    /// Read-only check; never seeds or rolls the record over.
    async fn cycle_lapsed(&self, org_id: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .store
            .get_org_credit(org_id)
            .await?
            .is_some_and(|credit| credit.is_expired_at(now)))
    }
}

pub(super) fn require_id<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} cannot be empty", name)));
    }
    Ok(trimmed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
