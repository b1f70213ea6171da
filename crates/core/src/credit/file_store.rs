//! File-based credit storage implementation
//!
//! Keeps the whole ledger in memory behind one `RwLock`. Organization and
//! member rows live in a compact JSON snapshot rewritten on every mutation;
//! history rows are appended to a JSONL log next to it. The snapshot records
//! how many bytes of the log are committed, so its rename is the commit point
//! of a debit: bytes past that offset are ignored on load and overwritten by
//! the next append. A mutation that fails to persist is undone before the
//! lock is released, so readers never observe a state that is not on disk.
//!
//! Snapshot size grows with the number of organizations and members; the
//! history log grows by one line per debit and is never rewritten.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{
    CreditHistory, Debit, DebitReceipt, HistoryQuery, MemberLimitsPatch, MemberSync,
    OrganizationCredit, OrganizationMember, Rollover,
};
use super::repository::CreditRepository;
use crate::plan::Plan;
use crate::{Error, Result};

type MemberKey = (String, String);

fn member_key(org_id: &str, user_id: &str) -> MemberKey {
    (org_id.to_string(), user_id.to_string())
}

#[derive(Debug, Default)]
struct LedgerState {
    organizations: HashMap<String, OrganizationCredit>,
    members: HashMap<MemberKey, OrganizationMember>,
    history: Vec<CreditHistory>,
    /// Committed length of the history log in bytes.
    history_bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLedgerState {
    #[serde(default)]
    organizations: Vec<OrganizationCredit>,
    #[serde(default)]
    members: Vec<OrganizationMember>,
    #[serde(default)]
    history_bytes: u64,
}

impl StoredLedgerState {
    fn into_state(self, history: Vec<CreditHistory>) -> LedgerState {
        LedgerState {
            organizations: self
                .organizations
                .into_iter()
                .map(|item| (item.org_id.clone(), item))
                .collect(),
            members: self
                .members
                .into_iter()
                .map(|item| (member_key(&item.org_id, &item.user_id), item))
                .collect(),
            history,
            history_bytes: self.history_bytes,
        }
    }
}

impl From<&LedgerState> for StoredLedgerState {
    fn from(value: &LedgerState) -> Self {
        let mut organizations: Vec<_> = value.organizations.values().cloned().collect();
        organizations.sort_by(|left, right| left.org_id.cmp(&right.org_id));
        let mut members: Vec<_> = value.members.values().cloned().collect();
        members.sort_by(|left, right| {
            (&left.org_id, &left.user_id).cmp(&(&right.org_id, &right.user_id))
        });
        Self {
            organizations,
            members,
            history_bytes: value.history_bytes,
        }
    }
}

/// JSON-file backed [`CreditRepository`]
pub struct FileCreditStore {
    path: PathBuf,
    history_path: PathBuf,
    state: RwLock<LedgerState>,
}

impl FileCreditStore {
    /// Open the store at `path`
    ///
    /// If the file doesn't exist, it will be created on first write. History
    /// is kept in `<stem>.history.jsonl` beside it.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history_path = path.with_extension("history.jsonl");
        let state = load_state(&path, &history_path).await?;
        debug!(
            "Loaded credit ledger from {} ({} organizations, {} history rows)",
            path.display(),
            state.organizations.len(),
            state.history.len()
        );
        Ok(Self {
            path,
            history_path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }
}

async fn load_state(path: &Path, history_path: &Path) -> Result<LedgerState> {
    if !path.exists() {
        return Ok(LedgerState::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to read ledger state: {}", err)))?;
    if content.trim().is_empty() {
        return Ok(LedgerState::default());
    }
    let stored: StoredLedgerState = serde_json::from_str(&content)
        .map_err(|err| Error::Storage(format!("Failed to parse ledger state: {}", err)))?;
    let history = load_history(history_path, stored.history_bytes).await?;
    Ok(stored.into_state(history))
}

/// Read the committed prefix of the history log.
async fn load_history(path: &Path, committed: u64) -> Result<Vec<CreditHistory>> {
    if committed == 0 {
        return Ok(Vec::new());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to read credit history: {}", err)))?;
    let committed = usize::try_from(committed)
        .ok()
        .filter(|committed| *committed <= bytes.len())
        .ok_or_else(|| {
            Error::Storage(format!(
                "Credit history {} is shorter than the committed length",
                path.display()
            ))
        })?;
    if committed < bytes.len() {
        warn!(
            "Ignoring {} uncommitted bytes at the end of {}",
            bytes.len() - committed,
            path.display()
        );
    }
    let content = std::str::from_utf8(&bytes[..committed])
        .map_err(|err| Error::Storage(format!("Credit history is not UTF-8: {}", err)))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<CreditHistory>(line).map_err(|err| {
                Error::Storage(format!("Failed to parse credit history row: {}", err))
            })
        })
        .collect()
}

/// Write one history row at the committed end of the log, discarding any
/// uncommitted tail. Returns the new log length.
async fn append_history(path: &Path, committed: u64, entry: &CreditHistory) -> Result<u64> {
    let mut line = serde_json::to_string(entry)
        .map_err(|err| Error::Storage(format!("Failed to encode credit history: {}", err)))?;
    line.push('\n');
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            Error::Storage(format!("Failed to create ledger directory: {}", err))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to open credit history: {}", err)))?;
    file.set_len(committed)
        .await
        .map_err(|err| Error::Storage(format!("Failed to trim credit history: {}", err)))?;
    file.seek(SeekFrom::Start(committed))
        .await
        .map_err(|err| Error::Storage(format!("Failed to seek credit history: {}", err)))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|err| Error::Storage(format!("Failed to write credit history: {}", err)))?;
    file.sync_data()
        .await
        .map_err(|err| Error::Storage(format!("Failed to flush credit history: {}", err)))?;

    Ok(committed + line.len() as u64)
}

async fn persist_state(path: &Path, state: &LedgerState) -> Result<()> {
    let content = serde_json::to_string(&StoredLedgerState::from(state))
        .map_err(|err| Error::Storage(format!("Failed to serialize ledger state: {}", err)))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            Error::Storage(format!("Failed to create ledger directory: {}", err))
        })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, content)
        .await
        .map_err(|err| Error::Storage(format!("Failed to write ledger state: {}", err)))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to replace ledger state: {}", err)))?;
    Ok(())
}

#[async_trait]
impl CreditRepository for FileCreditStore {
    async fn get_org_credit(&self, org_id: &str) -> Result<Option<OrganizationCredit>> {
        let state = self.state.read().await;
        Ok(state.organizations.get(org_id).cloned())
    }

    async fn insert_org_credit_if_absent(
        &self,
        seed: OrganizationCredit,
    ) -> Result<OrganizationCredit> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.organizations.get(&seed.org_id) {
            return Ok(existing.clone());
        }

        let org_id = seed.org_id.clone();
        state.organizations.insert(org_id.clone(), seed.clone());
        if let Err(err) = persist_state(&self.path, &state).await {
            state.organizations.remove(&org_id);
            return Err(err);
        }
        Ok(seed)
    }

    async fn list_org_credits(&self) -> Result<Vec<OrganizationCredit>> {
        let state = self.state.read().await;
        let mut credits: Vec<_> = state.organizations.values().cloned().collect();
        credits.sort_by(|left, right| left.org_id.cmp(&right.org_id));
        Ok(credits)
    }

    async fn rollover_cycle(
        &self,
        org_id: &str,
        expected_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Rollover> {
        let mut state = self.state.write().await;
        let current = state
            .organizations
            .get(org_id)
            .cloned()
            .ok_or_else(|| Error::OrganizationNotFound(org_id.to_string()))?;
        if current.billing_cycle_end != expected_end {
            return Ok(Rollover {
                credit: current,
                applied: false,
                members_reset: 0,
            });
        }

        let mut rolled = current.clone();
        rolled.reset_cycle(now);
        state.organizations.insert(org_id.to_string(), rolled.clone());

        let mut previous_members = Vec::new();
        for member in state
            .members
            .values_mut()
            .filter(|member| member.org_id == org_id)
        {
            previous_members.push(member.clone());
            member.reset_usage(now);
        }

        if let Err(err) = persist_state(&self.path, &state).await {
            state.organizations.insert(org_id.to_string(), current);
            for member in previous_members {
                state
                    .members
                    .insert(member_key(&member.org_id, &member.user_id), member);
            }
            return Err(err);
        }

        Ok(Rollover {
            credit: rolled,
            applied: true,
            members_reset: previous_members.len(),
        })
    }

    async fn set_plan(
        &self,
        org_id: &str,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<OrganizationCredit> {
        let mut state = self.state.write().await;
        let credit = state
            .organizations
            .get_mut(org_id)
            .ok_or_else(|| Error::OrganizationNotFound(org_id.to_string()))?;
        let previous = credit.clone();
        credit.plan_id = plan.id.to_string();
        credit.enrichment_limit = plan.enrichment_limit;
        credit.icp_limit = plan.icp_limit;
        credit.updated_at = now;
        let updated = credit.clone();

        if let Err(err) = persist_state(&self.path, &state).await {
            state.organizations.insert(org_id.to_string(), previous);
            return Err(err);
        }
        Ok(updated)
    }

    async fn get_member(&self, org_id: &str, user_id: &str) -> Result<Option<OrganizationMember>> {
        let state = self.state.read().await;
        Ok(state.members.get(&member_key(org_id, user_id)).cloned())
    }

    async fn list_members(&self, org_id: &str) -> Result<Vec<OrganizationMember>> {
        let state = self.state.read().await;
        let mut members: Vec<_> = state
            .members
            .values()
            .filter(|member| member.org_id == org_id)
            .cloned()
            .collect();
        members.sort_by(|left, right| {
            (left.role, &left.user_id).cmp(&(right.role, &right.user_id))
        });
        Ok(members)
    }

    async fn upsert_member(
        &self,
        sync: MemberSync,
        now: DateTime<Utc>,
    ) -> Result<OrganizationMember> {
        let key = member_key(&sync.org_id, &sync.user_id);
        let mut state = self.state.write().await;
        let previous = state.members.get(&key).cloned();

        let member = state.members.entry(key.clone()).or_insert_with(|| {
            OrganizationMember::new(sync.org_id.clone(), sync.user_id.clone(), sync.role, now)
        });
        member.role = sync.role;
        if sync.email.is_some() {
            member.email = sync.email;
        }
        if sync.display_name.is_some() {
            member.display_name = sync.display_name;
        }
        member.updated_at = now;
        let member = member.clone();

        if let Err(err) = persist_state(&self.path, &state).await {
            match previous {
                Some(previous) => state.members.insert(key, previous),
                None => state.members.remove(&key),
            };
            return Err(err);
        }
        Ok(member)
    }

    async fn update_member_limits(
        &self,
        org_id: &str,
        user_id: &str,
        patch: &MemberLimitsPatch,
        now: DateTime<Utc>,
    ) -> Result<OrganizationMember> {
        let key = member_key(org_id, user_id);
        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(&key)
            .ok_or_else(|| Error::MemberNotFound {
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })?;
        let previous = member.clone();
        patch.apply(member, now);
        let updated = member.clone();

        if let Err(err) = persist_state(&self.path, &state).await {
            state.members.insert(key, previous);
            return Err(err);
        }
        Ok(updated)
    }

    async fn commit_debit(&self, debit: Debit) -> Result<DebitReceipt> {
        let key = member_key(&debit.org_id, &debit.user_id);
        let mut state = self.state.write().await;

        // Re-check both scopes against the live rows under the write lock.
        let member = state
            .members
            .get(&key)
            .ok_or_else(|| Error::MemberNotFound {
                org_id: debit.org_id.clone(),
                user_id: debit.user_id.clone(),
            })?;
        member.authorize(debit.credit_type, debit.amount)?;
        let organization = state
            .organizations
            .get(&debit.org_id)
            .ok_or_else(|| Error::OrganizationNotFound(debit.org_id.clone()))?;
        organization.authorize(debit.credit_type, debit.amount)?;

        let previous_member = member.clone();
        let previous_organization = organization.clone();

        let mut organization = previous_organization.clone();
        *organization.used_mut(debit.credit_type) += debit.amount;
        organization.updated_at = debit.at;
        let mut member = previous_member.clone();
        *member.used_mut(debit.credit_type) += debit.amount;
        member.updated_at = debit.at;

        let entry = CreditHistory {
            id: Uuid::new_v4(),
            org_id: debit.org_id.clone(),
            user_id: debit.user_id.clone(),
            credit_type: debit.credit_type,
            transaction_type: debit.transaction_type,
            credits_used: debit.amount,
            balance_after: organization.remaining(debit.credit_type),
            description: debit.description,
            search_id: debit.search_id,
            company_id: debit.company_id,
            metadata: debit.metadata,
            // Never stamp an entry before the cycle it was charged to.
            created_at: debit.at.max(organization.billing_cycle_start),
        };

        let previous_history_bytes = state.history_bytes;
        let history_bytes =
            match append_history(&self.history_path, previous_history_bytes, &entry).await {
                Ok(history_bytes) => history_bytes,
                Err(err) => {
                    warn!(
                        "Debit of {} {} credits for org {} not recorded: {}",
                        debit.amount, debit.credit_type, debit.org_id, err
                    );
                    return Err(err);
                }
            };

        state
            .organizations
            .insert(debit.org_id.clone(), organization.clone());
        state.members.insert(key.clone(), member.clone());
        state.history.push(entry.clone());
        state.history_bytes = history_bytes;

        if let Err(err) = persist_state(&self.path, &state).await {
            warn!(
                "Rolling back debit of {} {} credits for org {}: {}",
                debit.amount, debit.credit_type, debit.org_id, err
            );
            state.history.pop();
            state.history_bytes = previous_history_bytes;
            state.members.insert(key, previous_member);
            state
                .organizations
                .insert(debit.org_id, previous_organization);
            return Err(err);
        }

        Ok(DebitReceipt {
            organization,
            member,
            entry,
        })
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<CreditHistory>> {
        let state = self.state.read().await;
        let limit = query.limit.unwrap_or(usize::MAX);
        let entries = state
            .history
            .iter()
            .rev()
            .filter(|entry| {
                query
                    .org_id
                    .as_deref()
                    .map_or(true, |org_id| entry.org_id == org_id)
            })
            .filter(|entry| {
                query
                    .credit_type
                    .map_or(true, |credit_type| entry.credit_type == credit_type)
            })
            .filter(|entry| query.since.map_or(true, |since| entry.created_at >= since))
            .take(limit)
            .cloned()
            .collect();
        Ok(entries)
    }

    async fn count_history(&self) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state.history.len())
    }
}
