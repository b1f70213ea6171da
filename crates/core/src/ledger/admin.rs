//! Plan changes, member sync and member limit administration

use chrono::Utc;
use tracing::info;

use super::engine::{require_id, CreditLedger};
use super::model::{Actor, MemberCreditSnapshot, PlanChange, PlanSummary};
use crate::credit::{MemberLimitsPatch, MemberRole, MemberSync, OrganizationMember};
use crate::plan::lookup_plan;
use crate::{Error, Result};

fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if !actor.role.can_manage_credits() {
        return Err(Error::Forbidden(format!("Only owner/admin can {}", action)));
    }
    Ok(())
}

impl CreditLedger {
    /// Move an organization to another catalog plan. Usage is kept.
    pub async fn update_plan(
        &self,
        actor: &Actor,
        org_id: &str,
        plan_id: &str,
    ) -> Result<PlanChange> {
        let org_id = require_id("orgId", org_id)?;
        require_admin(actor, "change the plan")?;
        let plan = lookup_plan(plan_id)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown plan '{}'", plan_id)))?;

        self.cycles.ensure_current_cycle(org_id).await?;
        let credit = self.store.set_plan(org_id, plan, Utc::now()).await?;
        info!(org_id, plan = plan.id, actor = %actor.user_id, "Organization plan updated");

        Ok(PlanChange {
            org_id: credit.org_id,
            plan: PlanSummary::from(plan),
            enrichment_limit: credit.enrichment_limit,
            icp_limit: credit.icp_limit,
        })
    }

    /// Record that a user belongs to an organization.
    pub async fn sync_member(&self, sync: MemberSync) -> Result<OrganizationMember> {
        require_id("orgId", &sync.org_id)?;
        require_id("userId", &sync.user_id)?;
        let member = self.store.upsert_member(sync, Utc::now()).await?;
        info!(
            org_id = %member.org_id,
            user_id = %member.user_id,
            role = member.role.as_str(),
            "Member synced"
        );
        Ok(member)
    }

    pub async fn member_limits(&self, org_id: &str, user_id: &str) -> Result<MemberCreditSnapshot> {
        let org_id = require_id("orgId", org_id)?;
        let user_id = require_id("userId", user_id)?;
        let not_found = || Error::MemberNotFound {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
        };
        if self.store.get_member(org_id, user_id).await?.is_none() {
            return Err(not_found());
        }
        // Member counters are only meaningful within the current cycle.
        self.cycles.ensure_current_cycle(org_id).await?;
        let member = self
            .store
            .get_member(org_id, user_id)
            .await?
            .ok_or_else(not_found)?;
        Ok(MemberCreditSnapshot::from(&member))
    }

    /// Change a member's personal caps or block flag.
    ///
    /// Only owners and admins may do this, never on themselves and never on
    /// the organization owner.
    pub async fn set_member_limits(
        &self,
        actor: &Actor,
        org_id: &str,
        user_id: &str,
        patch: MemberLimitsPatch,
    ) -> Result<MemberCreditSnapshot> {
        let org_id = require_id("orgId", org_id)?;
        let user_id = require_id("userId", user_id)?;
        require_admin(actor, "change member limits")?;
        if actor.user_id == user_id {
            return Err(Error::Forbidden(
                "Cannot change your own credit limits".to_string(),
            ));
        }
        patch.validate()?;

        let target = self
            .store
            .get_member(org_id, user_id)
            .await?
            .ok_or_else(|| Error::MemberNotFound {
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })?;
        if target.role == MemberRole::Owner {
            return Err(Error::Forbidden(
                "Cannot change the organization owner's limits".to_string(),
            ));
        }
        if patch.is_empty() {
            return Ok(MemberCreditSnapshot::from(&target));
        }

        let member = self
            .store
            .update_member_limits(org_id, user_id, &patch, Utc::now())
            .await?;
        info!(
            org_id,
            user_id,
            actor = %actor.user_id,
            enrichment_limit = ?member.enrichment_limit,
            icp_limit = ?member.icp_limit,
            is_blocked = member.is_blocked,
            "Member limits updated"
        );
        Ok(MemberCreditSnapshot::from(&member))
    }

    /// Credit snapshots of every member of an organization.
    pub async fn member_usage(
        &self,
        actor: &Actor,
        org_id: &str,
    ) -> Result<Vec<MemberCreditSnapshot>> {
        let org_id = require_id("orgId", org_id)?;
        require_admin(actor, "list member usage")?;
        self.cycles.ensure_current_cycle(org_id).await?;
        let members = self.store.list_members(org_id).await?;
        Ok(members.iter().map(MemberCreditSnapshot::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::credit::{CreditRepository, FileCreditStore};
    use crate::error::ErrorKind;
    use crate::ledger::ConsumeRequest;

    async fn build_ledger() -> (CreditLedger, Arc<FileCreditStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            FileCreditStore::new(temp_dir.path().join("ledger.json"))
                .await
                .unwrap(),
        );
        let ledger = CreditLedger::new(store.clone());
        for (user_id, role) in [
            ("owner", MemberRole::Owner),
            ("admin", MemberRole::Admin),
            ("member", MemberRole::Member),
        ] {
            ledger
                .sync_member(MemberSync {
                    org_id: "org-1".to_string(),
                    user_id: user_id.to_string(),
                    role,
                    email: Some(format!("{}@example.com", user_id)),
                    display_name: None,
                })
                .await
                .unwrap();
        }
        (ledger, store, temp_dir)
    }

    fn cap(limit: i64) -> MemberLimitsPatch {
        MemberLimitsPatch {
            enrichment_limit: Some(Some(limit)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_cannot_edit_owner() {
        let (ledger, _store, _temp) = build_ledger().await;
        let admin = Actor::new("admin", MemberRole::Admin);

        let err = ledger
            .set_member_limits(&admin, "org-1", "owner", cap(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_cannot_edit_self() {
        let (ledger, _store, _temp) = build_ledger().await;
        let admin = Actor::new("admin", MemberRole::Admin);

        let err = ledger
            .set_member_limits(&admin, "org-1", "admin", cap(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_plain_member_cannot_edit_limits() {
        let (ledger, _store, _temp) = build_ledger().await;
        let member = Actor::new("member", MemberRole::Member);

        let err = ledger
            .set_member_limits(&member, "org-1", "admin", cap(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_owner_sets_and_clears_member_cap() {
        let (ledger, _store, _temp) = build_ledger().await;
        let owner = Actor::new("owner", MemberRole::Owner);

        let snapshot = ledger
            .set_member_limits(&owner, "org-1", "member", cap(10))
            .await
            .unwrap();
        assert_eq!(snapshot.enrichment.limit, Some(10));
        assert_eq!(snapshot.enrichment.remaining, Some(10));
        assert_eq!(snapshot.icp.limit, None);

        let cleared = ledger
            .set_member_limits(
                &owner,
                "org-1",
                "member",
                MemberLimitsPatch {
                    enrichment_limit: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.enrichment.limit, None);
        assert_eq!(cleared.email.as_deref(), Some("member@example.com"));
    }

    #[tokio::test]
    async fn test_update_plan_keeps_usage() {
        let (ledger, _store, _temp) = build_ledger().await;
        let admin = Actor::new("admin", MemberRole::Admin);
        ledger
            .consume("org-1", "member", ConsumeRequest::new("enrichment", 150))
            .await
            .unwrap();

        let change = ledger.update_plan(&admin, "org-1", "premier").await.unwrap();
        assert_eq!(change.plan.id, "premier");
        assert_eq!(change.enrichment_limit, 15_000);

        let summary = ledger.credits("org-1").await.unwrap();
        assert_eq!(summary.enrichment.used, 150);
        assert_eq!(summary.enrichment.remaining, 14_850);
        assert_eq!(summary.plan.name, "Premier");
    }

    #[tokio::test]
    async fn test_update_plan_rejects_unknown_plan_and_non_admin() {
        let (ledger, store, _temp) = build_ledger().await;

        let err = ledger
            .update_plan(&Actor::new("owner", MemberRole::Owner), "org-1", "platinum")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ledger
            .update_plan(&Actor::new("member", MemberRole::Member), "org-1", "basic")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(store.get_org_credit("org-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_downgrade_below_usage_reports_zero_remaining() {
        let (ledger, _store, _temp) = build_ledger().await;
        let owner = Actor::new("owner", MemberRole::Owner);
        ledger.update_plan(&owner, "org-1", "basic").await.unwrap();
        ledger
            .consume("org-1", "member", ConsumeRequest::new("enrichment", 400))
            .await
            .unwrap();

        ledger.update_plan(&owner, "org-1", "free").await.unwrap();
        let summary = ledger.credits("org-1").await.unwrap();
        assert_eq!(summary.enrichment.used, 400);
        assert_eq!(summary.enrichment.remaining, 0);

        let err = ledger
            .consume("org-1", "member", ConsumeRequest::new("enrichment", 1))
            .await
            .unwrap_err();
        assert_eq!(err.remaining(), Some(0));
    }

    #[tokio::test]
    async fn test_sync_member_keeps_limits_and_usage() {
        let (ledger, _store, _temp) = build_ledger().await;
        let owner = Actor::new("owner", MemberRole::Owner);
        ledger
            .set_member_limits(&owner, "org-1", "member", cap(50))
            .await
            .unwrap();
        ledger
            .consume("org-1", "member", ConsumeRequest::new("enrichment", 20))
            .await
            .unwrap();

        let synced = ledger
            .sync_member(MemberSync {
                org_id: "org-1".to_string(),
                user_id: "member".to_string(),
                role: MemberRole::Admin,
                email: None,
                display_name: Some("Mem Ber".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(synced.role, MemberRole::Admin);
        assert_eq!(synced.enrichment_limit, Some(50));
        assert_eq!(synced.enrichment_used, 20);
        assert_eq!(synced.email.as_deref(), Some("member@example.com"));
        assert_eq!(synced.display_name.as_deref(), Some("Mem Ber"));
    }

    #[tokio::test]
    async fn test_member_usage_lists_everyone_for_admins_only() {
        let (ledger, _store, _temp) = build_ledger().await;

        let members = ledger
            .member_usage(&Actor::new("admin", MemberRole::Admin), "org-1")
            .await
            .unwrap();
        let roles: Vec<MemberRole> = members.iter().map(|member| member.role).collect();
        assert_eq!(
            roles,
            vec![MemberRole::Owner, MemberRole::Admin, MemberRole::Member]
        );

        let err = ledger
            .member_usage(&Actor::new("member", MemberRole::Member), "org-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_member_limits_for_unknown_member_leaves_org_untouched() {
        let (ledger, store, _temp) = build_ledger().await;

        let err = ledger.member_limits("org-2", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::MemberNotFound { .. }));
        assert!(store.get_org_credit("org-2").await.unwrap().is_none());

        let snapshot = ledger.member_limits("org-1", "member").await.unwrap();
        assert_eq!(snapshot.user_id, "member");
        assert!(store.get_org_credit("org-1").await.unwrap().is_some());
    }
}
