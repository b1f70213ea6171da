//! Plan catalog definitions

use serde::Serialize;

/// Identifier of the plan every organization starts on.
pub const DEFAULT_PLAN_ID: &str = "free";

/// A subscription plan and the per-cycle limits it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub enrichment_limit: i64,
    pub icp_limit: i64,
    pub price_cents: i64,
}

const PLANS: [Plan; 5] = [
    Plan {
        id: "free",
        name: "Free",
        enrichment_limit: 200,
        icp_limit: 5,
        price_cents: 0,
    },
    Plan {
        id: "basic",
        name: "Basic",
        enrichment_limit: 1_000,
        icp_limit: 25,
        price_cents: 4_900,
    },
    Plan {
        id: "advanced",
        name: "Advanced",
        enrichment_limit: 5_000,
        icp_limit: 100,
        price_cents: 14_900,
    },
    Plan {
        id: "premier",
        name: "Premier",
        enrichment_limit: 15_000,
        icp_limit: 300,
        price_cents: 34_900,
    },
    Plan {
        id: "super",
        name: "Super",
        enrichment_limit: 50_000,
        icp_limit: 1_000,
        price_cents: 79_900,
    },
];

/// All plans, cheapest first.
pub fn plans() -> &'static [Plan] {
    &PLANS
}

/// Strict lookup; `None` for ids outside the catalog.
pub fn lookup_plan(plan_id: &str) -> Option<&'static Plan> {
    let plan_id = plan_id.trim();
    PLANS.iter().find(|plan| plan.id.eq_ignore_ascii_case(plan_id))
}

/// Resolve a plan id, falling back to the free plan for unknown ids.
pub fn resolve_plan(plan_id: &str) -> &'static Plan {
    lookup_plan(plan_id).unwrap_or_else(default_plan)
}

pub fn default_plan() -> &'static Plan {
    &PLANS[0]
}
