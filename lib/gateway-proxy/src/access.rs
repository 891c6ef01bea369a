//! Resource-level access decisions

use gateway_core::{Principal, ResourceControl, TeamId, TeamMembershipService};
use std::collections::HashSet;

/// Everything needed to decide whether one caller may see a resource
#[derive(Clone, Debug)]
pub struct AccessContext {
    principal: Principal,
    team_ids: HashSet<TeamId>,
}

impl AccessContext {
    pub fn new(principal: Principal, team_ids: impl IntoIterator<Item = TeamId>) -> Self {
        Self {
            principal,
            team_ids: team_ids.into_iter().collect(),
        }
    }

    /// Resolve the caller's teams. Administrators skip the lookup.
    pub async fn resolve(
        principal: Principal,
        memberships: &dyn TeamMembershipService,
    ) -> gateway_core::Result<Self> {
        if principal.is_admin() {
            return Ok(Self::new(principal, []));
        }
        let teams = memberships
            .team_memberships_by_user_id(principal.user_id)
            .await?
            .into_iter()
            .map(|m| m.team_id);
        Ok(Self::new(principal, teams))
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_admin()
    }

    /// A resource without a control is public
    pub fn can_access(&self, control: Option<&ResourceControl>) -> bool {
        let Some(control) = control else {
            return true;
        };
        control.public
            || self.is_admin()
            || control.user_accesses.contains(&self.principal.user_id)
            || control.team_accesses.iter().any(|team| self.team_ids.contains(team))
    }
}
