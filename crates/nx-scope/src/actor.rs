//! The requesting user as seen by permission resolution.

use nx_schemas::{MemberRole, UserRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One (user, client) membership link with its tenant-side role and the
/// special grants carried on the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub client_id: Uuid,
    pub role: MemberRole,
    pub can_view_billing: bool,
    pub can_manage_team: bool,
}

/// Authenticated user plus everything permission resolution needs, loaded
/// once per request. No DB handle: decisions are pure functions of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub memberships: Vec<Membership>,
}

impl Actor {
    /// Provider-side staff are unrestricted across all tenants.
    pub fn is_provider_staff(&self) -> bool {
        self.is_superuser || self.is_staff || self.role == UserRole::Admin
    }

    pub fn membership(&self, client_id: Uuid) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.client_id == client_id)
    }

    /// Member roles allowed to write within their client.
    pub fn is_client_manager(&self, client_id: Uuid) -> bool {
        matches!(
            self.membership(client_id).map(|m| m.role),
            Some(MemberRole::Owner) | Some(MemberRole::Admin)
        )
    }

    /// Convenience constructor for a staff actor (CLI, tests).
    pub fn staff(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: UserRole::Admin,
            is_staff: true,
            is_superuser: false,
            memberships: Vec::new(),
        }
    }

    /// Convenience constructor for a client-side actor.
    pub fn member(user_id: Uuid, memberships: Vec<Membership>) -> Self {
        Self {
            user_id,
            role: UserRole::Client,
            is_staff: false,
            is_superuser: false,
            memberships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(client_id: Uuid, role: MemberRole) -> Membership {
        Membership {
            client_id,
            role,
            can_view_billing: false,
            can_manage_team: false,
        }
    }

    #[test]
    fn staff_detection_covers_all_three_flags() {
        let mut a = Actor::member(Uuid::new_v4(), vec![]);
        assert!(!a.is_provider_staff());

        a.is_staff = true;
        assert!(a.is_provider_staff());

        a.is_staff = false;
        a.is_superuser = true;
        assert!(a.is_provider_staff());

        a.is_superuser = false;
        a.role = UserRole::Admin;
        assert!(a.is_provider_staff());
    }

    #[test]
    fn manager_requires_owner_or_admin_member_role() {
        let c = Uuid::new_v4();
        let owner = Actor::member(Uuid::new_v4(), vec![membership(c, MemberRole::Owner)]);
        let viewer = Actor::member(Uuid::new_v4(), vec![membership(c, MemberRole::Viewer)]);
        let outsider = Actor::member(Uuid::new_v4(), vec![]);

        assert!(owner.is_client_manager(c));
        assert!(!viewer.is_client_manager(c));
        assert!(!outsider.is_client_manager(c));
    }
}
