//! Query-level scoping for list endpoints.
//!
//! A [`ScopeFilter`] is computed once per request from the [`Actor`] and
//! passed down to every repository list function. The repository embeds it
//! as a `client_id = any($n)` predicate on the entity's statically known
//! owning-client column (joining along the ownership path where the column
//! lives one hop away).

use uuid::Uuid;

use crate::actor::Actor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Provider staff: no predicate at all.
    Unrestricted,
    /// Client member: restrict to these owning clients.
    Clients(Vec<Uuid>),
    /// Authenticated but memberless: every scoped list is empty.
    Nothing,
}

impl ScopeFilter {
    pub fn for_actor(actor: &Actor) -> Self {
        if actor.is_provider_staff() {
            return ScopeFilter::Unrestricted;
        }
        if actor.memberships.is_empty() {
            return ScopeFilter::Nothing;
        }
        ScopeFilter::Clients(actor.memberships.iter().map(|m| m.client_id).collect())
    }

    /// Restrict to the subset of memberships that can see billing objects.
    /// Memberless once the grant is filtered out → `Nothing`.
    pub fn for_actor_billing(actor: &Actor) -> Self {
        if actor.is_provider_staff() {
            return ScopeFilter::Unrestricted;
        }
        let ids: Vec<Uuid> = actor
            .memberships
            .iter()
            .filter(|m| m.can_view_billing)
            .map(|m| m.client_id)
            .collect();
        if ids.is_empty() {
            ScopeFilter::Nothing
        } else {
            ScopeFilter::Clients(ids)
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, ScopeFilter::Unrestricted)
    }

    /// Client ids to bind for the SQL predicate; `None` means no predicate.
    /// `Nothing` yields an empty slice, which `= any('{}')` matches never.
    pub fn client_ids(&self) -> Option<&[Uuid]> {
        match self {
            ScopeFilter::Unrestricted => None,
            ScopeFilter::Clients(ids) => Some(ids),
            ScopeFilter::Nothing => Some(&[]),
        }
    }

    pub fn allows(&self, client_id: Uuid) -> bool {
        match self {
            ScopeFilter::Unrestricted => true,
            ScopeFilter::Clients(ids) => ids.contains(&client_id),
            ScopeFilter::Nothing => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Membership;
    use nx_schemas::MemberRole;

    fn membership(client_id: Uuid, can_view_billing: bool) -> Membership {
        Membership {
            client_id,
            role: MemberRole::Member,
            can_view_billing,
            can_manage_team: false,
        }
    }

    #[test]
    fn staff_gets_unrestricted_filter() {
        let f = ScopeFilter::for_actor(&Actor::staff(Uuid::new_v4()));
        assert!(f.is_unrestricted());
        assert_eq!(f.client_ids(), None);
    }

    #[test]
    fn member_filter_carries_exactly_their_clients() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let actor = Actor::member(
            Uuid::new_v4(),
            vec![membership(a, false), membership(b, true)],
        );
        let f = ScopeFilter::for_actor(&actor);
        assert!(f.allows(a));
        assert!(f.allows(b));
        assert!(!f.allows(Uuid::new_v4()));
    }

    #[test]
    fn memberless_actor_sees_nothing() {
        let f = ScopeFilter::for_actor(&Actor::member(Uuid::new_v4(), vec![]));
        assert_eq!(f, ScopeFilter::Nothing);
        assert_eq!(f.client_ids(), Some(&[][..]));
        assert!(!f.allows(Uuid::new_v4()));
    }

    #[test]
    fn billing_filter_drops_memberships_without_the_grant() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let actor = Actor::member(
            Uuid::new_v4(),
            vec![membership(a, false), membership(b, true)],
        );

        let f = ScopeFilter::for_actor_billing(&actor);
        assert!(!f.allows(a));
        assert!(f.allows(b));

        let no_grant = Actor::member(Uuid::new_v4(), vec![membership(a, false)]);
        assert_eq!(ScopeFilter::for_actor_billing(&no_grant), ScopeFilter::Nothing);
    }
}
