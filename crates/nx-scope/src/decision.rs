//! Object-level access decisions.

use nx_schemas::DocVisibility;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::Actor;

/// Everything permission resolution needs to know about one loaded object:
/// the client it resolved to, plus the domain overlays that can narrow a
/// member's access further.
#[derive(Debug, Clone)]
pub struct ObjectScope {
    pub client_id: Uuid,
    /// Document visibility overlay.
    visibility: Option<DocVisibility>,
    /// Ticket privacy overlay (`false` = staff-only).
    ticket_public: Option<bool>,
    /// Internal comment / internal ticket message.
    internal_note: bool,
    /// Billing-domain object (quote, invoice, payment).
    billing: bool,
}

impl ObjectScope {
    /// Plain scoped object owned by `client_id`, no overlays.
    pub fn client(client_id: Uuid) -> Self {
        Self {
            client_id,
            visibility: None,
            ticket_public: None,
            internal_note: false,
            billing: false,
        }
    }

    pub fn with_visibility(mut self, visibility: DocVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_ticket_public(mut self, is_public: bool) -> Self {
        self.ticket_public = Some(is_public);
        self
    }

    pub fn internal_note(mut self) -> Self {
        self.internal_note = true;
        self
    }

    pub fn billing(mut self) -> Self {
        self.billing = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Owning client not in the actor's membership set.
    NotAMember,
    /// Document is marked internal.
    InternalDocument,
    /// Ticket is private (staff-only).
    PrivateTicket,
    /// Internal comment or message.
    InternalNote,
    /// Membership lacks the billing grant.
    BillingHidden,
    /// Member role below owner/admin for a write.
    MemberRoleInsufficient,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotAMember => "not_a_member",
            DenyReason::InternalDocument => "internal_document",
            DenyReason::PrivateTicket => "private_ticket",
            DenyReason::InternalNote => "internal_note",
            DenyReason::BillingHidden => "billing_hidden",
            DenyReason::MemberRoleInsufficient => "member_role_insufficient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied(DenyReason),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Access::Granted => None,
            Access::Denied(r) => Some(*r),
        }
    }
}

/// May the actor read this object?
///
/// Staff are unrestricted. Members must hold the owning client, then pass
/// every overlay the object carries. Deny reasons report the first rule
/// that failed, in rule order.
pub fn check_read(actor: &Actor, scope: &ObjectScope) -> Access {
    if actor.is_provider_staff() {
        return Access::Granted;
    }

    let Some(membership) = actor.membership(scope.client_id) else {
        return Access::Denied(DenyReason::NotAMember);
    };

    if scope.visibility == Some(DocVisibility::Internal) {
        return Access::Denied(DenyReason::InternalDocument);
    }
    if scope.ticket_public == Some(false) {
        return Access::Denied(DenyReason::PrivateTicket);
    }
    if scope.internal_note {
        return Access::Denied(DenyReason::InternalNote);
    }
    if scope.billing && !membership.can_view_billing {
        return Access::Denied(DenyReason::BillingHidden);
    }

    Access::Granted
}

/// May the actor write this object?
///
/// Everything `check_read` enforces, plus an owner/admin member role for
/// non-staff. An object a member cannot read is never writable by them.
pub fn check_write(actor: &Actor, scope: &ObjectScope) -> Access {
    let read = check_read(actor, scope);
    if !read.is_granted() {
        return read;
    }
    if actor.is_provider_staff() {
        return Access::Granted;
    }
    if actor.is_client_manager(scope.client_id) {
        return Access::Granted;
    }
    Access::Denied(DenyReason::MemberRoleInsufficient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Membership;
    use nx_schemas::MemberRole;

    fn member_of(client_id: Uuid, role: MemberRole, billing: bool) -> Actor {
        Actor::member(
            Uuid::new_v4(),
            vec![Membership {
                client_id,
                role,
                can_view_billing: billing,
                can_manage_team: false,
            }],
        )
    }

    #[test]
    fn staff_read_and_write_everywhere() {
        let staff = Actor::staff(Uuid::new_v4());
        let scope = ObjectScope::client(Uuid::new_v4())
            .with_visibility(DocVisibility::Internal)
            .billing();
        assert!(check_read(&staff, &scope).is_granted());
        assert!(check_write(&staff, &scope).is_granted());
    }

    #[test]
    fn non_member_denied_before_any_overlay() {
        let actor = member_of(Uuid::new_v4(), MemberRole::Owner, true);
        let scope = ObjectScope::client(Uuid::new_v4());
        assert_eq!(
            check_read(&actor, &scope),
            Access::Denied(DenyReason::NotAMember)
        );
    }

    #[test]
    fn internal_document_hidden_from_members() {
        let c = Uuid::new_v4();
        let actor = member_of(c, MemberRole::Owner, true);

        let internal = ObjectScope::client(c).with_visibility(DocVisibility::Internal);
        assert_eq!(
            check_read(&actor, &internal),
            Access::Denied(DenyReason::InternalDocument)
        );
        // A member-side owner cannot write around the visibility rule either.
        assert_eq!(
            check_write(&actor, &internal),
            Access::Denied(DenyReason::InternalDocument)
        );

        for v in [DocVisibility::Public, DocVisibility::Restricted] {
            let scope = ObjectScope::client(c).with_visibility(v);
            assert!(check_read(&actor, &scope).is_granted());
        }
    }

    #[test]
    fn private_ticket_staff_only() {
        let c = Uuid::new_v4();
        let actor = member_of(c, MemberRole::Member, false);

        let private = ObjectScope::client(c).with_ticket_public(false);
        assert_eq!(
            check_read(&actor, &private),
            Access::Denied(DenyReason::PrivateTicket)
        );
        assert!(check_read(&actor, &ObjectScope::client(c).with_ticket_public(true)).is_granted());
    }

    #[test]
    fn internal_notes_hidden_from_members() {
        let c = Uuid::new_v4();
        let actor = member_of(c, MemberRole::Admin, true);
        let note = ObjectScope::client(c).internal_note();
        assert_eq!(
            check_read(&actor, &note),
            Access::Denied(DenyReason::InternalNote)
        );
    }

    #[test]
    fn billing_gate_requires_grant() {
        let c = Uuid::new_v4();
        let with_grant = member_of(c, MemberRole::Member, true);
        let without = member_of(c, MemberRole::Owner, false);

        let invoice = ObjectScope::client(c).billing();
        assert!(check_read(&with_grant, &invoice).is_granted());
        assert_eq!(
            check_read(&without, &invoice),
            Access::Denied(DenyReason::BillingHidden)
        );
    }

    #[test]
    fn write_needs_owner_or_admin_role() {
        let c = Uuid::new_v4();
        let scope = ObjectScope::client(c);

        assert!(check_write(&member_of(c, MemberRole::Owner, false), &scope).is_granted());
        assert!(check_write(&member_of(c, MemberRole::Admin, false), &scope).is_granted());
        assert_eq!(
            check_write(&member_of(c, MemberRole::Member, false), &scope),
            Access::Denied(DenyReason::MemberRoleInsufficient)
        );
        assert_eq!(
            check_write(&member_of(c, MemberRole::Viewer, false), &scope),
            Access::Denied(DenyReason::MemberRoleInsufficient)
        );
    }
}
