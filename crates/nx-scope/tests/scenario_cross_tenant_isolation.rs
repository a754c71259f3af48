//! Cross-tenant isolation: a member of client A must never read or write
//! an object owned by client B, whatever the domain overlay, while staff
//! pass every check. Exercises the same decision surface the daemon uses.

use nx_schemas::{DocVisibility, MemberRole};
use nx_scope::{check_read, check_write, Access, Actor, DenyReason, Membership, ObjectScope, ScopeFilter};
use uuid::Uuid;

fn full_member(client_id: Uuid) -> Actor {
    Actor::member(
        Uuid::new_v4(),
        vec![Membership {
            client_id,
            role: MemberRole::Owner,
            can_view_billing: true,
            can_manage_team: true,
        }],
    )
}

/// Object shapes standing in for each scoped domain, all owned by `c`.
fn all_domain_scopes(c: Uuid) -> Vec<ObjectScope> {
    vec![
        ObjectScope::client(c),                                        // client / project / task
        ObjectScope::client(c).with_visibility(DocVisibility::Public), // document
        ObjectScope::client(c).billing(),                              // invoice / quote / payment
        ObjectScope::client(c).with_ticket_public(true),               // ticket
    ]
}

#[test]
fn member_of_a_is_denied_everything_owned_by_b() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let actor = full_member(a);

    for scope in all_domain_scopes(b) {
        assert_eq!(
            check_read(&actor, &scope),
            Access::Denied(DenyReason::NotAMember)
        );
        assert_eq!(
            check_write(&actor, &scope),
            Access::Denied(DenyReason::NotAMember)
        );
    }
}

#[test]
fn member_of_a_passes_inside_a() {
    let a = Uuid::new_v4();
    let actor = full_member(a);

    for scope in all_domain_scopes(a) {
        assert!(check_read(&actor, &scope).is_granted());
        assert!(check_write(&actor, &scope).is_granted());
    }
}

#[test]
fn staff_pass_everywhere_including_overlays_that_block_members() {
    let staff = Actor::staff(Uuid::new_v4());
    let b = Uuid::new_v4();

    let blocked_for_members = [
        ObjectScope::client(b).with_visibility(DocVisibility::Internal),
        ObjectScope::client(b).with_ticket_public(false),
        ObjectScope::client(b).internal_note(),
    ];
    for scope in blocked_for_members {
        assert!(check_read(&staff, &scope).is_granted());
        assert!(check_write(&staff, &scope).is_granted());
    }
}

#[test]
fn list_filter_and_object_check_agree() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let actor = full_member(a);
    let filter = ScopeFilter::for_actor(&actor);

    // Whatever the filter admits, the object check must admit, and vice
    // versa — the two layers enforce one rule.
    assert_eq!(
        filter.allows(a),
        check_read(&actor, &ObjectScope::client(a)).is_granted()
    );
    assert_eq!(
        filter.allows(b),
        check_read(&actor, &ObjectScope::client(b)).is_granted()
    );
}
