//! Client-scoping and permission resolution.
//!
//! This crate is the single authority on "may this user see/change this
//! object". It is deliberately pure: the DB layer resolves each entity to
//! its owning client along the entity's fixed ownership path (Task →
//! Project → Client, Payment → Invoice → Client, …) and hands the result
//! here as an [`ObjectScope`]; list queries are narrowed up front with a
//! [`ScopeFilter`]. Handlers never re-implement any of these rules.
//!
//! The rules, in order:
//! 1. Provider staff (superuser, staff flag, or admin profile role) are
//!    unrestricted.
//! 2. Otherwise the object's owning client must appear in the actor's
//!    membership set.
//! 3. Domain overlays can still deny a member: internal documents,
//!    private tickets, internal comments/messages, and billing objects
//!    when the membership lacks `can_view_billing`.
//! 4. Writes additionally require an `owner` or `admin` member role.

pub mod actor;
pub mod decision;
pub mod filter;

pub use actor::{Actor, Membership};
pub use decision::{check_read, check_write, Access, DenyReason, ObjectScope};
pub use filter::ScopeFilter;
