//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod binding;
mod entity;
mod identity;
mod membership;
mod role;

pub use binding::RoleBinding;
pub use entity::EntityRef;
pub use identity::{DEFAULT_DIRECTORY_ORIGIN, INTERNAL_ORIGIN, IdentityRecord, Origin};
pub use membership::DesiredMembershipSpec;
pub use role::{EntityKind, RoleType};
