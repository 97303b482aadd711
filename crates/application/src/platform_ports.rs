mod directory;
mod entities;
mod identities;
mod paging;
mod roles;

pub use directory::{DirectoryGroupProvider, DirectoryMember};
pub use entities::EntitySource;
pub use identities::{IdentityDirectory, NewShadowUser};
pub use paging::{Page, PageRequest};
pub use roles::{JobHandle, JobState, RoleBindingSource};
