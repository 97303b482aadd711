//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_cloud_controller_client;
mod http_scim_directory_client;
mod http_support;
mod in_memory_platform;
mod json_directory_group_provider;
mod json_membership_config;

pub use http_cloud_controller_client::HttpCloudControllerClient;
pub use http_scim_directory_client::HttpScimDirectoryClient;
pub use in_memory_platform::InMemoryPlatform;
pub use json_directory_group_provider::JsonDirectoryGroupProvider;
pub use json_membership_config::JsonMembershipConfig;
