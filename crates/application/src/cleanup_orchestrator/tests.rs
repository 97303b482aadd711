use std::collections::BTreeMap;
use std::sync::Arc;

use rolesync_core::Guid;
use rolesync_domain::{DesiredMembershipSpec, Origin, RoleType};

use crate::config_ports::{GlobalPolicy, OrganizationMembershipConfig, SpaceMembershipConfig};
use crate::test_support::{FakeConfigReader, FakePlatform, PlatformCall, directory_member, identity};

use super::{CleanupOrchestrator, CleanupSettings, RetentionReason};

fn orchestrator(
    platform: &Arc<FakePlatform>,
    policy: GlobalPolicy,
    organizations: Vec<OrganizationMembershipConfig>,
    peek: bool,
) -> CleanupOrchestrator {
    let config_reader = Arc::new(FakeConfigReader {
        policy,
        organizations,
    });
    CleanupOrchestrator::new(
        config_reader,
        platform.clone(),
        platform.clone(),
        platform.clone(),
        CleanupSettings {
            page_size: 2,
            peek,
            ..CleanupSettings::default()
        },
    )
    .with_directory_provider(platform.clone())
}

fn roles(
    entries: impl IntoIterator<Item = (RoleType, DesiredMembershipSpec)>,
) -> BTreeMap<RoleType, DesiredMembershipSpec> {
    entries.into_iter().collect()
}

fn direct_users(usernames: &[&str]) -> DesiredMembershipSpec {
    DesiredMembershipSpec {
        direct_users: usernames
            .iter()
            .map(|username| (*username).to_owned())
            .collect(),
        ..DesiredMembershipSpec::default()
    }
}

fn removal_policy() -> GlobalPolicy {
    GlobalPolicy {
        remove_users: true,
        ..GlobalPolicy::default()
    }
}

#[tokio::test]
async fn full_pass_converges_roles_and_cleans_up() {
    let platform = Arc::new(FakePlatform::new());
    let organization = platform.add_organization("dev").await;
    let space = platform.add_space(&organization, "sandbox").await;
    platform
        .add_group("eng", vec![directory_member("alice")])
        .await;

    let frank = identity("frank", Origin::internal());
    let carol = identity("carol", Origin::internal());
    let dave = identity("dave", Origin::internal());
    let erin = identity("erin", Origin::internal());
    let orphan = Guid::random();
    for record in [&frank, &carol, &dave, &erin] {
        platform.add_identity(record.clone()).await;
    }
    for member in [carol.guid(), dave.guid(), erin.guid()] {
        platform
            .add_binding(&organization, RoleType::OrganizationUser, member)
            .await;
    }
    platform
        .add_binding(&organization, RoleType::OrganizationAuditor, carol.guid())
        .await;
    platform
        .add_binding(&space, RoleType::SpaceDeveloper, erin.guid())
        .await;
    platform
        .add_binding(&organization, RoleType::OrganizationManager, &orphan)
        .await;

    let config = OrganizationMembershipConfig {
        name: "dev".to_owned(),
        roles: roles([(
            RoleType::OrganizationManager,
            DesiredMembershipSpec {
                directory_groups: vec!["eng".to_owned()],
                ..DesiredMembershipSpec::default()
            },
        )]),
        spaces: vec![SpaceMembershipConfig {
            name: "sandbox".to_owned(),
            remove_users: Some(false),
            roles: roles([(RoleType::SpaceDeveloper, direct_users(&["frank"]))]),
        }],
        ..OrganizationMembershipConfig::default()
    };

    let report = orchestrator(&platform, removal_policy(), vec![config], false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(report.is_success());
    let organization_report = &report.organizations[0];
    assert!(organization_report.removal_enabled);
    assert_eq!(organization_report.deleted_accounts, vec![orphan.clone()]);
    assert!(
        organization_report
            .retained
            .iter()
            .any(|member| {
                member.username == "erin" && member.reason == RetentionReason::RemovalDisabled
            })
    );

    let alice = platform
        .identity_named("alice")
        .await
        .unwrap_or_else(|| panic!("alice was not provisioned"));
    assert!(
        platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationManager,
                alice.guid(),
            )
            .await
    );
    assert!(
        platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationUser,
                frank.guid(),
            )
            .await
    );
    assert!(
        platform
            .has_binding(space.guid(), RoleType::SpaceDeveloper, frank.guid())
            .await
    );
    assert!(
        !platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationAuditor,
                carol.guid(),
            )
            .await
    );
    assert!(
        !platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationUser,
                carol.guid(),
            )
            .await
    );
    assert!(
        platform
            .has_binding(organization.guid(), RoleType::OrganizationUser, erin.guid())
            .await
    );
    assert!(
        !platform
            .has_binding(organization.guid(), RoleType::OrganizationUser, dave.guid())
            .await
    );
    assert!(
        !platform
            .has_binding(organization.guid(), RoleType::OrganizationManager, &orphan)
            .await
    );
    assert!(
        organization_report
            .operations
            .iter()
            .any(|operation| operation.orphaned && operation.member_guid == orphan)
    );
}

#[tokio::test]
async fn unconfigured_role_members_are_removed_when_removal_is_enabled() {
    let platform = Arc::new(FakePlatform::new());
    let organization = platform.add_organization("dev").await;
    let space = platform.add_space(&organization, "sandbox").await;
    let frank = identity("frank", Origin::internal());
    let carol = identity("carol", Origin::internal());
    platform.add_identity(frank.clone()).await;
    platform.add_identity(carol.clone()).await;
    platform
        .add_binding(&organization, RoleType::OrganizationUser, carol.guid())
        .await;
    platform
        .add_binding(&organization, RoleType::OrganizationAuditor, carol.guid())
        .await;
    platform
        .add_binding(&space, RoleType::SpaceAuditor, carol.guid())
        .await;
    let organizations = vec![OrganizationMembershipConfig {
        name: "dev".to_owned(),
        roles: roles([(RoleType::OrganizationManager, direct_users(&["frank"]))]),
        spaces: vec![SpaceMembershipConfig {
            name: "sandbox".to_owned(),
            ..SpaceMembershipConfig::default()
        }],
        ..OrganizationMembershipConfig::default()
    }];

    let report = orchestrator(&platform, removal_policy(), organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(report.is_success());
    assert!(
        !platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationAuditor,
                carol.guid(),
            )
            .await
    );
    assert!(
        !platform
            .has_binding(space.guid(), RoleType::SpaceAuditor, carol.guid())
            .await
    );
    assert!(
        !platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationUser,
                carol.guid(),
            )
            .await
    );
    assert!(
        platform
            .has_binding(
                organization.guid(),
                RoleType::OrganizationManager,
                frank.guid(),
            )
            .await
    );
    assert_eq!(report.organizations[0].removed(), 3);
}

#[tokio::test]
async fn unconfigured_role_members_are_retained_when_removal_is_disabled() {
    let platform = Arc::new(FakePlatform::new());
    let organization = platform.add_organization("dev").await;
    let carol = identity("carol", Origin::internal());
    platform.add_identity(carol.clone()).await;
    platform
        .add_binding(&organization, RoleType::OrganizationUser, carol.guid())
        .await;
    platform
        .add_binding(&organization, RoleType::OrganizationAuditor, carol.guid())
        .await;
    let organizations = vec![OrganizationMembershipConfig {
        name: "dev".to_owned(),
        ..OrganizationMembershipConfig::default()
    }];

    let report = orchestrator(&platform, GlobalPolicy::default(), organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(platform.calls().await.is_empty());
    let retained = &report.organizations[0].retained;
    assert_eq!(retained.len(), 1);
    assert_eq!(retained[0].role_type, RoleType::OrganizationAuditor);
    assert_eq!(retained[0].reason, RetentionReason::RemovalDisabled);
}

#[tokio::test]
async fn failing_organization_does_not_stop_the_pass() {
    let platform = Arc::new(FakePlatform::new());
    platform.add_organization("dev").await;
    platform
        .add_identity(identity("frank", Origin::internal()))
        .await;
    let organizations = vec![
        OrganizationMembershipConfig {
            name: "missing".to_owned(),
            ..OrganizationMembershipConfig::default()
        },
        OrganizationMembershipConfig {
            name: "dev".to_owned(),
            roles: roles([(RoleType::OrganizationAuditor, direct_users(&["frank"]))]),
            ..OrganizationMembershipConfig::default()
        },
    ];

    let report = orchestrator(&platform, GlobalPolicy::default(), organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(!report.is_success());
    let failed: Vec<&str> = report
        .failed_organizations()
        .map(|organization| organization.name.as_str())
        .collect();
    assert_eq!(failed, vec!["missing"]);
    assert!(
        report.organizations[0]
            .error
            .as_deref()
            .is_some_and(|message| message.contains("not found"))
    );
    assert_eq!(report.organizations[1].added(), 1);
}

#[tokio::test]
async fn derived_role_in_configuration_fails_only_that_organization() {
    let platform = Arc::new(FakePlatform::new());
    platform.add_organization("dev").await;
    let organizations = vec![OrganizationMembershipConfig {
        name: "dev".to_owned(),
        roles: roles([(RoleType::OrganizationUser, direct_users(&["frank"]))]),
        ..OrganizationMembershipConfig::default()
    }];

    let report = orchestrator(&platform, GlobalPolicy::default(), organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(
        report.organizations[0]
            .error
            .as_deref()
            .is_some_and(|message| message.contains("validation error"))
    );
    assert!(platform.calls().await.is_empty());
}

#[tokio::test]
async fn peek_mode_plans_against_missing_organization() {
    let platform = Arc::new(FakePlatform::new());
    platform
        .add_identity(identity("frank", Origin::internal()))
        .await;
    let organizations = vec![OrganizationMembershipConfig {
        name: "planned".to_owned(),
        roles: roles([(RoleType::OrganizationManager, direct_users(&["frank"]))]),
        spaces: vec![SpaceMembershipConfig {
            name: "sandbox".to_owned(),
            roles: roles([(RoleType::SpaceAuditor, direct_users(&["frank"]))]),
            ..SpaceMembershipConfig::default()
        }],
        ..OrganizationMembershipConfig::default()
    }];

    let report = orchestrator(&platform, removal_policy(), organizations, true)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(report.dry_run);
    assert!(report.is_success());
    let organization_report = &report.organizations[0];
    assert!(organization_report.synthetic);
    assert_eq!(organization_report.added(), 3);
    assert!(platform.calls().await.is_empty());
}

#[tokio::test]
async fn protected_organization_user_is_kept() {
    let platform = Arc::new(FakePlatform::new());
    let organization = platform.add_organization("dev").await;
    let admin = identity("admin", Origin::internal());
    platform
        .add_binding(&organization, RoleType::OrganizationUser, admin.guid())
        .await;
    platform.add_identity(admin.clone()).await;
    let policy = GlobalPolicy {
        protected_users: vec!["ADMIN".to_owned()],
        ..removal_policy()
    };
    let organizations = vec![OrganizationMembershipConfig {
        name: "dev".to_owned(),
        ..OrganizationMembershipConfig::default()
    }];

    let report = orchestrator(&platform, policy, organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(platform.calls().await.is_empty());
    assert_eq!(report.organizations[0].retained.len(), 1);
    assert_eq!(
        report.organizations[0].retained[0].reason,
        RetentionReason::Protected
    );
}

#[tokio::test]
async fn orphan_shared_by_two_organizations_is_deleted_once() {
    let platform = Arc::new(FakePlatform::new());
    let first = platform.add_organization("first").await;
    let second = platform.add_organization("second").await;
    let orphan = Guid::random();
    platform
        .add_binding(&first, RoleType::OrganizationAuditor, &orphan)
        .await;
    platform
        .add_binding(&second, RoleType::OrganizationManager, &orphan)
        .await;
    let organizations = ["first", "second"]
        .into_iter()
        .map(|name| OrganizationMembershipConfig {
            name: name.to_owned(),
            ..OrganizationMembershipConfig::default()
        })
        .collect();

    let report = orchestrator(&platform, GlobalPolicy::default(), organizations, false)
        .run()
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(report.is_success());
    let deletions = platform
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, PlatformCall::DeleteUserAccount { .. }))
        .count();
    assert_eq!(deletions, 1);
    assert!(report.organizations[1].deleted_accounts.is_empty());
}
