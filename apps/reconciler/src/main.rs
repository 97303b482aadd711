//! Rolesync reconciliation runner.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;

use rolesync_application::{CleanupOrchestrator, RunReport};
use rolesync_core::{AppError, AppResult};
use rolesync_infrastructure::{
    HttpCloudControllerClient, HttpScimDirectoryClient, JsonDirectoryGroupProvider,
    JsonMembershipConfig,
};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ReconcilerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ReconcilerConfig::load()?;
    let orchestrator = build_orchestrator(&config).await?;

    info!(
        api_url = %config.api_url,
        directory_url = %config.directory_url,
        config_path = %config.config_path.display(),
        dry_run = config.settings.peek,
        page_size = config.settings.page_size,
        "rolesync-reconciler started"
    );

    let report = orchestrator.run().await?;
    log_report(&report);

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|error| AppError::Internal(format!("failed to render run report: {error}")))?;
    println!("{rendered}");

    let failed = report.failed_organizations().count();
    if failed > 0 {
        return Err(AppError::Upstream(format!(
            "{failed} organization(s) failed to reconcile"
        )));
    }

    Ok(())
}

async fn build_orchestrator(config: &ReconcilerConfig) -> AppResult<CleanupOrchestrator> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let cloud_controller = Arc::new(
        HttpCloudControllerClient::new(
            http_client.clone(),
            config.api_url.clone(),
            config.access_token.as_str(),
        )
        .with_page_size(config.settings.page_size),
    );
    let identity_directory = Arc::new(HttpScimDirectoryClient::new(
        http_client,
        config.directory_url.clone(),
        config.access_token.as_str(),
    ));
    let membership_config = Arc::new(JsonMembershipConfig::from_path(&config.config_path).await?);

    let orchestrator = CleanupOrchestrator::new(
        membership_config,
        cloud_controller.clone(),
        identity_directory,
        cloud_controller,
        config.settings,
    );

    match &config.directory_export_path {
        Some(path) => {
            let directory = JsonDirectoryGroupProvider::from_path(path).await?;
            Ok(orchestrator.with_directory_provider(Arc::new(directory)))
        }
        None => Ok(orchestrator),
    }
}

fn log_report(report: &RunReport) {
    for organization in &report.organizations {
        match &organization.error {
            Some(error) => warn!(
                organization = %organization.name,
                error = %error,
                "organization failed to reconcile"
            ),
            None => info!(
                organization = %organization.name,
                added = organization.added(),
                removed = organization.removed(),
                retained = organization.retained.len(),
                deleted_accounts = organization.deleted_accounts.len(),
                "organization reconciled"
            ),
        }
    }

    info!(
        dry_run = report.dry_run,
        added = report.added(),
        removed = report.removed(),
        failed = report.failed_organizations().count(),
        "cleanup pass finished"
    );
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
