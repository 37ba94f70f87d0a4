//! This project's migration pipeline.

use async_trait::async_trait;
use eclair_migrate::{Deployer, MigrateError, MigrationStep, Reporter, StepDescriptor};

/// Deploy the whitelist manager and report its address.
struct DeployWhitelistManager;

#[async_trait]
impl MigrationStep for DeployWhitelistManager {
    async fn run(&self, deployer: &Deployer, reporter: &mut Reporter) -> Result<(), MigrateError> {
        let whitelist_manager = deployer.deploy("WhitelistManager", &[]).await?;
        reporter.record_contract(&whitelist_manager);
        Ok(())
    }
}

/// All registered migration steps. Ordinals define execution order.
pub fn steps() -> Vec<StepDescriptor> {
    vec![StepDescriptor::new(2, "whitelist", DeployWhitelistManager)]
}
