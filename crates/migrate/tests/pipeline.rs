//! End-to-end pipeline tests against the offline transport.
//!
//! These cover the run-level guarantees: idempotent re-runs, strict step
//! ordering, report completeness, halt/continue policy, and cross-step
//! constructor wiring.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_core::dyn_abi::DynSolValue;
use async_trait::async_trait;
use serde_json::{Value, json};

use eclair_migrate::{
    Artifact, ArtifactSource, CancelFlag, Deployer, FileLedger, MemoryLedger, MigrateError,
    MigrationStep, OfflineTransport, Reporter, RunOutcome, Runner, RunnerOptions, SharedLedger,
    StepDescriptor, shared_ledger,
};

fn artifact_json(constructor_inputs: Vec<Value>) -> Value {
    let mut abi = vec![json!({
        "type": "function",
        "name": "owner",
        "inputs": []
    })];
    if !constructor_inputs.is_empty() {
        abi.push(json!({ "type": "constructor", "inputs": constructor_inputs }));
    }
    json!({ "abi": abi, "bytecode": "0x6080604052348015600e575f5ffd5b50" })
}

/// Artifact source backed by a fixed name -> JSON map.
struct StaticArtifactSource {
    artifacts: HashMap<String, Value>,
}

impl StaticArtifactSource {
    fn new(entries: Vec<(&str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            artifacts: entries
                .into_iter()
                .map(|(name, json)| (name.to_owned(), json))
                .collect(),
        })
    }
}

impl ArtifactSource for StaticArtifactSource {
    fn resolve(&self, name: &str) -> Result<Artifact, MigrateError> {
        let json = self
            .artifacts
            .get(name)
            .ok_or_else(|| MigrateError::ArtifactNotFound(name.to_owned()))?;
        Artifact::from_json(name, json)
    }
}

/// Deploys a contract with no constructor arguments and reports it.
struct DeployStep {
    contract: &'static str,
}

#[async_trait]
impl MigrationStep for DeployStep {
    async fn run(&self, deployer: &Deployer, reporter: &mut Reporter) -> Result<(), MigrateError> {
        let handle = deployer.deploy(self.contract, &[]).await?;
        reporter.record_contract(&handle);
        Ok(())
    }
}

/// Deploys `contract` passing the address of `dependency` to the constructor.
struct WireStep {
    contract: &'static str,
    dependency: &'static str,
}

#[async_trait]
impl MigrationStep for WireStep {
    async fn run(&self, deployer: &Deployer, reporter: &mut Reporter) -> Result<(), MigrateError> {
        let dependency = deployer
            .deployed(self.dependency)
            .ok_or_else(|| MigrateError::Step(anyhow::anyhow!("{} not deployed", self.dependency)))?;
        let handle = deployer
            .deploy(self.contract, &[DynSolValue::Address(dependency)])
            .await?;
        reporter.record_contract(&handle);
        Ok(())
    }
}

/// Always fails with a step error.
struct FailingStep;

#[async_trait]
impl MigrationStep for FailingStep {
    async fn run(&self, _: &Deployer, _: &mut Reporter) -> Result<(), MigrateError> {
        Err(MigrateError::Step(anyhow::anyhow!(
            "ownership transfer reverted"
        )))
    }
}

fn runner(
    source: Arc<StaticArtifactSource>,
    transport: Arc<OfflineTransport>,
    ledger: SharedLedger,
    options: RunnerOptions,
) -> Runner {
    Runner::new("testnet".into(), source, transport, ledger, options)
}

fn whitelist_pipeline() -> (Arc<StaticArtifactSource>, Vec<StepDescriptor>) {
    let source = StaticArtifactSource::new(vec![("WhitelistManager", artifact_json(vec![]))]);
    let steps = vec![StepDescriptor::new(
        2,
        "whitelist",
        DeployStep {
            contract: "WhitelistManager",
        },
    )];
    (source, steps)
}

#[tokio::test]
async fn test_fresh_ledger_deploys_and_reports() {
    let (source, steps) = whitelist_pipeline();
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let result = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    assert!(result.is_success());
    assert_eq!(transport.submission_count(), 1);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].label, "WhitelistManager");
    assert!(result.entries[0].value.starts_with("0x"));
    assert_ne!(
        result.entries[0].value,
        format!("0x{}", "0".repeat(40)),
        "deployed address must be non-zero"
    );
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let (source, steps) = whitelist_pipeline();
    let first = runner(
        Arc::clone(&source),
        Arc::clone(&transport),
        Arc::clone(&ledger),
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    let (_, steps) = whitelist_pipeline();
    let second = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    // Zero new submissions, identical address.
    assert_eq!(transport.submission_count(), 1);
    assert!(second.is_success());
    assert_eq!(first.entries[0].value, second.entries[0].value);
}

#[tokio::test]
async fn test_idempotence_across_file_ledger_reopen() {
    let dir = tempdir::TempDir::new("eclair-pipeline").unwrap();
    let path = dir.path().join("testnet.json");
    let transport = Arc::new(OfflineTransport::new());

    let (source, steps) = whitelist_pipeline();
    let ledger = shared_ledger(FileLedger::open(&path).unwrap());
    let first = runner(
        Arc::clone(&source),
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();
    // Drop of the runner's ledger handle releases the file lock before the
    // second run reopens the store.

    let (_, steps) = whitelist_pipeline();
    let ledger = shared_ledger(FileLedger::open(&path).unwrap());
    let second = runner(source, Arc::clone(&transport), ledger, RunnerOptions::default())
        .run(steps)
        .await
        .unwrap();

    assert_eq!(transport.submission_count(), 1);
    assert_eq!(first.entries[0].value, second.entries[0].value);
}

#[tokio::test]
async fn test_force_redeploy_replaces_record() {
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let (source, steps) = whitelist_pipeline();
    runner(
        Arc::clone(&source),
        Arc::clone(&transport),
        Arc::clone(&ledger),
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    let mut options = RunnerOptions::default();
    options.deploy.force_redeploy = true;

    let (_, steps) = whitelist_pipeline();
    let second = runner(source, Arc::clone(&transport), ledger, options)
        .run(steps)
        .await
        .unwrap();

    assert!(second.is_success());
    assert_eq!(transport.submission_count(), 2);
}

#[tokio::test]
async fn test_later_step_sees_earlier_deployment() {
    let source = StaticArtifactSource::new(vec![
        ("Registry", artifact_json(vec![])),
        (
            "Gate",
            artifact_json(vec![json!({ "name": "registry", "type": "address" })]),
        ),
    ]);
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let steps = vec![
        StepDescriptor::new(1, "registry", DeployStep { contract: "Registry" }),
        StepDescriptor::new(
            2,
            "gate",
            WireStep {
                contract: "Gate",
                dependency: "Registry",
            },
        ),
    ];

    let result = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    assert!(result.is_success());
    assert_eq!(result.entries.len(), 2);

    // The second submission's init code must embed the first step's address.
    let registry_address = result.entries[0].value.trim_start_matches("0x").to_lowercase();
    let codes = transport.submitted_init_codes();
    assert_eq!(codes.len(), 2);
    let gate_init_code = hex::encode(&codes[1]);
    assert!(gate_init_code.contains(&registry_address));
}

#[tokio::test]
async fn test_steps_run_in_ordinal_order_not_registration_order() {
    let source = StaticArtifactSource::new(vec![
        ("Registry", artifact_json(vec![])),
        ("WhitelistManager", artifact_json(vec![])),
    ]);
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    // Registered out of order on purpose.
    let steps = vec![
        StepDescriptor::new(
            5,
            "whitelist",
            DeployStep {
                contract: "WhitelistManager",
            },
        ),
        StepDescriptor::new(1, "registry", DeployStep { contract: "Registry" }),
    ];

    let result = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    let labels: Vec<_> = result.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["Registry", "WhitelistManager"]);
}

#[tokio::test]
async fn test_duplicate_ordinals_abort_before_any_step() {
    let (source, _) = whitelist_pipeline();
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let steps = vec![
        StepDescriptor::new(
            2,
            "whitelist",
            DeployStep {
                contract: "WhitelistManager",
            },
        ),
        StepDescriptor::new(
            2,
            "whitelist-again",
            DeployStep {
                contract: "WhitelistManager",
            },
        ),
    ];

    let err = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap_err();

    assert!(matches!(err, MigrateError::DuplicateOrdinal { ordinal: 2, .. }));
    assert_eq!(transport.submission_count(), 0);
}

#[tokio::test]
async fn test_unknown_artifact_halts_with_empty_report() {
    let source = StaticArtifactSource::new(vec![]);
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    // Continue-on-error must not rescue a configuration error.
    let options = RunnerOptions {
        continue_on_error: true,
        ..Default::default()
    };

    let steps = vec![StepDescriptor::new(
        2,
        "whitelist",
        DeployStep {
            contract: "WhitelistManager",
        },
    )];

    let result = runner(source, Arc::clone(&transport), ledger, options)
        .run(steps)
        .await
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::Halted);
    assert!(result.entries.is_empty());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].ordinal, 2);
    assert!(matches!(
        result.failures[0].error,
        MigrateError::ArtifactNotFound(_)
    ));
    assert_eq!(transport.submission_count(), 0);
}

#[tokio::test]
async fn test_halt_policy_stops_at_first_step_failure() {
    let source = StaticArtifactSource::new(vec![("Registry", artifact_json(vec![]))]);
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let steps = vec![
        StepDescriptor::new(1, "break", FailingStep),
        StepDescriptor::new(2, "registry", DeployStep { contract: "Registry" }),
    ];

    let result = runner(
        source,
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(steps)
    .await
    .unwrap();

    assert_eq!(result.outcome, RunOutcome::Halted);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].name, "break");
    // The second step never ran.
    assert_eq!(transport.submission_count(), 0);
    assert!(result.entries.is_empty());
}

#[tokio::test]
async fn test_continue_policy_accumulates_failures() {
    let source = StaticArtifactSource::new(vec![("Registry", artifact_json(vec![]))]);
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let options = RunnerOptions {
        continue_on_error: true,
        ..Default::default()
    };

    let steps = vec![
        StepDescriptor::new(1, "break", FailingStep),
        StepDescriptor::new(2, "registry", DeployStep { contract: "Registry" }),
    ];

    let result = runner(source, Arc::clone(&transport), ledger, options)
        .run(steps)
        .await
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::Completed);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].label, "Registry");
    assert_eq!(transport.submission_count(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_between_steps() {
    let (source, steps) = whitelist_pipeline();
    let transport = Arc::new(OfflineTransport::new());
    let ledger = shared_ledger(MemoryLedger::new());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let options = RunnerOptions {
        cancel,
        ..Default::default()
    };

    let result = runner(source, Arc::clone(&transport), ledger, options)
        .run(steps)
        .await
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert!(result.failures.is_empty());
    assert_eq!(transport.submission_count(), 0);
}

#[tokio::test]
async fn test_partial_progress_survives_step_failure() {
    // One step deploys Registry and then fails: the Registry record must be
    // committed anyway, so the next run skips its deployment.
    struct DeployThenFail;

    #[async_trait]
    impl MigrationStep for DeployThenFail {
        async fn run(
            &self,
            deployer: &Deployer,
            reporter: &mut Reporter,
        ) -> Result<(), MigrateError> {
            let handle = deployer.deploy("Registry", &[]).await?;
            reporter.record_contract(&handle);
            Err(MigrateError::Step(anyhow::anyhow!("wiring failed")))
        }
    }

    let dir = tempdir::TempDir::new("eclair-pipeline").unwrap();
    let path = dir.path().join("testnet.json");
    let transport = Arc::new(OfflineTransport::new());

    let source = StaticArtifactSource::new(vec![("Registry", artifact_json(vec![]))]);
    let ledger = shared_ledger(FileLedger::open(&path).unwrap());
    let first = runner(
        Arc::clone(&source),
        Arc::clone(&transport),
        ledger,
        RunnerOptions::default(),
    )
    .run(vec![StepDescriptor::new(1, "registry", DeployThenFail)])
    .await
    .unwrap();

    assert_eq!(first.outcome, RunOutcome::Halted);
    assert_eq!(transport.submission_count(), 1);

    let ledger = shared_ledger(FileLedger::open(&path).unwrap());
    let second = runner(source, Arc::clone(&transport), ledger, RunnerOptions::default())
        .run(vec![StepDescriptor::new(
            1,
            "registry",
            DeployStep { contract: "Registry" },
        )])
        .await
        .unwrap();

    assert!(second.is_success());
    // Still one submission: the confirmed deployment was reused.
    assert_eq!(transport.submission_count(), 1);
}
