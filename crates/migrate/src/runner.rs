//! Ordered execution of migration steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::artifact::ArtifactSource;
use crate::deployer::{DeployOptions, Deployer};
use crate::ledger::SharedLedger;
use crate::reporter::{ReportEntry, Reporter};
use crate::transport::ChainTransport;
use crate::{MigrateError, Network};

/// One ordered unit of deployment/wiring work.
///
/// Steps receive their dependencies explicitly, scoped to one runner
/// invocation; there is no ambient deployer or reporter state.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    async fn run(&self, deployer: &Deployer, reporter: &mut Reporter) -> Result<(), MigrateError>;
}

/// A step together with its position in the pipeline.
///
/// The ordinal is the total order key; two descriptors sharing an ordinal
/// are a configuration error.
pub struct StepDescriptor {
    pub ordinal: u32,
    pub name: String,
    step: Box<dyn MigrationStep>,
}

impl StepDescriptor {
    pub fn new(ordinal: u32, name: impl Into<String>, step: impl MigrationStep + 'static) -> Self {
        Self {
            ordinal,
            name: name.into(),
            step: Box::new(step),
        }
    }
}

/// Cooperative cancellation flag.
///
/// Checked at step boundaries only: a submitted transaction cannot be
/// un-sent, so a step in flight always runs to completion and its confirmed
/// deployments are recorded before the run stops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Policy and tuning for one run.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Log step failures and keep going instead of halting at the first one.
    /// Configuration and ledger-integrity errors halt regardless.
    pub continue_on_error: bool,
    pub deploy: DeployOptions,
    pub cancel: CancelFlag,
}

/// A step that failed during a run.
#[derive(Debug)]
pub struct StepFailure {
    pub ordinal: u32,
    pub name: String,
    pub error: MigrateError,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All steps ran (or their failures were skipped per the continue policy).
    Completed,
    /// Stopped at a failure.
    Halted,
    /// Stopped at a step boundary by the cancellation flag.
    Cancelled,
}

/// What a run produced: its terminal state, every failure, and the report
/// entries accumulated up to the point it stopped.
#[derive(Debug)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub failures: Vec<StepFailure>,
    pub entries: Vec<ReportEntry>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failures.is_empty()
    }
}

/// Executes migration steps strictly in ordinal order.
///
/// Each step gets a fresh [`Deployer`] bound to the run's network and
/// transport, plus the shared reporter. Ledger state is flushed to storage
/// after every step, so partial progress survives later failures.
pub struct Runner {
    network: Network,
    artifacts: Arc<dyn ArtifactSource>,
    transport: Arc<dyn ChainTransport>,
    ledger: SharedLedger,
    options: RunnerOptions,
}

impl Runner {
    pub fn new(
        network: Network,
        artifacts: Arc<dyn ArtifactSource>,
        transport: Arc<dyn ChainTransport>,
        ledger: SharedLedger,
        options: RunnerOptions,
    ) -> Self {
        Self {
            network,
            artifacts,
            transport,
            ledger,
            options,
        }
    }

    /// Run the pipeline.
    ///
    /// Fails up front with [`MigrateError::DuplicateOrdinal`] if the step set
    /// does not form a total order; otherwise always returns a [`RunResult`]
    /// carrying every failure and the report entries produced so far.
    pub async fn run(&self, steps: Vec<StepDescriptor>) -> Result<RunResult, MigrateError> {
        let steps = order_steps(steps)?;
        tracing::info!(network = %self.network, steps = steps.len(), "starting migration run");

        let mut reporter = Reporter::new();
        let mut failures = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for descriptor in &steps {
            if self.options.cancel.is_cancelled() {
                tracing::warn!(
                    ordinal = descriptor.ordinal,
                    name = %descriptor.name,
                    "run cancelled before step"
                );
                outcome = RunOutcome::Cancelled;
                break;
            }

            tracing::info!(ordinal = descriptor.ordinal, name = %descriptor.name, "running step");

            let deployer = Deployer::new(
                self.network.clone(),
                Arc::clone(&self.artifacts),
                Arc::clone(&self.transport),
                Arc::clone(&self.ledger),
                self.options.deploy.clone(),
            );
            let result = descriptor.step.run(&deployer, &mut reporter).await;

            // Flush regardless of the step result: deployments confirmed
            // before a failure must survive the failure.
            if let Err(err) = self.flush_ledger() {
                failures.push(StepFailure {
                    ordinal: descriptor.ordinal,
                    name: descriptor.name.clone(),
                    error: err,
                });
                outcome = RunOutcome::Halted;
                break;
            }

            match result {
                Ok(()) => {
                    tracing::info!(ordinal = descriptor.ordinal, name = %descriptor.name, "step complete");
                }
                Err(err) => {
                    tracing::error!(
                        ordinal = descriptor.ordinal,
                        name = %descriptor.name,
                        error = %err,
                        "step failed"
                    );
                    let halt = err.halts_run() || !self.options.continue_on_error;
                    failures.push(StepFailure {
                        ordinal: descriptor.ordinal,
                        name: descriptor.name.clone(),
                        error: err,
                    });
                    if halt {
                        outcome = RunOutcome::Halted;
                        break;
                    }
                }
            }
        }

        if !reporter.is_empty() {
            tracing::info!("deployment report:\n{}", reporter.render());
        }

        Ok(RunResult {
            outcome,
            failures,
            entries: reporter.entries().to_vec(),
        })
    }

    fn flush_ledger(&self) -> Result<(), MigrateError> {
        self.ledger.lock().expect("ledger lock poisoned").commit()
    }
}

/// Sort steps by ordinal and reject duplicates.
fn order_steps(mut steps: Vec<StepDescriptor>) -> Result<Vec<StepDescriptor>, MigrateError> {
    steps.sort_by_key(|s| s.ordinal);
    for pair in steps.windows(2) {
        if pair[0].ordinal == pair[1].ordinal {
            return Err(MigrateError::DuplicateOrdinal {
                ordinal: pair[0].ordinal,
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }
    }
    Ok(steps)
}
