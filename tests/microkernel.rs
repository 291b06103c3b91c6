// tests/microkernel.rs
//! End-to-end kernel behavior: containment, attribution and lookups

use agent_microkernel::outcome::{ExportFormat, FailurePhase, OutcomeExporter};
use agent_microkernel::{
    Agent, AgentFailure, AgentId, AgentSpec, AgentState, Kernel, KernelBuilder, KernelConfig,
    KernelError, KernelService, MicroKernelSkill, OutcomeFilter, OutcomeStatus, ServiceKey,
};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
#[error("Error in the agent")]
struct TestException;

/// Service handed to agents in these tests
struct Ledger {
    entries: Mutex<Vec<AgentId>>,
}

impl KernelService for Ledger {}

struct NeverRegistered;

/// Fails initialization with a wrapped `TestException`
struct FailingAgent;

#[async_trait]
impl Agent for FailingAgent {
    async fn initialize(&self, _skill: &MicroKernelSkill) -> anyhow::Result<bool> {
        Err(TestException).context("loading agent configuration")
    }
}

/// Records itself in the ledger and succeeds
struct LedgerAgent;

#[async_trait]
impl Agent for LedgerAgent {
    async fn initialize(&self, skill: &MicroKernelSkill) -> anyhow::Result<bool> {
        let ledger = skill
            .service::<Ledger>()
            .context("ledger service missing")?;
        ledger.entries.lock().push(skill.owner());
        Ok(true)
    }
}

/// Captures what its skill resolves during initialization
struct LookupAgent {
    seen: Arc<Mutex<Option<Lookups>>>,
}

struct Lookups {
    null_key: bool,
    ledger: Option<Arc<Ledger>>,
    unregistered: bool,
}

#[async_trait]
impl Agent for LookupAgent {
    async fn initialize(&self, skill: &MicroKernelSkill) -> anyhow::Result<bool> {
        let lookups = Lookups {
            null_key: skill.get_service(None).is_some(),
            ledger: skill.service::<Ledger>(),
            unregistered: skill
                .get_service(Some(&ServiceKey::of::<NeverRegistered>()))
                .is_some(),
        };
        *self.seen.lock() = Some(lookups);
        Ok(true)
    }
}

/// Runs far longer than any shutdown in these tests
struct StuckAgent;

#[async_trait]
impl Agent for StuckAgent {
    async fn initialize(&self, _skill: &MicroKernelSkill) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn run(&self, _skill: &MicroKernelSkill) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

async fn kernel_with_ledger() -> (Kernel, Arc<Ledger>) {
    let ledger = Arc::new(Ledger {
        entries: Mutex::new(Vec::new()),
    });
    let kernel = KernelBuilder::new(KernelConfig::default())
        .service(Arc::clone(&ledger))
        .unwrap()
        .start()
        .await
        .unwrap();
    (kernel, ledger)
}

#[tokio::test]
async fn failing_agent_records_single_outcome_with_root_cause() {
    let (kernel, _) = kernel_with_ledger().await;

    let id = kernel.spawn(None, FailingAgent).unwrap();
    let outcomes = kernel.outcomes().await_count(1, WAIT).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = outcomes.get(0).unwrap();
    assert_eq!(outcome.agent_id, id);
    assert_eq!(outcome.status, OutcomeStatus::Failed);

    // Controller wrapper, context layer, root cause
    let messages = outcome.cause_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], "loading agent configuration");
    assert_eq!(outcome.root_cause().unwrap().to_string(), "Error in the agent");
    assert!(outcome.find_cause::<TestException>().is_some());

    match outcome.failure.as_ref().unwrap() {
        AgentFailure::Raised { phase, .. } => assert_eq!(*phase, FailurePhase::Initialization),
        other => panic!("expected raised failure, got {:?}", other),
    }

    // Drain once more: still a single outcome for this agent
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(kernel.outcomes().query(OutcomeFilter::all().agent(id)).len(), 1);
    assert_eq!(kernel.agent_state(id), Some(AgentState::Terminated));
}

#[tokio::test]
async fn skill_lookups_resolve_through_kernel() {
    let (kernel, ledger) = kernel_with_ledger().await;
    let seen = Arc::new(Mutex::new(None));

    kernel
        .spawn(
            None,
            LookupAgent {
                seen: Arc::clone(&seen),
            },
        )
        .unwrap();
    kernel.outcomes().await_count(1, WAIT).await.unwrap();

    let lookups = seen.lock().take().unwrap();
    assert!(!lookups.null_key);
    assert!(Arc::ptr_eq(&lookups.ledger.unwrap(), &ledger));
    assert!(!lookups.unregistered);
}

#[tokio::test]
async fn failing_and_succeeding_agents_are_attributed() {
    let (kernel, ledger) = kernel_with_ledger().await;

    let bad = kernel.spawn(None, FailingAgent).unwrap();
    let good = kernel.spawn(None, LedgerAgent).unwrap();

    let outcomes = kernel.outcomes().await_count(2, WAIT).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let failed = outcomes.filter_by(OutcomeFilter::failed());
    let completed = outcomes.filter_by(OutcomeFilter::completed());
    assert_eq!(failed, vec![bad]);
    assert_eq!(completed, vec![good]);

    assert_eq!(*ledger.entries.lock(), vec![good]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_do_not_interfere() {
    let (kernel, ledger) = kernel_with_ledger().await;
    let mut failing = Vec::new();
    let mut succeeding = Vec::new();

    for n in 0..50 {
        if n % 2 == 0 {
            failing.push(kernel.spawn(None, FailingAgent).unwrap());
        } else {
            succeeding.push(kernel.spawn(None, LedgerAgent).unwrap());
        }
    }

    let outcomes = kernel.outcomes().await_count(50, WAIT).await.unwrap();
    assert_eq!(outcomes.len(), 50);

    for id in &failing {
        let query = kernel.outcomes().query(OutcomeFilter::all().agent(*id));
        assert_eq!(query.len(), 1);
        let outcome = query.get(0).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.failure.as_ref().unwrap().agent_id(), *id);
    }
    for id in &succeeding {
        let query = kernel.outcomes().query(OutcomeFilter::all().agent(*id));
        assert_eq!(query.get(0).unwrap().status, OutcomeStatus::Completed);
    }

    // Every succeeding agent reached the ledger despite the failures
    assert_eq!(ledger.entries.lock().len(), succeeding.len());
    assert!(kernel.service::<Ledger>().is_some());

    let stats = kernel.outcomes().stats();
    assert_eq!(stats.failed, 25);
    assert_eq!(stats.completed, 25);
}

#[tokio::test]
async fn children_are_filtered_by_parent() {
    let (kernel, _) = kernel_with_ledger().await;
    let parent = kernel.spawn(None, LedgerAgent).unwrap();

    let child = kernel.spawn(Some(parent), FailingAgent).unwrap();
    kernel.spawn(None, FailingAgent).unwrap();

    kernel.outcomes().await_count(3, WAIT).await.unwrap();
    let children = kernel.outcomes().query(OutcomeFilter::all().parent(parent));
    assert_eq!(children.len(), 1);
    assert_eq!(children.get(0).unwrap().agent_id, child);
}

#[tokio::test]
async fn await_count_reports_incomplete() {
    let (kernel, _) = kernel_with_ledger().await;
    kernel.spawn(None, LedgerAgent).unwrap();

    let result = kernel
        .outcomes()
        .await_count(2, Duration::from_millis(100))
        .await;

    match result {
        Err(err @ KernelError::OutcomesIncomplete { .. }) => {
            assert!(err.is_timeout());
            if let KernelError::OutcomesIncomplete { expected, observed } = err {
                assert_eq!(expected, 2);
                assert!(observed <= 1);
            }
        }
        other => panic!("expected OutcomesIncomplete, got {:?}", other.map(|q| q.len())),
    }
}

#[tokio::test]
async fn query_is_restartable() {
    let (kernel, _) = kernel_with_ledger().await;
    kernel.spawn(None, FailingAgent).unwrap();
    kernel.spawn(None, LedgerAgent).unwrap();

    let outcomes = kernel.outcomes().await_count(2, WAIT).await.unwrap();
    let first: Vec<_> = outcomes.iter().map(|o| o.agent_id).collect();
    let second: Vec<_> = outcomes.iter().map(|o| o.agent_id).collect();
    assert_eq!(first, second);

    let sequences: Vec<_> = (&outcomes).into_iter().map(|o| o.sequence).collect();
    assert_eq!(sequences, vec![0, 1]);
}

#[tokio::test]
async fn construction_errors_are_synchronous() {
    let (kernel, _) = kernel_with_ledger().await;

    let spec = AgentSpec::child_of(None);
    kernel.spawn_with(spec.clone(), LedgerAgent).unwrap();
    let duplicate = kernel.spawn_with(spec.clone(), LedgerAgent);
    assert!(matches!(duplicate, Err(KernelError::DuplicateAgentId(id)) if id == spec.id));

    let incompatible = AgentSpec::child_of(None).with_spec_version(semver::Version::new(1, 0, 0));
    let result = kernel.spawn_with(incompatible, LedgerAgent);
    assert!(matches!(
        result,
        Err(KernelError::IncompatibleSpecVersion { .. })
    ));

    kernel.outcomes().await_count(1, WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(kernel.outcomes().len(), 1);
    assert_eq!(kernel.agent_count(), 1);
}

#[tokio::test]
async fn shutdown_drains_agents_and_refuses_new_ones() {
    let (kernel, _) = kernel_with_ledger().await;
    for _ in 0..4 {
        kernel.spawn(None, FailingAgent).unwrap();
    }

    kernel.shutdown(WAIT).await.unwrap();
    assert_eq!(kernel.outcomes().len(), 4);
    assert_eq!(kernel.live_agents(), 0);

    let result = kernel.spawn(None, LedgerAgent);
    assert!(matches!(result, Err(KernelError::KernelNotRunning)));

    // Outcomes stay readable after shutdown
    assert_eq!(kernel.outcomes().query(OutcomeFilter::failed()).len(), 4);
}

#[tokio::test]
async fn shutdown_aborts_stuck_agents() {
    let (kernel, _) = kernel_with_ledger().await;
    let stuck = kernel.spawn(None, StuckAgent).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(kernel.live_agents(), 1);

    let result = kernel.shutdown(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(KernelError::ShutdownTimeout(1))));
    assert_eq!(kernel.live_agents(), 0);
    assert_eq!(kernel.agent_state(stuck), Some(AgentState::Terminated));
    assert!(kernel.outcomes().is_empty());
}

#[tokio::test]
async fn outcomes_export_as_junit() {
    let (kernel, _) = kernel_with_ledger().await;
    kernel.spawn(None, FailingAgent).unwrap();
    kernel.spawn(None, LedgerAgent).unwrap();
    kernel.outcomes().await_count(2, WAIT).await.unwrap();

    let report = OutcomeExporter::new(ExportFormat::JUnit)
        .export(&kernel.outcomes().snapshot())
        .unwrap();
    assert!(report.contains("tests=\"2\""));
    assert!(report.contains("failures=\"1\""));
    assert!(report.contains("Error in the agent"));
}

/// Collect agent ids of a query's outcomes matching `filter`
trait FilterBy {
    fn filter_by(&self, filter: OutcomeFilter) -> Vec<AgentId>;
}

impl FilterBy for agent_microkernel::OutcomeQuery {
    fn filter_by(&self, filter: OutcomeFilter) -> Vec<AgentId> {
        self.iter()
            .filter(|outcome| filter.matches(outcome))
            .map(|outcome| outcome.agent_id)
            .collect()
    }
}
