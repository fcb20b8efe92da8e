// ABOUTME: Integration tests for the deployment orchestrator.
// ABOUTME: Drives deploy and rollback against fakes and a real on-disk version store.

mod support;

use std::error::Error as _;
use stevedore::config::Config;
use stevedore::deploy::{
    AttemptOutcome, DeployError, DeployErrorKind, DeployRequest, Orchestrator, RollbackRequest,
};
use stevedore::health::{CancelSignal, HealthError};
use stevedore::notify::{Event, Status};
use stevedore::store::{PayloadRef, Provenance, SnapshotStatus, StoreError, VersionStore};
use stevedore::strategy::{DispatchError, StrategyKind};
use stevedore::types::{EnvironmentName, VersionId};
use support::{FakeSource, RecordingNotifier, ScriptedProbe, SpyDispatch};
use tempfile::TempDir;

const CONFIG: &str = r#"
project: shop
environments:
  dev:
    target_url: http://dev.example.com
  staging:
    target_url: http://staging.example.com
  prod:
    target_url: http://app.example.com
  sandbox:
    skip_health_check: true
versions:
  keep: 5
"#;

struct Harness {
    _dir: TempDir,
    config: Config,
    store: VersionStore,
    dispatch: SpyDispatch,
    probe: ScriptedProbe,
    notifier: RecordingNotifier,
    source: FakeSource,
}

impl Harness {
    fn new(dispatch: SpyDispatch, probe: ScriptedProbe) -> Self {
        support::init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(CONFIG).unwrap();
        let store = VersionStore::open(dir.path().join("versions"), config.versions.keep);
        Self {
            _dir: dir,
            config,
            store,
            dispatch,
            probe,
            notifier: RecordingNotifier::default(),
            source: FakeSource::clean(),
        }
    }

    fn healthy() -> Self {
        Self::new(SpyDispatch::default(), ScriptedProbe::healthy())
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config,
            &self.store,
            &self.dispatch,
            &self.probe,
            &self.notifier,
            &self.source,
        )
    }

    /// Record a prior good deployment directly in the store.
    fn seed(&self, environment: &str, version: &str) {
        self.store
            .save(
                &env(environment),
                &v(version),
                &image(version),
                StrategyKind::Docker,
                &Provenance::default(),
            )
            .unwrap();
    }

    fn versions(&self, environment: &str) -> Vec<String> {
        self.store
            .list(&env(environment))
            .unwrap()
            .into_iter()
            .map(|s| s.version_id.to_string())
            .collect()
    }
}

fn env(name: &str) -> EnvironmentName {
    EnvironmentName::new(name).unwrap()
}

fn v(id: &str) -> VersionId {
    VersionId::new(id).unwrap()
}

fn image(version: &str) -> PayloadRef {
    PayloadRef::Image {
        reference: format!("registry.example.com/shop:{version}"),
    }
}

fn request(environment: &str, version: &str) -> DeployRequest {
    DeployRequest {
        environment: environment.to_string(),
        version: v(version),
        strategy: StrategyKind::Docker,
        payload: image(version),
        force: false,
        skip_health: false,
        approvals: Vec::new(),
        rollback: true,
    }
}

mod deploy {
    use super::*;

    /// Test: a healthy staging deploy records exactly one snapshot.
    #[tokio::test]
    async fn staging_deploy_succeeds_and_records_snapshot() {
        let h = Harness::healthy();

        let report = h
            .orchestrator()
            .deploy(&request("staging", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.outcome, AttemptOutcome::Success);
        assert_eq!(report.health_attempts, Some(1));
        assert_eq!(report.snapshot.status, SnapshotStatus::Deployed);
        assert_eq!(report.snapshot.source_commit.as_deref(), Some("a1b2c3d"));
        assert_eq!(report.snapshot.source_branch.as_deref(), Some("main"));
        assert_eq!(h.versions("staging"), vec!["1.0.1"]);
        assert_eq!(h.dispatch.history(), vec![("1.0.1".to_string(), false)]);
        assert_eq!(h.probe.count(), 1);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, Event::Deployment);
        assert_eq!(sent[0].status, Status::Succeeded);
        assert_eq!(sent[0].message, "1.0.1 deployed to staging");
    }

    /// Test: prod refuses deployment without --force and touches nothing.
    #[tokio::test]
    async fn prod_without_override_is_not_allowed() {
        let h = Harness::healthy();

        let failure = h
            .orchestrator()
            .deploy(&request("prod", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::NotAllowed { .. }));
        assert_eq!(failure.error.kind(), DeployErrorKind::Validation);
        assert_eq!(failure.outcome, AttemptOutcome::Failed);
        assert_eq!(h.dispatch.count(), 0);
        assert_eq!(h.probe.count(), 0);
        assert!(h.versions("prod").is_empty());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, Status::Failed);
    }

    /// Test: --force alone does not satisfy the approval requirement.
    #[tokio::test]
    async fn prod_needs_approvals_even_when_forced() {
        let h = Harness::healthy();
        let mut req = request("prod", "1.0.1");
        req.force = true;
        req.approvals = vec!["  ".to_string(), String::new()];

        let failure = h
            .orchestrator()
            .deploy(&req, &CancelSignal::never())
            .await
            .unwrap_err();

        match failure.error {
            DeployError::InsufficientApprovals {
                required, supplied, ..
            } => {
                assert_eq!(required, 1);
                assert_eq!(supplied, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Test: forced and approved prod deploys go through.
    #[tokio::test]
    async fn prod_with_force_and_approval_succeeds() {
        let h = Harness::healthy();
        let mut req = request("prod", "2.0.0");
        req.force = true;
        req.approvals = vec!["alice".to_string(), " alice ".to_string()];

        let report = h
            .orchestrator()
            .deploy(&req, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(report.snapshot.environment, env("prod"));
        assert_eq!(h.dispatch.count(), 1);
    }

    /// Test: a dirty working tree blocks prod even when approved.
    #[tokio::test]
    async fn dirty_tree_blocks_prod() {
        let mut h = Harness::healthy();
        h.source = FakeSource::dirty();
        h.config
            .environments
            .get_mut("prod")
            .unwrap()
            .auto_deploy = Some(true);
        let mut req = request("prod", "2.0.0");
        req.approvals = vec!["alice".to_string()];

        let failure = h
            .orchestrator()
            .deploy(&req, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, DeployError::DirtyWorkingTree { .. }));
        assert_eq!(h.dispatch.count(), 0);

        // staging does not care about the working tree
        h.orchestrator()
            .deploy(&request("staging", "2.0.0"), &CancelSignal::never())
            .await
            .unwrap();
    }

    /// Test: unknown environments are rejected without a notification.
    #[tokio::test]
    async fn unknown_environment_is_rejected() {
        let h = Harness::healthy();

        let failure = h
            .orchestrator()
            .deploy(&request("moon-base", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, DeployError::UnknownEnvironment { .. }));
        assert_eq!(failure.error.kind(), DeployErrorKind::Validation);
        assert_eq!(h.dispatch.count(), 0);

        let failure = h
            .orchestrator()
            .deploy(&request("Not Valid", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(failure.error.kind(), DeployErrorKind::Validation);
        // "moon-base" is a well-formed name, "Not Valid" is not
        assert_eq!(h.notifier.sent().len(), 1);
    }

    /// Test: skipped health checks never reach the prober.
    #[tokio::test]
    async fn skip_health_bypasses_probe() {
        let h = Harness::new(SpyDispatch::default(), ScriptedProbe::with_results(&[false]));

        let mut req = request("staging", "1.0.1");
        req.skip_health = true;
        let report = h
            .orchestrator()
            .deploy(&req, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(report.health_attempts, None);

        h.orchestrator()
            .deploy(&request("sandbox", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(h.probe.count(), 0);
    }

    /// Test: a failing notifier does not change a successful outcome.
    #[tokio::test]
    async fn notifier_failure_is_not_escalated() {
        let mut h = Harness::healthy();
        h.notifier = RecordingNotifier::broken();

        let report = h
            .orchestrator()
            .deploy(&request("staging", "1.0.1"), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(report.outcome, AttemptOutcome::Success);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    /// Test: recording a deployment applies retention.
    #[tokio::test]
    async fn deploy_prunes_old_versions() {
        let h = Harness::healthy();
        for i in 0..6 {
            h.orchestrator()
                .deploy(&request("staging", &format!("1.0.{i}")), &CancelSignal::never())
                .await
                .unwrap();
        }
        assert_eq!(
            h.versions("staging"),
            vec!["1.0.5", "1.0.4", "1.0.3", "1.0.2", "1.0.1"]
        );
    }
}

mod auto_rollback {
    use super::*;

    /// Test: an unhealthy dev deploy is rolled back to the previous snapshot.
    #[tokio::test]
    async fn health_failure_restores_previous_version() {
        let h = Harness::new(SpyDispatch::default(), ScriptedProbe::with_results(&[false]));
        h.seed("dev", "v0");

        let failure = h
            .orchestrator()
            .deploy(&request("dev", "v1"), &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(failure.outcome, AttemptOutcome::RolledBack);
        assert_eq!(failure.restored, Some(v("v0")));
        assert_eq!(failure.error.kind(), DeployErrorKind::Health);
        match failure.error {
            DeployError::Health { ref source, .. } => {
                assert!(matches!(source, HealthError::Exhausted { .. }));
            }
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(failure.to_string().contains("rolled back to v0"));

        // second dispatch re-activates v0's payload
        let calls = h.dispatch.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].version, v("v0"));
        assert_eq!(calls[1].payload, image("v0"));
        assert!(calls[1].restore);

        // the failed version was never recorded; v0 is marked as restored
        assert_eq!(h.versions("dev"), vec!["v0"]);
        let v0 = h.store.get(&env("dev"), &v("v0")).unwrap();
        assert_eq!(v0.status, SnapshotStatus::RolledBack);
    }

    /// Test: the reported error is the original dispatch failure.
    #[tokio::test]
    async fn dispatch_failure_is_preserved_after_rollback() {
        let h = Harness::new(SpyDispatch::failing(&["1.1.0"]), ScriptedProbe::healthy());
        h.seed("staging", "1.0.0");

        let failure = h
            .orchestrator()
            .deploy(&request("staging", "1.1.0"), &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(failure.outcome, AttemptOutcome::RolledBack);
        assert_eq!(failure.error.kind(), DeployErrorKind::Dispatch);
        assert!(matches!(
            failure.error,
            DeployError::Dispatch {
                source: DispatchError::Command(_),
                ..
            }
        ));
        assert!(failure.to_string().contains("connection refused"));
        assert_eq!(h.probe.count(), 0);
        assert_eq!(
            h.dispatch.history(),
            vec![("1.1.0".to_string(), false), ("1.0.0".to_string(), true)]
        );

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, Status::Failed);
        assert!(sent[0].message.contains("rolled back to 1.0.0"));
    }

    /// Test: without history the rollback is unavailable and both failures are visible.
    #[tokio::test]
    async fn rollback_without_history_is_unavailable() {
        let h = Harness::new(SpyDispatch::failing(&["1.0.0"]), ScriptedProbe::healthy());

        let failure = h
            .orchestrator()
            .deploy(&request("staging", "1.0.0"), &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(failure.outcome, AttemptOutcome::Failed);
        match failure.error {
            DeployError::RollbackUnavailable {
                ref reason,
                ref source,
            } => {
                assert!(matches!(reason, StoreError::NoPreviousVersion { .. }));
                assert!(matches!(**source, DeployError::Dispatch { .. }));
            }
            ref other => panic!("unexpected error: {other}"),
        }
        assert_eq!(failure.error.kind(), DeployErrorKind::Rollback);
        assert_eq!(failure.error.original().kind(), DeployErrorKind::Dispatch);
        assert_eq!(h.dispatch.count(), 1);
    }

    /// Test: a failing restore surfaces the rollback failure wrapping the original.
    #[tokio::test]
    async fn failed_restore_wraps_original_error() {
        let h = Harness::new(
            SpyDispatch::failing(&["2.0.0", "1.0.0"]),
            ScriptedProbe::healthy(),
        );
        h.seed("staging", "1.0.0");

        let failure = h
            .orchestrator()
            .deploy(&request("staging", "2.0.0"), &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(failure.outcome, AttemptOutcome::Failed);
        assert_eq!(failure.error.kind(), DeployErrorKind::Rollback);
        assert!(matches!(failure.error, DeployError::RollbackFailed { .. }));
        assert!(matches!(
            failure.error.original(),
            DeployError::Dispatch { .. }
        ));

        let cause = failure.source().unwrap().to_string();
        assert!(cause.contains("2.0.0"), "cause: {cause}");
        // the snapshot that could not be restored keeps its status
        let v1 = h.store.get(&env("staging"), &v("1.0.0")).unwrap();
        assert_eq!(v1.status, SnapshotStatus::Deployed);
    }

    /// Test: --no-rollback surfaces the failure without restoring.
    #[tokio::test]
    async fn disabled_rollback_leaves_environment_alone() {
        let h = Harness::new(SpyDispatch::default(), ScriptedProbe::with_results(&[false]));
        h.seed("staging", "1.0.0");
        let mut req = request("staging", "1.1.0");
        req.rollback = false;

        let failure = h
            .orchestrator()
            .deploy(&req, &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(failure.outcome, AttemptOutcome::Failed);
        assert_eq!(failure.restored, None);
        assert_eq!(failure.error.kind(), DeployErrorKind::Health);
        assert_eq!(h.dispatch.count(), 1);
    }

    /// Test: redeploying the current version rolls back to the one before it.
    #[tokio::test]
    async fn failed_redeploy_skips_its_own_snapshot() {
        let h = Harness::new(SpyDispatch::default(), ScriptedProbe::with_results(&[false]));
        h.seed("staging", "1.0.0");
        h.seed("staging", "1.1.0");

        let failure = h
            .orchestrator()
            .deploy(&request("staging", "1.1.0"), &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(failure.restored, Some(v("1.0.0")));
    }
}

mod plan {
    use super::*;

    /// Test: a dry run validates and plans but has no side effects.
    #[tokio::test]
    async fn plan_has_no_side_effects() {
        let h = Harness::healthy();
        for i in 0..5 {
            h.seed("staging", &format!("0.{i}.0"));
        }

        let plan = h.orchestrator().plan(&request("staging", "1.0.0")).await.unwrap();

        assert_eq!(plan.commands, vec!["activate staging 1.0.0"]);
        assert_eq!(
            plan.health_check.as_deref(),
            Some("http://staging.example.com/health")
        );
        assert_eq!(plan.evicts, vec![v("0.0.0")]);
        assert_eq!(h.dispatch.count(), 0);
        assert_eq!(h.probe.count(), 0);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.versions("staging").len(), 5);
    }

    /// Test: a dry run reports the same validation errors as a real run.
    #[tokio::test]
    async fn plan_validates_like_deploy() {
        let h = Harness::healthy();
        let failure = h.orchestrator().plan(&request("prod", "1.0.0")).await.unwrap_err();
        assert!(matches!(failure.error, DeployError::NotAllowed { .. }));
        assert!(h.notifier.sent().is_empty());
    }
}

mod manual_rollback {
    use super::*;

    fn rollback(environment: &str, version: Option<&str>) -> RollbackRequest {
        RollbackRequest {
            environment: environment.to_string(),
            version: version.map(v),
            skip_health: false,
        }
    }

    /// Test: rollback without --version restores the previous snapshot.
    #[tokio::test]
    async fn rollback_restores_previous() {
        let h = Harness::healthy();
        h.seed("staging", "1.0.0");
        h.seed("staging", "1.1.0");

        let report = h
            .orchestrator()
            .rollback(&rollback("staging", None), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.snapshot.version_id, v("1.0.0"));
        assert_eq!(report.snapshot.status, SnapshotStatus::RolledBack);
        assert_eq!(report.health_attempts, Some(1));
        assert_eq!(h.dispatch.history(), vec![("1.0.0".to_string(), true)]);
        assert_eq!(h.dispatch.calls.lock()[0].strategy, StrategyKind::Docker);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, Event::Rollback);
        assert_eq!(sent[0].status, Status::Succeeded);
    }

    /// Test: an absent version fails without touching history.
    #[tokio::test]
    async fn missing_version_is_not_found() {
        let h = Harness::healthy();
        h.seed("staging", "1.0.0");

        let failure = h
            .orchestrator()
            .rollback(&rollback("staging", Some("1.0.1")), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            DeployError::Storage {
                source: StoreError::VersionNotFound { .. }
            }
        ));
        assert_eq!(failure.error.kind(), DeployErrorKind::Storage);
        assert_eq!(h.dispatch.count(), 0);
        assert_eq!(h.versions("staging"), vec!["1.0.0"]);
        let snapshot = h.store.get(&env("staging"), &v("1.0.0")).unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Deployed);
    }

    /// Test: a single snapshot leaves nothing to roll back to.
    #[tokio::test]
    async fn single_snapshot_has_no_previous() {
        let h = Harness::healthy();
        h.seed("staging", "1.0.0");

        let failure = h
            .orchestrator()
            .rollback(&rollback("staging", None), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            DeployError::Storage {
                source: StoreError::NoPreviousVersion { .. }
            }
        ));
    }

    /// Test: an unhealthy restore is a rollback failure.
    #[tokio::test]
    async fn unhealthy_restore_fails() {
        let h = Harness::new(SpyDispatch::default(), ScriptedProbe::with_results(&[false]));
        h.seed("staging", "1.0.0");
        h.seed("staging", "1.1.0");

        let failure = h
            .orchestrator()
            .rollback(&rollback("staging", Some("1.0.0")), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, DeployError::RestoreFailed { .. }));
        assert_eq!(failure.error.kind(), DeployErrorKind::Rollback);

        let sent = h.notifier.sent();
        assert_eq!(sent[0].event, Event::Rollback);
        assert_eq!(sent[0].status, Status::Failed);
    }

    /// Test: the rollback plan names the target and its commands.
    #[tokio::test]
    async fn rollback_plan_describes_restore() {
        let h = Harness::healthy();
        h.seed("staging", "1.0.0");
        h.seed("staging", "1.1.0");

        let plan = h
            .orchestrator()
            .rollback_plan(&rollback("staging", None))
            .unwrap();
        assert_eq!(plan.target.version_id, v("1.0.0"));
        assert_eq!(plan.commands, vec!["activate staging 1.0.0"]);
        assert_eq!(h.dispatch.count(), 0);
    }
}
