// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup and in-memory fakes for the orchestrator's collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Once;
use stevedore::health::{CancelSignal, HealthError, HealthProbe, ProbeReport, ProbeTarget};
use stevedore::notify::{Notification, Notifier, NotifyError};
use stevedore::process::{ExternalCommand, ProcessError};
use stevedore::source::{SourceControl, SourceError};
use stevedore::store::Provenance;
use stevedore::strategy::{Dispatch, DispatchError, DispatchRequest};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("stevedore=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Records every dispatch; versions listed in `failing` fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct SpyDispatch {
    pub calls: Mutex<Vec<DispatchRequest>>,
    pub failing: Vec<String>,
}

#[allow(dead_code)]
impl SpyDispatch {
    pub fn failing(versions: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: versions.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(version, restore)` for each call, in order.
    pub fn history(&self) -> Vec<(String, bool)> {
        self.calls
            .lock()
            .iter()
            .map(|r| (r.version.to_string(), r.restore))
            .collect()
    }
}

#[async_trait]
impl Dispatch for SpyDispatch {
    fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError> {
        Ok(vec![
            ExternalCommand::new("activate")
                .arg(request.environment.as_str())
                .arg(request.version.as_str()),
        ])
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        self.calls.lock().push(request.clone());
        if self.failing.iter().any(|v| v == request.version.as_str()) {
            return Err(DispatchError::Command(ProcessError::Failed {
                command: format!("activate {}", request.version),
                code: Some(1),
                stderr: "connection refused".to_string(),
            }));
        }
        Ok(())
    }
}

/// Answers probes from a script; healthy once the script runs out.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    pub calls: Mutex<u32>,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn with_results(results: &[bool]) -> Self {
        Self {
            script: Mutex::new(results.iter().copied().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(
        &self,
        target: &ProbeTarget,
        _cancel: &CancelSignal,
    ) -> Result<ProbeReport, HealthError> {
        *self.calls.lock() += 1;
        match self.script.lock().pop_front() {
            Some(false) => Err(HealthError::Exhausted {
                attempts: 3,
                last: format!("{target} answered 503"),
            }),
            _ => Ok(ProbeReport {
                attempts: 1,
                detail: "status 200".to_string(),
            }),
        }
    }
}

#[allow(dead_code)]
pub struct FakeSource {
    pub dirty: bool,
    pub commit: Option<String>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn clean() -> Self {
        Self {
            dirty: false,
            commit: Some("a1b2c3d".to_string()),
        }
    }

    pub fn dirty() -> Self {
        Self {
            dirty: true,
            commit: Some("a1b2c3d".to_string()),
        }
    }
}

#[async_trait]
impl SourceControl for FakeSource {
    async fn is_dirty(&self) -> Result<bool, SourceError> {
        Ok(self.dirty)
    }

    async fn provenance(&self) -> Provenance {
        Provenance {
            commit: self.commit.clone(),
            branch: Some("main".to_string()),
        }
    }
}

/// Keeps every notification; optionally reports delivery failure after recording.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub broken: bool,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn broken() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            broken: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification.clone());
        if self.broken {
            return Err(NotifyError::Webhook(ProcessError::Failed {
                command: "curl".to_string(),
                code: Some(22),
                stderr: "The requested URL returned error: 500".to_string(),
            }));
        }
        Ok(())
    }
}
