// ABOUTME: Builds the collaborators a command needs from the loaded configuration.
// ABOUTME: Everything environment-dependent is resolved here, once, before any work starts.

use std::env;
use std::path::Path;
use std::sync::Arc;

use stevedore::config::Config;
use stevedore::deploy::Orchestrator;
use stevedore::error::Result;
use stevedore::health::{HealthProber, RetryPolicy, SystemCheck};
use stevedore::notify::{LogNotifier, Notifiers, WebhookNotifier};
use stevedore::process::{CommandRunner, TokioRunner};
use stevedore::source::Git;
use stevedore::store::VersionStore;
use stevedore::strategy::Dispatcher;

pub struct Workspace {
    pub config: Config,
    pub runner: Arc<dyn CommandRunner>,
    pub store: VersionStore,
    pub source: Git,
    dispatcher: Dispatcher,
    prober: HealthProber<SystemCheck>,
    notifier: Notifiers,
}

impl Workspace {
    /// Load `--config PATH` or discover the config from the working directory.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::discover(&env::current_dir()?)?,
        };
        Self::new(config)
    }

    pub fn new(config: Config) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioRunner);

        let mut notifier = Notifiers::new().with(LogNotifier);
        if let Some(ref webhook) = config.notify.webhook {
            notifier = notifier.with(WebhookNotifier::new(webhook.resolve()?, runner.clone()));
        }

        Ok(Self {
            store: VersionStore::open(config.versions_root(), config.versions.keep),
            source: Git::new(runner.clone(), &config.base_dir),
            dispatcher: Dispatcher::from_config(&config, runner.clone()),
            prober: HealthProber::new(
                SystemCheck::new(runner.clone(), config.health.timeout),
                RetryPolicy::from_config(&config.health),
            ),
            notifier,
            runner,
            config,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config,
            &self.store,
            &self.dispatcher,
            &self.prober,
            &self.notifier,
            &self.source,
        )
    }
}
