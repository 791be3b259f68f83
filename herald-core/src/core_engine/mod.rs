//! Engine bundle
//!
//! `Herald` wires every component to one set of collaborators and one
//! configuration. The shared stores (freshness, profiles, group keys,
//! access states) are built once here and handed to each component, so a
//! key share received by the group manager is visible to the orchestrator
//! on the next publish.

use crate::config::Config;
use crate::core_group::{AccessStateMachine, GroupKeyring, GroupManager};
use crate::core_loader::FreshnessLoader;
use crate::core_publish::{DirectPublisher, PublishOrchestrator, ReceiptTracker};
use crate::core_session::SessionRegistry;
use crate::core_store::{FreshnessStore, ProfileIndex};
use crate::core_upload::Uploader;
use crate::metrics::init_metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::traits::Collaborators;
use std::sync::Arc;
use tracing::info;

pub struct Herald {
    config: Arc<Config>,
    collab: Collaborators,

    freshness: Arc<FreshnessStore>,
    profiles: Arc<ProfileIndex>,
    keyring: Arc<GroupKeyring>,
    access: Arc<AccessStateMachine>,
    shutdown: Arc<ShutdownCoordinator>,

    groups: GroupManager,
    publisher: PublishOrchestrator,
    receipts: ReceiptTracker,
    direct: DirectPublisher,
    loader: FreshnessLoader,
    uploader: Uploader,
    sessions: SessionRegistry,
}

impl Herald {
    /// Build the engine. Describes metrics when they are enabled.
    pub fn new(config: Config, collab: Collaborators) -> Self {
        let config = Arc::new(config);
        if config.metrics.enabled {
            init_metrics();
        }

        let freshness = Arc::new(FreshnessStore::new(config.loader.reset_backoff_on_success));
        let profiles = Arc::new(ProfileIndex::new());
        let keyring = Arc::new(GroupKeyring::new());
        let access = Arc::new(AccessStateMachine::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let groups = GroupManager::new(collab.clone(), config.clone(), keyring.clone(), access.clone());
        let publisher = PublishOrchestrator::new(collab.clone(), config.clone(), keyring.clone(), access.clone());
        let receipts = ReceiptTracker::new(collab.clone(), config.clone());
        let direct = DirectPublisher::new(collab.clone(), config.clone(), profiles.clone());
        let loader = FreshnessLoader::new(collab.clone(), config.clone(), freshness.clone(), profiles.clone());
        let uploader = Uploader::new(config.clone(), shutdown.clone());

        info!(
            platform_relays = config.relays.platform_relays.len(),
            metrics = config.metrics.enabled,
            "Herald engine ready"
        );

        Self {
            config,
            collab,
            freshness,
            profiles,
            keyring,
            access,
            shutdown,
            groups,
            publisher,
            receipts,
            direct,
            loader,
            uploader,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    pub fn publisher(&self) -> &PublishOrchestrator {
        &self.publisher
    }

    pub fn receipts(&self) -> &ReceiptTracker {
        &self.receipts
    }

    pub fn direct(&self) -> &DirectPublisher {
        &self.direct
    }

    pub fn loader(&self) -> &FreshnessLoader {
        &self.loader
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn freshness(&self) -> &Arc<FreshnessStore> {
        &self.freshness
    }

    pub fn profiles(&self) -> &Arc<ProfileIndex> {
        &self.profiles
    }

    pub fn keyring(&self) -> &Arc<GroupKeyring> {
        &self.keyring
    }

    pub fn access(&self) -> &Arc<AccessStateMachine> {
        &self.access
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    /// Stop long-running waits (upload polling). Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}
