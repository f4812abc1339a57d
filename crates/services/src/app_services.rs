use std::sync::Arc;

use intake_core::Clock;
use intake_core::graph::StepGraph;
use intake_core::model::{RemoteSettingsDraft, StepSchema};
use storage::repository::{IdentityStore, InMemoryRepository, Storage};

use crate::answer_store::AnswerStore;
use crate::error::AppServicesError;
use crate::identity_service::IdentityProvider;
use crate::wizard::WizardDriver;

/// Assembles the identity provider, answer store and wizard driver.
///
/// Screens receive these handles explicitly; nothing here is global.
#[derive(Clone)]
pub struct AppServices {
    identity: Arc<IdentityProvider>,
    answers: Arc<AnswerStore>,
    wizard: Arc<WizardDriver>,
}

impl AppServices {
    /// Wire services over `storage` with the default intake schema and pages.
    #[must_use]
    pub fn new(storage: &Storage, identity_store: Arc<dyn IdentityStore>, clock: Clock) -> Self {
        Self::with_parts(
            storage,
            identity_store,
            clock,
            StepSchema::intake(),
            StepGraph::intake(),
        )
    }

    #[must_use]
    pub fn with_parts(
        storage: &Storage,
        identity_store: Arc<dyn IdentityStore>,
        clock: Clock,
        schema: StepSchema,
        graph: StepGraph,
    ) -> Self {
        let identity = Arc::new(IdentityProvider::new(identity_store));
        let answers = Arc::new(AnswerStore::new(
            Arc::clone(&identity),
            Arc::clone(&storage.answers),
            Arc::new(schema),
            clock,
        ));
        let wizard = Arc::new(WizardDriver::new(Arc::clone(&answers), graph));
        Self {
            identity,
            answers,
            wizard,
        }
    }

    /// Everything in memory; answers and identity vanish with the process.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        let repo = InMemoryRepository::new();
        let storage = Storage {
            answers: Arc::new(repo.clone()),
        };
        Self::new(&storage, Arc::new(repo), clock)
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        identity_store: Arc<dyn IdentityStore>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, identity_store, clock))
    }

    /// Build services backed by the hosted record store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Remote` if the settings do not validate.
    pub fn new_remote(
        settings: RemoteSettingsDraft,
        identity_store: Arc<dyn IdentityStore>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::remote(settings.validate()?);
        Ok(Self::new(&storage, identity_store, clock))
    }

    #[must_use]
    pub fn identity(&self) -> Arc<IdentityProvider> {
        Arc::clone(&self.identity)
    }

    #[must_use]
    pub fn answers(&self) -> Arc<AnswerStore> {
        Arc::clone(&self.answers)
    }

    #[must_use]
    pub fn wizard(&self) -> Arc<WizardDriver> {
        Arc::clone(&self.wizard)
    }
}
