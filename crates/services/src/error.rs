//! Shared error types for the services crate.

use thiserror::Error;

use intake_core::graph::GraphError;
use intake_core::model::{AnswerError, RemoteSettingsError, StepKey};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `AnswerStore` writes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnswerStoreError {
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `WizardDriver`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WizardError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("step {step} does not belong to page {route:?}")]
    StepNotOnPage { route: String, step: StepKey },
    #[error(transparent)]
    Invalid(#[from] AnswerError),
    /// The page's answers were not persisted; navigation must not proceed.
    #[error("answers for page {route:?} were not saved")]
    NotSaved {
        route: String,
        #[source]
        source: StorageError,
    },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Remote(#[from] RemoteSettingsError),
}
