#![forbid(unsafe_code)]

pub mod answer_store;
pub mod app_services;
pub mod error;
pub mod identity_service;
pub mod wizard;

pub use intake_core::Clock;
pub use intake_core::graph::Navigation;

pub use answer_store::AnswerStore;
pub use app_services::AppServices;
pub use error::{AnswerStoreError, AppServicesError, WizardError};
pub use identity_service::{Durability, IdentityProvider, SessionIdentity};
pub use wizard::WizardDriver;
