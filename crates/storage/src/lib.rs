#![forbid(unsafe_code)]

pub mod identity;
pub mod repository;
pub mod rest;
pub mod sqlite;

pub use identity::FileIdentityStore;
pub use repository::{
    AnswerRecord, AnswerRepository, IdentityStore, InMemoryRepository, Storage, StorageError,
};
