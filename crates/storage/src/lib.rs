#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{BlockCatalog, InMemoryRepository, ProgressStore, Storage, StorageError};
