pub mod autosave;
pub mod compat;
pub mod error;
pub mod habit;
pub mod journal;
pub mod repository;
pub mod service;
pub mod session;
pub mod status;
pub mod store;
pub mod task;

pub use crate::autosave::AutoSaveManager;
pub use crate::error::{CoreError, Result};
pub use crate::repository::{Record, Repository};
pub use crate::service::{DailySnapshot, HabitDay, LifeService, LifeServiceBuilder};
pub use crate::session::{Session, UserId};
pub use crate::store::{DocumentStore, Fields, JsonFileStore, MemoryStore};
