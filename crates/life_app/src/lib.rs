pub mod app;

pub use crate::app::{build_service, run, AppConfig, Command};
