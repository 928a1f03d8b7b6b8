//! Personal job-application tracking.
//!
//! A [`Tracker`] owns one owner's applications in memory and keeps each
//! application's current status in step with its history. Durability comes
//! from any [`ApplicationStore`]: the SQLite [`Database`] or the JSON
//! [`LocalStore`].

pub mod config;
pub mod db;
pub mod local;
pub mod models;
pub mod stats;
pub mod store;
pub mod tracker;
pub mod transfer;

pub use config::{Backend, Config};
pub use db::Database;
pub use local::{FileStorage, KeyValueStorage, LocalStore, MemoryStorage};
pub use models::{
    ApplicationStatus, ApplicationStep, ApplicationUpdate, JobApplication, NewApplication,
    NewStep, Owner,
};
pub use store::{ApplicationStore, StoreError};
pub use tracker::{Tracker, TrackerError};
