//! Persistence boundary shared by the SQLite and local JSON backends.

use std::collections::HashSet;
use thiserror::Error;

use crate::models::{ApplicationStep, JobApplication, Owner};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("failed to serialize applications: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn application_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "application",
            id: id.to_string(),
        }
    }

    pub fn step_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "step",
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                StoreError::ValidationFailed(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Durable home of an owner's applications.
///
/// Implementations only persist: they never reload or patch state on their
/// own, and they never keep application values beyond a single call.
pub trait ApplicationStore {
    /// Every application of `owner`, newest first, steps attached and sorted.
    fn load_all(&self, owner: &Owner) -> Result<Vec<JobApplication>, StoreError>;

    /// Persist a new application together with its steps, atomically.
    fn insert_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<JobApplication, StoreError>;

    /// Overwrite the mutable fields of an application. Steps are untouched.
    fn update_application(&mut self, owner: &Owner, app: &JobApplication)
    -> Result<(), StoreError>;

    /// Remove an application and all of its steps.
    fn delete_application(&mut self, owner: &Owner, id: &str) -> Result<(), StoreError>;

    fn insert_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<ApplicationStep, StoreError>;

    fn update_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<(), StoreError>;

    fn delete_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step_id: &str,
    ) -> Result<(), StoreError>;

    /// Swap the owner's whole collection for `apps` in one write.
    fn replace_all(&mut self, owner: &Owner, apps: &[JobApplication]) -> Result<(), StoreError>;
}

impl<T: ApplicationStore + ?Sized> ApplicationStore for Box<T> {
    fn load_all(&self, owner: &Owner) -> Result<Vec<JobApplication>, StoreError> {
        (**self).load_all(owner)
    }

    fn insert_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<JobApplication, StoreError> {
        (**self).insert_application(owner, app)
    }

    fn update_application(&mut self, owner: &Owner, app: &JobApplication)
    -> Result<(), StoreError> {
        (**self).update_application(owner, app)
    }

    fn delete_application(&mut self, owner: &Owner, id: &str) -> Result<(), StoreError> {
        (**self).delete_application(owner, id)
    }

    fn insert_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<ApplicationStep, StoreError> {
        (**self).insert_step(owner, application_id, step)
    }

    fn update_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<(), StoreError> {
        (**self).update_step(owner, application_id, step)
    }

    fn delete_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step_id: &str,
    ) -> Result<(), StoreError> {
        (**self).delete_step(owner, application_id, step_id)
    }

    fn replace_all(&mut self, owner: &Owner, apps: &[JobApplication]) -> Result<(), StoreError> {
        (**self).replace_all(owner, apps)
    }
}

/// Required-field check applied by every backend before an insert.
pub(crate) fn validate_application(app: &JobApplication) -> Result<(), StoreError> {
    if app.id.trim().is_empty() {
        return Err(StoreError::ValidationFailed("application id is required".into()));
    }
    if app.company.trim().is_empty() {
        return Err(StoreError::ValidationFailed("company is required".into()));
    }
    if app.position.trim().is_empty() {
        return Err(StoreError::ValidationFailed("position is required".into()));
    }
    Ok(())
}

/// Checks every record and requires application ids to be unique in `apps`.
pub(crate) fn validate_collection(apps: &[JobApplication]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for app in apps {
        validate_application(app)?;
        if !seen.insert(app.id.as_str()) {
            return Err(StoreError::ValidationFailed(format!(
                "application '{}' appears more than once",
                app.id
            )));
        }
    }
    Ok(())
}
