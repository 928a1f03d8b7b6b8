//! In-memory collection of an owner's applications, kept consistent with its store.
//!
//! Every mutation stages a copy of the affected application, persists it, and
//! only then commits the copy to the live collection. A failed write leaves the
//! collection exactly as it was. Mutations take `&mut self`, so at most one is
//! in flight per tracker.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApplicationStep, ApplicationUpdate, JobApplication, NewApplication, NewStep, Owner,
    INITIAL_STEP_NOTES,
};
use crate::store::{ApplicationStore, StoreError};

/// Both company and position must be at least this similar to count as a duplicate.
const SIMILARITY_THRESHOLD: f64 = 0.9;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(String),
    #[error("application '{0}' not found")]
    ApplicationNotFound(String),
    #[error("step '{step_id}' not found on application '{application_id}'")]
    StepNotFound {
        application_id: String,
        step_id: String,
    },
    #[error("application '{application_id}' must keep at least one step")]
    LastStep { application_id: String },
    #[error("no owner is signed in")]
    SignedOut,
    #[error("'{0}' matches more than one record, use a longer prefix")]
    AmbiguousId(String),
}

pub struct Tracker<S: ApplicationStore> {
    store: S,
    owner: Option<Owner>,
    applications: Vec<JobApplication>,
}

fn persisted<T>(
    operation: &'static str,
    result: Result<T, StoreError>,
) -> Result<T, TrackerError> {
    result.map_err(|e| {
        tracing::warn!(
            operation,
            error = %e,
            "Persisting change failed, keeping previous state"
        );
        TrackerError::Store(e)
    })
}

fn validate_fields(company: &str, position: &str) -> Result<(), TrackerError> {
    if company.trim().is_empty() {
        return Err(TrackerError::Validation("company is required".to_string()));
    }
    if position.trim().is_empty() {
        return Err(TrackerError::Validation("position is required".to_string()));
    }
    Ok(())
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Find the single step of `app` whose id equals or starts with `prefix`.
pub fn resolve_step<'a>(
    app: &'a JobApplication,
    prefix: &str,
) -> Result<&'a ApplicationStep, TrackerError> {
    if let Some(step) = app.step(prefix) {
        return Ok(step);
    }
    let mut matches = app.steps.iter().filter(|s| s.id.starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(step), None) if !prefix.is_empty() => Ok(step),
        (Some(_), _) => Err(TrackerError::AmbiguousId(prefix.to_string())),
        (None, _) => Err(TrackerError::StepNotFound {
            application_id: app.id.clone(),
            step_id: prefix.to_string(),
        }),
    }
}

impl<S: ApplicationStore> Tracker<S> {
    /// Start a session for `owner`, loading their collection.
    pub fn open(store: S, owner: Owner) -> Result<Self, TrackerError> {
        let mut tracker = Self::signed_out(store);
        tracker.switch_owner(Some(owner))?;
        Ok(tracker)
    }

    pub fn signed_out(store: S) -> Self {
        Self {
            store,
            owner: None,
            applications: Vec::new(),
        }
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Reload for a new owner, or clear the collection on sign-out.
    pub fn switch_owner(&mut self, owner: Option<Owner>) -> Result<(), TrackerError> {
        match owner {
            Some(owner) => {
                let apps = self.store.load_all(&owner)?;
                tracing::debug!(owner_id = %owner.id, count = apps.len(), "Session started");
                self.applications = apps;
                self.owner = Some(owner);
            }
            None => {
                self.applications.clear();
                self.owner = None;
            }
        }
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), TrackerError> {
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;
        self.applications = self.store.load_all(owner)?;
        Ok(())
    }

    pub fn applications(&self) -> &[JobApplication] {
        &self.applications
    }

    pub fn get(&self, id: &str) -> Option<&JobApplication> {
        self.applications.iter().find(|app| app.id == id)
    }

    /// Find the single application whose id equals or starts with `prefix`.
    pub fn resolve(&self, prefix: &str) -> Result<&JobApplication, TrackerError> {
        if let Some(app) = self.get(prefix) {
            return Ok(app);
        }
        let mut matches = self
            .applications
            .iter()
            .filter(|app| app.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(app), None) if !prefix.is_empty() => Ok(app),
            (Some(_), _) => Err(TrackerError::AmbiguousId(prefix.to_string())),
            (None, _) => Err(TrackerError::ApplicationNotFound(prefix.to_string())),
        }
    }

    /// Existing applications that look like the same company and position.
    pub fn similar_applications(&self, company: &str, position: &str) -> Vec<&JobApplication> {
        let company = normalize(company);
        let position = normalize(position);
        self.applications
            .iter()
            .filter(|app| {
                strsim::jaro_winkler(&normalize(&app.company), &company) >= SIMILARITY_THRESHOLD
                    && strsim::jaro_winkler(&normalize(&app.position), &position)
                        >= SIMILARITY_THRESHOLD
            })
            .collect()
    }

    fn index_of(&self, id: &str) -> Result<usize, TrackerError> {
        self.applications
            .iter()
            .position(|app| app.id == id)
            .ok_or_else(|| TrackerError::ApplicationNotFound(id.to_string()))
    }

    pub fn add_application(
        &mut self,
        new: NewApplication,
    ) -> Result<&JobApplication, TrackerError> {
        validate_fields(&new.company, &new.position)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let now = Utc::now();
        let step_notes = if new.notes.trim().is_empty() {
            INITIAL_STEP_NOTES.to_string()
        } else {
            new.notes.clone()
        };
        let mut app = JobApplication {
            id: Uuid::new_v4().to_string(),
            company: new.company.trim().to_string(),
            position: new.position.trim().to_string(),
            salary: new.salary,
            location: new.location,
            date_applied: new.date_applied,
            notes: new.notes,
            favorite: new.favorite,
            current_status: Default::default(),
            steps: vec![ApplicationStep {
                id: Uuid::new_v4().to_string(),
                date: new.date_applied,
                status: Default::default(),
                contact_person: String::new(),
                notes: step_notes,
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        };
        app.refresh_status();

        let stored = persisted("add_application", self.store.insert_application(owner, &app))?;
        tracing::info!(application_id = %stored.id, company = %stored.company, "Added application");
        self.applications.insert(0, stored);
        Ok(&self.applications[0])
    }

    pub fn update_application(
        &mut self,
        update: ApplicationUpdate,
    ) -> Result<&JobApplication, TrackerError> {
        validate_fields(&update.company, &update.position)?;
        let idx = self.index_of(&update.id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let mut staged = self.applications[idx].clone();
        staged.company = update.company.trim().to_string();
        staged.position = update.position.trim().to_string();
        staged.salary = update.salary;
        staged.location = update.location;
        staged.date_applied = update.date_applied;
        staged.notes = update.notes;
        staged.favorite = update.favorite;
        staged.updated_at = Utc::now();

        persisted("update_application", self.store.update_application(owner, &staged))?;
        self.applications[idx] = staged;
        Ok(&self.applications[idx])
    }

    pub fn delete_application(&mut self, id: &str) -> Result<(), TrackerError> {
        let idx = self.index_of(id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        persisted("delete_application", self.store.delete_application(owner, id))?;
        let removed = self.applications.remove(idx);
        tracing::info!(application_id = %removed.id, "Deleted application");
        Ok(())
    }

    /// Record a new event. It becomes the current status only if no other step
    /// is dated later.
    pub fn add_application_step(
        &mut self,
        application_id: &str,
        new: NewStep,
    ) -> Result<ApplicationStep, TrackerError> {
        let idx = self.index_of(application_id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let step = ApplicationStep {
            id: Uuid::new_v4().to_string(),
            date: new.date,
            status: new.status,
            contact_person: new.contact_person,
            notes: new.notes,
            created_at: Utc::now(),
        };
        let mut staged = self.applications[idx].clone();
        staged.steps.insert(0, step.clone());
        staged.refresh_status();

        let stored = persisted(
            "add_application_step",
            self.store.insert_step(owner, application_id, &step),
        )?;
        tracing::debug!(
            application_id,
            status = %stored.status,
            current = %staged.current_status,
            "Added step"
        );
        self.applications[idx] = staged;
        Ok(stored)
    }

    /// Overwrite date, status, contact and notes of an existing step.
    pub fn update_application_step(
        &mut self,
        application_id: &str,
        step: ApplicationStep,
    ) -> Result<(), TrackerError> {
        let idx = self.index_of(application_id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let mut staged = self.applications[idx].clone();
        let target = staged
            .steps
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| TrackerError::StepNotFound {
                application_id: application_id.to_string(),
                step_id: step.id.clone(),
            })?;
        target.date = step.date;
        target.status = step.status;
        target.contact_person = step.contact_person;
        target.notes = step.notes;
        let target = target.clone();
        staged.refresh_status();

        persisted(
            "update_application_step",
            self.store.update_step(owner, application_id, &target),
        )?;
        self.applications[idx] = staged;
        Ok(())
    }

    /// Remove a step. The last remaining step is refused with [`TrackerError::LastStep`].
    pub fn delete_application_step(
        &mut self,
        application_id: &str,
        step_id: &str,
    ) -> Result<(), TrackerError> {
        let idx = self.index_of(application_id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let current = &self.applications[idx];
        if current.step(step_id).is_none() {
            return Err(TrackerError::StepNotFound {
                application_id: application_id.to_string(),
                step_id: step_id.to_string(),
            });
        }
        if current.steps.len() <= 1 {
            return Err(TrackerError::LastStep {
                application_id: application_id.to_string(),
            });
        }

        let mut staged = current.clone();
        staged.steps.retain(|s| s.id != step_id);
        staged.refresh_status();

        persisted(
            "delete_application_step",
            self.store.delete_step(owner, application_id, step_id),
        )?;
        self.applications[idx] = staged;
        Ok(())
    }

    /// Flip the favorite flag, returning the new value.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, TrackerError> {
        let idx = self.index_of(id)?;
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;

        let mut staged = self.applications[idx].clone();
        staged.favorite = !staged.favorite;
        staged.updated_at = Utc::now();

        persisted("toggle_favorite", self.store.update_application(owner, &staged))?;
        let favorite = staged.favorite;
        self.applications[idx] = staged;
        Ok(favorite)
    }

    /// Replace the whole collection, e.g. from an import.
    pub fn replace_all(&mut self, mut apps: Vec<JobApplication>) -> Result<(), TrackerError> {
        let owner = self.owner.as_ref().ok_or(TrackerError::SignedOut)?;
        for app in &mut apps {
            app.refresh_status();
        }
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        persisted("replace_all", self.store.replace_all(owner, &apps))?;
        tracing::info!(owner_id = %owner.id, count = apps.len(), "Replaced applications");
        self.applications = apps;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), TrackerError> {
        self.replace_all(Vec::new())
    }
}
