//! JSON export and schema-checked import of a whole collection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApplicationStatus, ApplicationStep, JobApplication};

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("expected a list of application records")]
    NotAList,
    #[error("record {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("failed to encode applications: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedApplication {
    id: String,
    company: String,
    position: String,
    #[serde(default)]
    salary: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    date_applied: Option<NaiveDate>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    favorite: Option<bool>,
    // Required to be present, but re-derived from the steps on import.
    #[allow(dead_code)]
    current_status: ApplicationStatus,
    steps: Vec<ImportedStep>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedStep {
    #[serde(default)]
    id: String,
    date: NaiveDate,
    status: ApplicationStatus,
    #[serde(default)]
    contact_person: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl ImportedApplication {
    fn into_application(self, index: usize) -> Result<JobApplication, TransferError> {
        let required = [
            ("id", &self.id),
            ("company", &self.company),
            ("position", &self.position),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TransferError::Malformed {
                    index,
                    reason: format!("`{field}` must not be empty"),
                });
            }
        }

        let created_at = self.created_at;
        let steps: Vec<ApplicationStep> = self
            .steps
            .into_iter()
            .map(|step| ApplicationStep {
                id: if step.id.trim().is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    step.id
                },
                date: step.date,
                status: step.status,
                contact_person: step.contact_person.unwrap_or_default(),
                notes: step.notes.unwrap_or_default(),
                created_at: step.created_at.unwrap_or(created_at),
            })
            .collect();

        let repeated = {
            let mut step_ids = HashSet::new();
            steps
                .iter()
                .find(|step| !step_ids.insert(step.id.as_str()))
                .map(|step| step.id.clone())
        };
        if let Some(step_id) = repeated {
            return Err(TransferError::Malformed {
                index,
                reason: format!("step id '{step_id}' appears more than once"),
            });
        }

        let mut app = JobApplication {
            id: self.id,
            company: self.company,
            position: self.position,
            salary: self.salary.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            date_applied: self.date_applied.unwrap_or_else(|| created_at.date_naive()),
            notes: self.notes.unwrap_or_default(),
            favorite: self.favorite.unwrap_or(false),
            current_status: ApplicationStatus::Applied,
            steps,
            created_at,
            updated_at: self.updated_at,
        };
        app.refresh_status();
        Ok(app)
    }
}

pub fn export_json(apps: &[JobApplication]) -> Result<String, TransferError> {
    serde_json::to_string_pretty(apps).map_err(TransferError::Encode)
}

/// Parse an exported collection, rejecting the whole file on the first bad record.
pub fn import_json(raw: &str) -> Result<Vec<JobApplication>, TransferError> {
    let value: Value = serde_json::from_str(raw).map_err(TransferError::InvalidJson)?;
    let Value::Array(records) = value else {
        return Err(TransferError::NotAList);
    };

    let mut seen = HashSet::new();
    let mut apps = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let imported: ImportedApplication =
            serde_json::from_value(record).map_err(|e| TransferError::Malformed {
                index,
                reason: e.to_string(),
            })?;
        let app = imported.into_application(index)?;
        if !seen.insert(app.id.clone()) {
            return Err(TransferError::Malformed {
                index,
                reason: format!("application id '{}' appears more than once", app.id),
            });
        }
        apps.push(app);
    }
    Ok(apps)
}
