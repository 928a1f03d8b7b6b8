use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Notes recorded on the initial step when the user supplied none.
pub const INITIAL_STEP_NOTES: &str = "Initial application submitted";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Applied,
    Screening,
    Interview,
    Assessment,
    Final,
    Progress,
    Offer,
    Accepted,
    Rejected,
    Withdrawn,
    Archived,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 11] = [
        ApplicationStatus::Applied,
        ApplicationStatus::Screening,
        ApplicationStatus::Interview,
        ApplicationStatus::Assessment,
        ApplicationStatus::Final,
        ApplicationStatus::Progress,
        ApplicationStatus::Offer,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
        ApplicationStatus::Archived,
    ];

    /// Non-terminal statuses in the order an application normally moves through them.
    const PROGRESSION: [ApplicationStatus; 7] = [
        ApplicationStatus::Applied,
        ApplicationStatus::Screening,
        ApplicationStatus::Interview,
        ApplicationStatus::Assessment,
        ApplicationStatus::Final,
        ApplicationStatus::Progress,
        ApplicationStatus::Offer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Screening => "screening",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Assessment => "assessment",
            ApplicationStatus::Final => "final",
            ApplicationStatus::Progress => "progress",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
            ApplicationStatus::Archived => "archived",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Screening => "Screening",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::Assessment => "Assessment",
            ApplicationStatus::Final => "Final Interview",
            ApplicationStatus::Progress => "In Progress",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Withdrawn => "Withdrawn",
            ApplicationStatus::Archived => "Archived",
        }
    }

    /// Statuses the progression never advances out of.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted
                | ApplicationStatus::Rejected
                | ApplicationStatus::Withdrawn
                | ApplicationStatus::Archived
        )
    }

    /// True once the employer has responded and the application moved forward.
    pub fn is_progressing(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Screening
                | ApplicationStatus::Interview
                | ApplicationStatus::Assessment
                | ApplicationStatus::Final
                | ApplicationStatus::Progress
                | ApplicationStatus::Offer
                | ApplicationStatus::Accepted
        )
    }

    pub fn is_offer(self) -> bool {
        matches!(self, ApplicationStatus::Offer | ApplicationStatus::Accepted)
    }

    /// Status to suggest for the next step. Terminal statuses stay put; `Offer`
    /// wraps back to `Applied`.
    pub fn next(self) -> Self {
        if self.is_terminal() {
            return self;
        }
        match Self::PROGRESSION.iter().position(|s| *s == self) {
            Some(i) => Self::PROGRESSION[(i + 1) % Self::PROGRESSION.len()],
            None => ApplicationStatus::Screening,
        }
    }

    /// Like [`next`](Self::next), falling back to `Screening` when nothing is known.
    pub fn suggest_next(current: Option<Self>) -> Self {
        current.map_or(ApplicationStatus::Screening, Self::next)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown application status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for ApplicationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| {
                status.as_str().eq_ignore_ascii_case(wanted)
                    || status.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStep {
    pub id: String,
    pub date: NaiveDate,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl ApplicationStep {
    /// Newest first: later date wins, then later creation.
    fn recency(a: &ApplicationStep, b: &ApplicationStep) -> Ordering {
        b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: String,
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub location: String,
    pub date_applied: NaiveDate,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub favorite: bool,
    pub current_status: ApplicationStatus,
    #[serde(default)]
    pub steps: Vec<ApplicationStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobApplication {
    /// Re-sort the history newest first and take the head's status as current.
    ///
    /// The sort is stable, so among steps sharing a date and creation time the
    /// one placed earlier in `steps` stays ahead.
    pub fn refresh_status(&mut self) {
        self.steps.sort_by(ApplicationStep::recency);
        self.current_status = self
            .steps
            .first()
            .map(|step| step.status)
            .unwrap_or_default();
    }

    pub fn step(&self, step_id: &str) -> Option<&ApplicationStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn latest_step(&self) -> Option<&ApplicationStep> {
        self.steps.iter().min_by(|a, b| ApplicationStep::recency(a, b))
    }

    /// Earliest step that moved the application away from `applied`.
    pub fn first_response(&self) -> Option<&ApplicationStep> {
        self.steps
            .iter()
            .filter(|step| step.status != ApplicationStatus::Applied)
            .max_by(|a, b| ApplicationStep::recency(a, b))
    }

    /// Date of the latest recorded event, or the application date.
    pub fn latest_activity(&self) -> NaiveDate {
        self.steps
            .iter()
            .map(|step| step.date)
            .max()
            .unwrap_or(self.date_applied)
    }
}

/// The authenticated principal a collection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Name for a freshly created profile record.
    pub fn profile_name(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.trim().to_string();
        }
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "User".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub company: String,
    pub position: String,
    pub salary: String,
    pub location: String,
    pub date_applied: NaiveDate,
    pub notes: String,
    pub favorite: bool,
}

impl NewApplication {
    pub fn new(
        company: impl Into<String>,
        position: impl Into<String>,
        date_applied: NaiveDate,
    ) -> Self {
        Self {
            company: company.into(),
            position: position.into(),
            salary: String::new(),
            location: String::new(),
            date_applied,
            notes: String::new(),
            favorite: false,
        }
    }
}

/// Replacement values for the mutable fields of an existing application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationUpdate {
    pub id: String,
    pub company: String,
    pub position: String,
    pub salary: String,
    pub location: String,
    pub date_applied: NaiveDate,
    pub notes: String,
    pub favorite: bool,
}

impl From<&JobApplication> for ApplicationUpdate {
    fn from(app: &JobApplication) -> Self {
        Self {
            id: app.id.clone(),
            company: app.company.clone(),
            position: app.position.clone(),
            salary: app.salary.clone(),
            location: app.location.clone(),
            date_applied: app.date_applied,
            notes: app.notes.clone(),
            favorite: app.favorite,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStep {
    pub date: NaiveDate,
    pub status: ApplicationStatus,
    pub contact_person: String,
    pub notes: String,
}

impl NewStep {
    pub fn new(date: NaiveDate, status: ApplicationStatus) -> Self {
        Self {
            date,
            status,
            contact_person: String::new(),
            notes: String::new(),
        }
    }
}
