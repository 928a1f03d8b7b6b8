use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{ApplicationStatus, ApplicationStep, JobApplication, Owner};
use crate::store::{validate_application, validate_collection, ApplicationStore, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Relational backend: profiles, applications and their steps in SQLite.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS applications (
                id TEXT NOT NULL,
                profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                company TEXT NOT NULL,
                position TEXT NOT NULL,
                salary TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                date_applied TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                favorite INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (profile_id, id)
            );

            CREATE TABLE IF NOT EXISTS application_steps (
                id TEXT NOT NULL,
                profile_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN (
                    'applied', 'screening', 'interview', 'assessment', 'final', 'progress',
                    'offer', 'accepted', 'rejected', 'withdrawn', 'archived'
                )),
                contact_person TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                PRIMARY KEY (profile_id, application_id, id),
                FOREIGN KEY (profile_id, application_id)
                    REFERENCES applications(profile_id, id) ON DELETE CASCADE
            );
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<(), StoreError> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(StoreError::Unavailable(
                "database not initialized, run 'nextstep init' first".to_string(),
            ));
        }
        Ok(())
    }

    // --- Profile operations ---

    /// Create a minimal profile row for `owner` unless one exists.
    fn ensure_profile(conn: &Connection, owner: &Owner) -> Result<(), StoreError> {
        let existing = conn.query_row(
            "SELECT id FROM profiles WHERE id = ?1",
            [&owner.id],
            |row| row.get::<_, String>(0),
        );
        match existing {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                conn.execute(
                    "INSERT INTO profiles (id, name, email) VALUES (?1, ?2, ?3)",
                    params![owner.id, owner.profile_name(), owner.email],
                )?;
                tracing::info!(owner_id = %owner.id, "Created profile");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn profile_exists(&self, owner_id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE id = ?1",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // --- Application operations ---

    fn application_exists(
        conn: &Connection,
        owner: &Owner,
        application_id: &str,
    ) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE id = ?1 AND profile_id = ?2",
            params![application_id, owner.id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_application_row(
        conn: &Connection,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO applications (id, profile_id, company, position, salary, location,
                                       date_applied, notes, favorite, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                app.id,
                owner.id,
                app.company,
                app.position,
                app.salary,
                app.location,
                format_date(app.date_applied),
                app.notes,
                app.favorite,
                format_timestamp(app.created_at),
                format_timestamp(app.updated_at),
            ],
        )?;
        for step in &app.steps {
            Self::insert_step_row(conn, owner, &app.id, step)?;
        }
        Ok(())
    }

    fn insert_step_row(
        conn: &Connection,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO application_steps
                 (id, profile_id, application_id, date, status, contact_person, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                step.id,
                owner.id,
                application_id,
                format_date(step.date),
                step.status.as_str(),
                step.contact_person,
                step.notes,
                format_timestamp(step.created_at),
            ],
        )?;
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<JobApplication> {
        Ok(JobApplication {
            id: row.get(0)?,
            company: row.get(1)?,
            position: row.get(2)?,
            salary: row.get(3)?,
            location: row.get(4)?,
            date_applied: parse_date(row, 5)?,
            notes: row.get(6)?,
            favorite: row.get(7)?,
            current_status: ApplicationStatus::Applied,
            steps: Vec::new(),
            created_at: parse_timestamp(row, 8)?,
            updated_at: parse_timestamp(row, 9)?,
        })
    }

    /// Expects the application id in column 0 and the step in columns 1..=6.
    fn row_to_step(row: &rusqlite::Row) -> rusqlite::Result<(String, ApplicationStep)> {
        let status: String = row.get(3)?;
        let status = status
            .parse::<ApplicationStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        Ok((
            row.get(0)?,
            ApplicationStep {
                id: row.get(1)?,
                date: parse_date(row, 2)?,
                status,
                contact_person: row.get(4)?,
                notes: row.get(5)?,
                created_at: parse_timestamp(row, 6)?,
            },
        ))
    }
}

impl ApplicationStore for Database {
    fn load_all(&self, owner: &Owner) -> Result<Vec<JobApplication>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company, position, salary, location, date_applied, notes, favorite,
                    created_at, updated_at
             FROM applications
             WHERE profile_id = ?1
             ORDER BY created_at DESC",
        )?;
        let mut apps = stmt
            .query_map([&owner.id], Self::row_to_application)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT application_id, id, date, status, contact_person, notes, created_at
             FROM application_steps
             WHERE profile_id = ?1",
        )?;
        let mut steps: HashMap<String, Vec<ApplicationStep>> = HashMap::new();
        for row in stmt.query_map([&owner.id], Self::row_to_step)? {
            let (application_id, step) = row?;
            steps.entry(application_id).or_default().push(step);
        }

        for app in &mut apps {
            app.steps = steps.remove(&app.id).unwrap_or_default();
            app.refresh_status();
        }
        tracing::debug!(owner_id = %owner.id, count = apps.len(), "Loaded applications");
        Ok(apps)
    }

    fn insert_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<JobApplication, StoreError> {
        validate_application(app)?;
        let tx = self.conn.transaction()?;
        Self::ensure_profile(&tx, owner)?;
        Self::insert_application_row(&tx, owner, app)?;
        tx.commit()?;
        Ok(app.clone())
    }

    fn update_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE applications
             SET company = ?3, position = ?4, salary = ?5, location = ?6, date_applied = ?7,
                 notes = ?8, favorite = ?9, updated_at = ?10
             WHERE id = ?1 AND profile_id = ?2",
            params![
                app.id,
                owner.id,
                app.company,
                app.position,
                app.salary,
                app.location,
                format_date(app.date_applied),
                app.notes,
                app.favorite,
                format_timestamp(app.updated_at),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::application_not_found(&app.id));
        }
        Ok(())
    }

    fn delete_application(&mut self, owner: &Owner, id: &str) -> Result<(), StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM applications WHERE id = ?1 AND profile_id = ?2",
            params![id, owner.id],
        )?;
        if deleted == 0 {
            return Err(StoreError::application_not_found(id));
        }
        Ok(())
    }

    fn insert_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<ApplicationStep, StoreError> {
        if !Self::application_exists(&self.conn, owner, application_id)? {
            return Err(StoreError::application_not_found(application_id));
        }
        Self::insert_step_row(&self.conn, owner, application_id, step)?;
        Ok(step.clone())
    }

    fn update_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE application_steps
             SET date = ?3, status = ?4, contact_person = ?5, notes = ?6
             WHERE id = ?1 AND application_id = ?2 AND profile_id = ?7",
            params![
                step.id,
                application_id,
                format_date(step.date),
                step.status.as_str(),
                step.contact_person,
                step.notes,
                owner.id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::step_not_found(&step.id));
        }
        Ok(())
    }

    fn delete_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step_id: &str,
    ) -> Result<(), StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM application_steps
             WHERE id = ?1 AND application_id = ?2 AND profile_id = ?3",
            params![step_id, application_id, owner.id],
        )?;
        if deleted == 0 {
            return Err(StoreError::step_not_found(step_id));
        }
        Ok(())
    }

    fn replace_all(&mut self, owner: &Owner, apps: &[JobApplication]) -> Result<(), StoreError> {
        validate_collection(apps)?;
        let tx = self.conn.transaction()?;
        Self::ensure_profile(&tx, owner)?;
        tx.execute("DELETE FROM applications WHERE profile_id = ?1", [&owner.id])?;
        for app in apps {
            Self::insert_application_row(&tx, owner, app)?;
        }
        tx.commit()?;
        Ok(())
    }
}

// --- Column encoding ---

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
