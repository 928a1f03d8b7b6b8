//! Local durable backend: the whole collection serialized as JSON under one key.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::models::{ApplicationStep, JobApplication, Owner};
use crate::store::{validate_application, validate_collection, ApplicationStore, StoreError};

/// Base key the collection is stored under.
pub const STORAGE_KEY: &str = "applications";

/// Synchronous string-keyed storage.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `[A-Za-z0-9-]` pass through; every other byte becomes `_XX` (hex), so
    /// distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{byte:02X}"));
            }
        }
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        // Write beside the target and rename so readers never see a torn file.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Key holding `owner`'s collection. An owner without an id shares the bare key.
pub fn storage_key(owner: &Owner) -> String {
    if owner.id.is_empty() {
        STORAGE_KEY.to_string()
    } else {
        format!("{STORAGE_KEY}-{}", owner.id)
    }
}

pub struct LocalStore<S: KeyValueStorage> {
    storage: S,
}

impl<S: KeyValueStorage> LocalStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn read(&self, owner: &Owner) -> Result<Vec<JobApplication>, StoreError> {
        let key = storage_key(owner);
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<JobApplication>>(&raw) {
            Ok(apps) => Ok(apps),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Stored applications are malformed, starting empty"
                );
                Ok(Vec::new())
            }
        }
    }

    fn write(&mut self, owner: &Owner, apps: &[JobApplication]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(apps)?;
        self.storage.set(&storage_key(owner), &raw)
    }

    /// Read, patch, and re-serialize the whole collection.
    fn modify<T>(
        &mut self,
        owner: &Owner,
        f: impl FnOnce(&mut Vec<JobApplication>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut apps = self.read(owner)?;
        let out = f(&mut apps)?;
        self.write(owner, &apps)?;
        Ok(out)
    }
}

fn find_mut<'a>(
    apps: &'a mut [JobApplication],
    id: &str,
) -> Result<&'a mut JobApplication, StoreError> {
    apps.iter_mut()
        .find(|app| app.id == id)
        .ok_or_else(|| StoreError::application_not_found(id))
}

impl<S: KeyValueStorage> ApplicationStore for LocalStore<S> {
    fn load_all(&self, owner: &Owner) -> Result<Vec<JobApplication>, StoreError> {
        let mut apps = self.read(owner)?;
        for app in &mut apps {
            app.refresh_status();
        }
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apps)
    }

    fn insert_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<JobApplication, StoreError> {
        validate_application(app)?;
        self.modify(owner, |apps| {
            if apps.iter().any(|existing| existing.id == app.id) {
                return Err(StoreError::ValidationFailed(format!(
                    "application '{}' already exists",
                    app.id
                )));
            }
            apps.insert(0, app.clone());
            Ok(app.clone())
        })
    }

    fn update_application(
        &mut self,
        owner: &Owner,
        app: &JobApplication,
    ) -> Result<(), StoreError> {
        self.modify(owner, |apps| {
            let stored = find_mut(apps, &app.id)?;
            stored.company = app.company.clone();
            stored.position = app.position.clone();
            stored.salary = app.salary.clone();
            stored.location = app.location.clone();
            stored.date_applied = app.date_applied;
            stored.notes = app.notes.clone();
            stored.favorite = app.favorite;
            stored.updated_at = app.updated_at;
            Ok(())
        })
    }

    fn delete_application(&mut self, owner: &Owner, id: &str) -> Result<(), StoreError> {
        self.modify(owner, |apps| {
            let before = apps.len();
            apps.retain(|app| app.id != id);
            if apps.len() == before {
                return Err(StoreError::application_not_found(id));
            }
            Ok(())
        })
    }

    fn insert_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<ApplicationStep, StoreError> {
        self.modify(owner, |apps| {
            let app = find_mut(apps, application_id)?;
            app.steps.insert(0, step.clone());
            app.refresh_status();
            Ok(step.clone())
        })
    }

    fn update_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step: &ApplicationStep,
    ) -> Result<(), StoreError> {
        self.modify(owner, |apps| {
            let app = find_mut(apps, application_id)?;
            let stored = app
                .steps
                .iter_mut()
                .find(|s| s.id == step.id)
                .ok_or_else(|| StoreError::step_not_found(&step.id))?;
            stored.date = step.date;
            stored.status = step.status;
            stored.contact_person = step.contact_person.clone();
            stored.notes = step.notes.clone();
            app.refresh_status();
            Ok(())
        })
    }

    fn delete_step(
        &mut self,
        owner: &Owner,
        application_id: &str,
        step_id: &str,
    ) -> Result<(), StoreError> {
        self.modify(owner, |apps| {
            let app = find_mut(apps, application_id)?;
            let before = app.steps.len();
            app.steps.retain(|s| s.id != step_id);
            if app.steps.len() == before {
                return Err(StoreError::step_not_found(step_id));
            }
            app.refresh_status();
            Ok(())
        })
    }

    fn replace_all(&mut self, owner: &Owner, apps: &[JobApplication]) -> Result<(), StoreError> {
        validate_collection(apps)?;
        if apps.is_empty() {
            return self.storage.remove(&storage_key(owner));
        }
        self.write(owner, apps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::{NaiveDate, Utc};
    use tempfile::tempdir;

    fn owner() -> Owner {
        Owner::new("u1", "Sam", "sam@example.com")
    }

    fn sample(id: &str) -> JobApplication {
        let now = Utc::now();
        let applied = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        JobApplication {
            id: id.to_string(),
            company: "Acme".to_string(),
            position: "Engineer".to_string(),
            salary: String::new(),
            location: String::new(),
            date_applied: applied,
            notes: String::new(),
            favorite: false,
            current_status: ApplicationStatus::Applied,
            steps: vec![ApplicationStep {
                id: format!("{id}-s1"),
                date: applied,
                status: ApplicationStatus::Applied,
                contact_person: String::new(),
                notes: String::new(),
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_storage_key_is_namespaced() {
        assert_eq!(storage_key(&owner()), "applications-u1");
        assert_eq!(storage_key(&Owner::new("", "", "")), "applications");
    }

    #[test]
    fn test_missing_key_loads_empty() {
        let store = LocalStore::new(MemoryStorage::default());
        assert!(store.load_all(&owner()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_data_loads_empty() {
        let mut storage = MemoryStorage::default();
        storage.set("applications-u1", "{not json").unwrap();
        let store = LocalStore::new(storage);
        assert!(store.load_all(&owner()).unwrap().is_empty());
    }

    #[test]
    fn test_owners_do_not_see_each_other() {
        let mut store = LocalStore::new(MemoryStorage::default());
        store.insert_application(&owner(), &sample("a1")).unwrap();

        let other = Owner::new("u2", "Kim", "");
        assert!(store.load_all(&other).unwrap().is_empty());
        assert_eq!(store.load_all(&owner()).unwrap().len(), 1);
    }

    #[test]
    fn test_step_edits_rederive_status() {
        let mut store = LocalStore::new(MemoryStorage::default());
        store.insert_application(&owner(), &sample("a1")).unwrap();

        let offer = ApplicationStep {
            id: "s2".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            status: ApplicationStatus::Offer,
            contact_person: String::new(),
            notes: String::new(),
            created_at: Utc::now(),
        };
        store.insert_step(&owner(), "a1", &offer).unwrap();
        assert_eq!(
            store.load_all(&owner()).unwrap()[0].current_status,
            ApplicationStatus::Offer
        );

        store.delete_step(&owner(), "a1", "s2").unwrap();
        assert_eq!(
            store.load_all(&owner()).unwrap()[0].current_status,
            ApplicationStatus::Applied
        );
        assert!(matches!(
            store.delete_step(&owner(), "a1", "s2"),
            Err(StoreError::NotFound { kind: "step", .. })
        ));
    }

    #[test]
    fn test_update_unknown_application_fails() {
        let mut store = LocalStore::new(MemoryStorage::default());
        assert!(matches!(
            store.update_application(&owner(), &sample("ghost")),
            Err(StoreError::NotFound { kind: "application", .. })
        ));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut store = LocalStore::new(MemoryStorage::default());
        store.insert_application(&owner(), &sample("a1")).unwrap();
        assert!(matches!(
            store.insert_application(&owner(), &sample("a1")),
            Err(StoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        let app = sample("a1");
        {
            let mut store = LocalStore::new(FileStorage::open(dir.path()).unwrap());
            store.insert_application(&owner(), &app).unwrap();
        }
        let store = LocalStore::new(FileStorage::open(dir.path()).unwrap());
        assert_eq!(store.load_all(&owner()).unwrap(), vec![app]);
        assert!(dir.path().join("applications-u1.json").exists());
    }

    #[test]
    fn test_file_storage_sanitizes_keys() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set("applications-a/b@c", "[]").unwrap();
        assert!(dir.path().join("applications-a_2Fb_40c.json").exists());
        assert_eq!(storage.get("applications-a/b@c").unwrap().as_deref(), Some("[]"));

        storage.remove("applications-a/b@c").unwrap();
        storage.remove("applications-a/b@c").unwrap();
        assert_eq!(storage.get("applications-a/b@c").unwrap(), None);
    }

    #[test]
    fn test_similar_owner_ids_get_separate_files() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::new(FileStorage::open(dir.path()).unwrap());
        let at = Owner::new("a@b", "", "");
        let underscore = Owner::new("a_b", "", "");
        store.insert_application(&at, &sample("a1")).unwrap();

        assert!(store.load_all(&underscore).unwrap().is_empty());
        store.insert_application(&underscore, &sample("u1")).unwrap();
        let ids: Vec<String> = store.load_all(&at).unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a1"]);
        assert!(dir.path().join("applications-a_40b.json").exists());
        assert!(dir.path().join("applications-a_5Fb.json").exists());
    }

    #[test]
    fn test_replace_all_rejects_repeated_ids() {
        let mut store = LocalStore::new(MemoryStorage::default());
        store.insert_application(&owner(), &sample("a1")).unwrap();
        assert!(matches!(
            store.replace_all(&owner(), &[sample("dup"), sample("dup")]),
            Err(StoreError::ValidationFailed(_))
        ));
        let ids: Vec<String> = store
            .load_all(&owner())
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn test_replace_all_with_nothing_clears_key() {
        let mut store = LocalStore::new(MemoryStorage::default());
        store.insert_application(&owner(), &sample("a1")).unwrap();
        store.replace_all(&owner(), &[]).unwrap();
        assert_eq!(store.storage().get("applications-u1").unwrap(), None);
    }
}
