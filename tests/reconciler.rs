use chrono::{Days, NaiveDate};
use nextstep::db::Database;
use nextstep::local::{FileStorage, LocalStore, MemoryStorage};
use nextstep::models::{ApplicationStatus, JobApplication, NewApplication, NewStep, Owner};
use nextstep::store::ApplicationStore;
use nextstep::tracker::{Tracker, TrackerError};
use nextstep::{stats, transfer};
use proptest::prelude::*;
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn owner() -> Owner {
    Owner::new("u1", "Sam", "sam@example.com")
}

fn sqlite_tracker(dir: &TempDir) -> Tracker<Database> {
    let db = Database::open(&dir.path().join("nextstep.db")).unwrap();
    db.init().unwrap();
    Tracker::open(db, owner()).unwrap()
}

fn local_tracker(dir: &TempDir) -> Tracker<LocalStore<FileStorage>> {
    let storage = FileStorage::open(dir.path()).unwrap();
    Tracker::open(LocalStore::new(storage), owner()).unwrap()
}

/// Runs `scenario` once against each backend.
fn on_both_backends(scenario: fn(&mut dyn FnMut() -> Box<dyn ApplicationStore>)) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nextstep.db");
    scenario(&mut || {
        let db = Database::open(&path).unwrap();
        db.init().unwrap();
        Box::new(db)
    });

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().to_path_buf();
    scenario(&mut || Box::new(LocalStore::new(FileStorage::open(&local).unwrap())));
}

fn add_acme<S: ApplicationStore>(tracker: &mut Tracker<S>) -> String {
    tracker
        .add_application(NewApplication::new("Acme", "Engineer", date("2025-01-10")))
        .unwrap()
        .id
        .clone()
}

#[test]
fn create_application_records_initial_step() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let id = add_acme(&mut tracker);

        assert_eq!(tracker.applications().len(), 1);
        let app = tracker.get(&id).unwrap();
        assert_eq!(app.steps.len(), 1);
        assert_eq!(app.steps[0].status, ApplicationStatus::Applied);
        assert_eq!(app.steps[0].date, date("2025-01-10"));
        assert_eq!(app.current_status, ApplicationStatus::Applied);
    });
}

#[test]
fn later_step_advances_and_backdated_step_does_not() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let id = add_acme(&mut tracker);

        tracker
            .add_application_step(
                &id,
                NewStep::new(date("2025-01-15"), ApplicationStatus::Screening),
            )
            .unwrap();
        let app = tracker.get(&id).unwrap();
        assert_eq!(app.current_status, ApplicationStatus::Screening);
        assert_eq!(app.steps.len(), 2);

        tracker
            .add_application_step(
                &id,
                NewStep::new(date("2025-01-12"), ApplicationStatus::Interview),
            )
            .unwrap();
        let app = tracker.get(&id).unwrap();
        assert_eq!(app.current_status, ApplicationStatus::Screening);
        assert_eq!(app.steps.len(), 3);
        let dates: Vec<NaiveDate> = app.steps.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date("2025-01-15"), date("2025-01-12"), date("2025-01-10")]);
    });
}

#[test]
fn toggle_favorite_flips_back_and_forth() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let id = add_acme(&mut tracker);

        assert!(!tracker.get(&id).unwrap().favorite);
        assert!(tracker.toggle_favorite(&id).unwrap());
        assert!(tracker.get(&id).unwrap().favorite);
        assert!(!tracker.toggle_favorite(&id).unwrap());
        assert!(!tracker.get(&id).unwrap().favorite);
    });
}

#[test]
fn deleting_only_step_leaves_collection_unchanged() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let id = add_acme(&mut tracker);
        let step_id = tracker.get(&id).unwrap().steps[0].id.clone();
        let before = tracker.applications().to_vec();

        let err = tracker.delete_application_step(&id, &step_id).unwrap_err();
        assert!(matches!(err, TrackerError::LastStep { .. }));
        assert_eq!(tracker.applications(), before.as_slice());

        let reopened = Tracker::open(open(), owner()).unwrap();
        assert_eq!(reopened.applications(), before.as_slice());
    });
}

#[test]
fn committed_state_matches_a_fresh_load() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let acme = add_acme(&mut tracker);
        let globex = tracker
            .add_application(NewApplication::new("Globex", "Analyst", date("2025-01-11")))
            .unwrap()
            .id
            .clone();
        let step = tracker
            .add_application_step(&acme, NewStep::new(date("2025-01-20"), ApplicationStatus::Offer))
            .unwrap();
        tracker
            .add_application_step(
                &globex,
                NewStep::new(date("2025-01-21"), ApplicationStatus::Rejected),
            )
            .unwrap();
        tracker.toggle_favorite(&globex).unwrap();

        let mut edited = step.clone();
        edited.contact_person = "Dana".to_string();
        edited.status = ApplicationStatus::Accepted;
        tracker.update_application_step(&acme, edited).unwrap();

        let reopened = Tracker::open(open(), owner()).unwrap();
        assert_eq!(reopened.applications(), tracker.applications());
        assert_eq!(
            reopened.get(&acme).unwrap().current_status,
            ApplicationStatus::Accepted
        );

        tracker.delete_application(&globex).unwrap();
        let reopened = Tracker::open(open(), owner()).unwrap();
        assert_eq!(reopened.applications(), tracker.applications());
        assert_eq!(reopened.applications().len(), 1);
    });
}

#[test]
fn owners_do_not_see_each_other() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        add_acme(&mut tracker);

        let other = Tracker::open(open(), Owner::new("u2", "Kim", "")).unwrap();
        assert!(other.applications().is_empty());
    });
}

#[test]
fn one_export_imports_under_two_owners() {
    on_both_backends(|open| {
        let mut alice = Tracker::open(open(), Owner::new("alice", "Alice", "")).unwrap();
        add_acme(&mut alice);
        let exported = transfer::export_json(alice.applications()).unwrap();

        let mut bob = Tracker::open(open(), Owner::new("bob", "Bob", "")).unwrap();
        bob.replace_all(transfer::import_json(&exported).unwrap()).unwrap();
        assert_eq!(bob.applications(), alice.applications());

        let id = bob.applications()[0].id.clone();
        bob.delete_application(&id).unwrap();
        let alice = Tracker::open(open(), Owner::new("alice", "Alice", "")).unwrap();
        assert_eq!(alice.applications().len(), 1);
        let bob = Tracker::open(open(), Owner::new("bob", "Bob", "")).unwrap();
        assert!(bob.applications().is_empty());
    });
}

#[test]
fn repeated_ids_never_reach_the_store() {
    on_both_backends(|open| {
        let mut tracker = Tracker::open(open(), owner()).unwrap();
        let id = add_acme(&mut tracker);
        let mut twice = tracker.applications().to_vec();
        twice.push(twice[0].clone());
        let exported = transfer::export_json(&twice).unwrap();

        assert!(matches!(
            transfer::import_json(&exported),
            Err(transfer::TransferError::Malformed { index: 1, .. })
        ));
        let before = tracker.applications().to_vec();
        assert!(tracker.replace_all(twice).is_err());
        assert_eq!(tracker.applications(), before.as_slice());

        tracker.delete_application(&id).unwrap();
        tracker.reload().unwrap();
        assert!(tracker.applications().is_empty());
    });
}

#[test]
fn status_counts_and_offer_rate() {
    let mut tracker = Tracker::open(LocalStore::new(MemoryStorage::default()), owner()).unwrap();
    let statuses = [
        ApplicationStatus::Applied,
        ApplicationStatus::Applied,
        ApplicationStatus::Screening,
        ApplicationStatus::Offer,
    ];
    for (i, status) in statuses.iter().enumerate() {
        let id = tracker
            .add_application(
                NewApplication::new(format!("Company {i}"), "Engineer", date("2025-01-10")),
            )
            .unwrap()
            .id
            .clone();
        if *status != ApplicationStatus::Applied {
            tracker
                .add_application_step(&id, NewStep::new(date("2025-01-20"), *status))
                .unwrap();
        }
    }

    let summary = stats::summarize(tracker.applications(), date("2025-02-01"));
    assert_eq!(summary.total, 4);
    assert_eq!(summary.counts.get(&ApplicationStatus::Applied), Some(&2));
    assert_eq!(summary.counts.get(&ApplicationStatus::Screening), Some(&1));
    assert_eq!(summary.counts.get(&ApplicationStatus::Offer), Some(&1));
    assert_eq!(summary.counts.len(), 3);
    assert_eq!(summary.offer_rate, 25.0);
}

#[test]
fn sqlite_and_local_trackers_open_on_disk() {
    let sqlite_dir = tempfile::tempdir().unwrap();
    let mut sqlite = sqlite_tracker(&sqlite_dir);
    add_acme(&mut sqlite);
    assert_eq!(sqlite_tracker(&sqlite_dir).applications().len(), 1);

    let local_dir = tempfile::tempdir().unwrap();
    let mut local = local_tracker(&local_dir);
    add_acme(&mut local);
    assert_eq!(local_tracker(&local_dir).applications().len(), 1);
}

fn status_strategy() -> impl Strategy<Value = ApplicationStatus> {
    prop::sample::select(ApplicationStatus::ALL.to_vec())
}

/// Distinct day offsets after the application date, each with a status.
fn history_strategy() -> impl Strategy<Value = Vec<(u64, ApplicationStatus)>> {
    prop::collection::btree_set(1u64..400, 1..8).prop_flat_map(|days| {
        let days: Vec<u64> = days.into_iter().collect();
        let n = days.len();
        (Just(days), prop::collection::vec(status_strategy(), n))
            .prop_map(|(days, statuses)| days.into_iter().zip(statuses).collect::<Vec<_>>())
    })
    .prop_shuffle()
}

fn memory_tracker() -> Tracker<LocalStore<MemoryStorage>> {
    Tracker::open(LocalStore::new(MemoryStorage::default()), owner()).unwrap()
}

proptest! {
    #[test]
    fn current_status_is_latest_dated_step(history in history_strategy()) {
        let base = date("2025-01-01");
        let mut tracker = memory_tracker();
        let id = tracker
            .add_application(NewApplication::new("Acme", "Engineer", base))
            .unwrap()
            .id
            .clone();

        for (offset, status) in &history {
            let day = base.checked_add_days(Days::new(*offset)).unwrap();
            tracker.add_application_step(&id, NewStep::new(day, *status)).unwrap();
        }

        let app = tracker.get(&id).unwrap();
        let (_, expected) = history.iter().max_by_key(|(offset, _)| *offset).unwrap();
        prop_assert_eq!(app.current_status, *expected);
        prop_assert_eq!(app.steps.len(), history.len() + 1);
    }

    #[test]
    fn backdated_step_never_changes_status(
        history in history_strategy(),
        status in status_strategy(),
    ) {
        let base = date("2025-06-01");
        let mut tracker = memory_tracker();
        let id = tracker
            .add_application(NewApplication::new("Acme", "Engineer", base))
            .unwrap()
            .id
            .clone();
        for (offset, s) in &history {
            let day = base.checked_add_days(Days::new(*offset)).unwrap();
            tracker.add_application_step(&id, NewStep::new(day, *s)).unwrap();
        }
        let before = tracker.get(&id).unwrap().current_status;

        let earlier = base.checked_sub_days(Days::new(1)).unwrap();
        tracker.add_application_step(&id, NewStep::new(earlier, status)).unwrap();
        prop_assert_eq!(tracker.get(&id).unwrap().current_status, before);
    }

    #[test]
    fn local_store_round_trips_collection(
        histories in prop::collection::vec(history_strategy(), 0..5),
        favorites in prop::collection::vec(any::<bool>(), 5),
    ) {
        let base = date("2024-03-01");
        let mut tracker = memory_tracker();
        for (i, history) in histories.iter().enumerate() {
            let mut new = NewApplication::new(format!("Company {i}"), "Engineer", base);
            new.favorite = favorites[i];
            new.notes = format!("note {i}");
            let id = tracker.add_application(new).unwrap().id.clone();
            for (offset, status) in history {
                let day = base.checked_add_days(Days::new(*offset)).unwrap();
                tracker.add_application_step(&id, NewStep::new(day, *status)).unwrap();
            }
        }

        let expected: Vec<JobApplication> = tracker.applications().to_vec();
        let reopened = Tracker::open(tracker.into_store(), owner()).unwrap();
        prop_assert_eq!(reopened.applications(), expected.as_slice());
    }

    #[test]
    fn next_stays_within_its_kind(status in status_strategy()) {
        let next = status.next();
        if status.is_terminal() {
            prop_assert_eq!(next, status);
        } else {
            prop_assert!(!next.is_terminal());
            prop_assert_ne!(next, status);
        }
    }
}
