use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use nextstep::config::{Backend, Config};
use nextstep::db::Database;
use nextstep::local::{FileStorage, LocalStore};
use nextstep::models::{
    ApplicationStatus, ApplicationUpdate, JobApplication, NewApplication, NewStep,
};
use nextstep::store::ApplicationStore;
use nextstep::tracker::{resolve_step, Tracker};
use nextstep::{stats, transfer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nextstep")]
#[command(about = "Job application tracker - record every step from applied to offer")]
struct Cli {
    /// Storage backend (sqlite, local)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Owner id whose applications to use
    #[arg(long, global = true)]
    user: Option<String>,

    /// Directory holding the database and the local store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storage
    Init,

    /// Add a job application
    Add {
        company: String,

        position: String,

        /// Date applied (YYYY-MM-DD, defaults to today)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        #[arg(long, default_value = "")]
        salary: String,

        #[arg(short, long, default_value = "")]
        location: String,

        #[arg(short, long, default_value = "")]
        notes: String,

        /// Mark as favorite
        #[arg(long)]
        favorite: bool,

        /// Add even if a similar application exists
        #[arg(long)]
        force: bool,
    },

    /// List applications
    List {
        /// Filter by current status
        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
    },

    /// Show an application and its history
    Show {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Show applications grouped by status
    Board,

    /// Edit application details
    Edit {
        /// Application ID (or unique prefix)
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        position: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Date applied (YYYY-MM-DD)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete an application and its history
    Delete {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Toggle the favorite flag
    Favorite {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Manage application steps
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },

    /// Show dashboard statistics
    Stats,

    /// Export all applications as JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all applications with the contents of an export file
    Import {
        file: PathBuf,
    },

    /// Delete every application
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum StepCommands {
    /// Record a step
    Add {
        /// Application ID (or unique prefix)
        id: String,

        /// Step date (YYYY-MM-DD, defaults to today)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Step status (defaults to the suggested next status)
        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        /// Contact person
        #[arg(short, long, default_value = "")]
        contact: String,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Edit a step
    Edit {
        /// Application ID (or unique prefix)
        id: String,

        /// Step ID (or unique prefix)
        step: String,

        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        #[arg(short, long)]
        contact: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a step
    Delete {
        /// Application ID (or unique prefix)
        id: String,

        /// Step ID (or unique prefix)
        step: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_store(config: &Config) -> Result<Box<dyn ApplicationStore>> {
    match config.backend {
        Backend::Sqlite => {
            let db = Database::open(&config.database_path())?;
            db.ensure_initialized()?;
            Ok(Box::new(db))
        }
        Backend::Local => {
            let storage = FileStorage::open(&config.local_dir())?;
            Ok(Box::new(LocalStore::new(storage)))
        }
    }
}

fn init(config: &Config) -> Result<()> {
    match config.backend {
        Backend::Sqlite => {
            let db = Database::open(&config.database_path())?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }
        Backend::Local => {
            let storage = FileStorage::open(&config.local_dir())?;
            println!("Local store ready at {}", storage.dir().display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(user) = cli.user {
        config.owner.id = user;
    }
    init_logging(&config.log_level);
    tracing::debug!(
        backend = %config.backend,
        data_dir = %config.data_dir.display(),
        "Loaded config"
    );

    if let Commands::Init = cli.command {
        return init(&config);
    }

    let store = open_store(&config)?;
    let mut tracker = Tracker::open(store, config.owner.clone())?;
    run(&mut tracker, cli.command, Local::now().date_naive())
}

fn run<S: ApplicationStore>(
    tracker: &mut Tracker<S>,
    command: Commands,
    today: NaiveDate,
) -> Result<()> {
    match command {
        Commands::Init => {}

        Commands::Add {
            company,
            position,
            date,
            salary,
            location,
            notes,
            favorite,
            force,
        } => {
            if !force {
                let similar = tracker.similar_applications(&company, &position);
                if !similar.is_empty() {
                    println!("Possible duplicate of:");
                    for app in similar {
                        println!(
                            "  {} - {} at {} ({})",
                            short_id(&app.id),
                            app.position,
                            app.company,
                            app.current_status.label()
                        );
                    }
                    println!("Use --force to add it anyway.");
                    return Ok(());
                }
            }

            let mut new = NewApplication::new(company, position, date.unwrap_or(today));
            new.salary = salary;
            new.location = location;
            new.notes = notes;
            new.favorite = favorite;
            let app = tracker.add_application(new)?;
            println!(
                "Added application {} ({} at {})",
                short_id(&app.id),
                app.position,
                app.company
            );
        }

        Commands::List { status, favorites } => {
            let apps: Vec<&JobApplication> = tracker
                .applications()
                .iter()
                .filter(|app| status.is_none_or(|s| app.current_status == s))
                .filter(|app| !favorites || app.favorite)
                .collect();
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<10} {:<16} {:<24} {:<24} {:<10} {}",
                    "ID", "STATUS", "COMPANY", "POSITION", "APPLIED", "FAV"
                );
                println!("{}", "-".repeat(90));
                for app in apps {
                    println!(
                        "{:<10} {:<16} {:<24} {:<24} {:<10} {}",
                        short_id(&app.id),
                        app.current_status.label(),
                        truncate(&app.company, 22),
                        truncate(&app.position, 22),
                        app.date_applied,
                        if app.favorite { "*" } else { "" }
                    );
                }
            }
        }

        Commands::Show { id } => {
            let app = tracker.resolve(&id)?;
            println!("Application {}", app.id);
            println!("Company: {}", app.company);
            println!("Position: {}", app.position);
            println!("Status: {}", app.current_status.label());
            println!("Applied: {}", app.date_applied);
            if !app.salary.is_empty() {
                println!("Salary: {}", app.salary);
            }
            if !app.location.is_empty() {
                println!("Location: {}", app.location);
            }
            if app.favorite {
                println!("Favorite: yes");
            }
            if !app.notes.is_empty() {
                println!("Notes:");
                print_wrapped(&app.notes, "  ");
            }

            println!("\nSteps ({}):", app.steps.len());
            for step in &app.steps {
                let contact = if step.contact_person.is_empty() {
                    String::new()
                } else {
                    format!(" with {}", step.contact_person)
                };
                println!(
                    "  {} {} {}{}",
                    short_id(&step.id),
                    step.date,
                    step.status.label(),
                    contact
                );
                if !step.notes.is_empty() {
                    print_wrapped(&step.notes, "      ");
                }
            }
            println!(
                "\nSuggested next step: {}",
                ApplicationStatus::suggest_next(Some(app.current_status)).label()
            );
        }

        Commands::Board => {
            let board = stats::group_by_status(tracker.applications());
            if board.is_empty() {
                println!("No applications found.");
            }
            for (status, apps) in board {
                println!("== {} ({})", status.label(), apps.len());
                for app in apps {
                    let star = if app.favorite { " *" } else { "" };
                    println!(
                        "  {:<10} {:<24} {:<24} {}{}",
                        short_id(&app.id),
                        truncate(&app.company, 22),
                        truncate(&app.position, 22),
                        app.latest_activity(),
                        star
                    );
                }
                println!();
            }
        }

        Commands::Edit {
            id,
            company,
            position,
            salary,
            location,
            date,
            notes,
        } => {
            let mut update = ApplicationUpdate::from(tracker.resolve(&id)?);
            if let Some(company) = company {
                update.company = company;
            }
            if let Some(position) = position {
                update.position = position;
            }
            if let Some(salary) = salary {
                update.salary = salary;
            }
            if let Some(location) = location {
                update.location = location;
            }
            if let Some(date) = date {
                update.date_applied = date;
            }
            if let Some(notes) = notes {
                update.notes = notes;
            }
            let app = tracker.update_application(update)?;
            println!("Updated application {}.", short_id(&app.id));
        }

        Commands::Delete { id } => {
            let app = tracker.resolve(&id)?;
            let (app_id, label) = (app.id.clone(), format!("{} at {}", app.position, app.company));
            tracker.delete_application(&app_id)?;
            println!("Deleted application {} ({}).", short_id(&app_id), label);
        }

        Commands::Favorite { id } => {
            let app_id = tracker.resolve(&id)?.id.clone();
            if tracker.toggle_favorite(&app_id)? {
                println!("Marked {} as favorite.", short_id(&app_id));
            } else {
                println!("Removed {} from favorites.", short_id(&app_id));
            }
        }

        Commands::Step { command } => match command {
            StepCommands::Add {
                id,
                date,
                status,
                contact,
                notes,
            } => {
                let app = tracker.resolve(&id)?;
                let app_id = app.id.clone();
                let suggested = ApplicationStatus::suggest_next(Some(app.current_status));
                let status = status.unwrap_or(suggested);

                let mut new = NewStep::new(date.unwrap_or(today), status);
                new.contact_person = contact;
                new.notes = notes;
                let step = tracker.add_application_step(&app_id, new)?;
                let current = tracker
                    .get(&app_id)
                    .map(|app| app.current_status.label())
                    .unwrap_or_default();
                println!(
                    "Recorded {} on {} (current status: {})",
                    step.status.label(),
                    step.date,
                    current
                );
            }

            StepCommands::Edit {
                id,
                step,
                date,
                status,
                contact,
                notes,
            } => {
                let app = tracker.resolve(&id)?;
                let app_id = app.id.clone();
                let mut edited = resolve_step(app, &step)?.clone();
                if let Some(date) = date {
                    edited.date = date;
                }
                if let Some(status) = status {
                    edited.status = status;
                }
                if let Some(contact) = contact {
                    edited.contact_person = contact;
                }
                if let Some(notes) = notes {
                    edited.notes = notes;
                }
                let step_id = edited.id.clone();
                tracker.update_application_step(&app_id, edited)?;
                println!("Updated step {}.", short_id(&step_id));
            }

            StepCommands::Delete { id, step } => {
                let app = tracker.resolve(&id)?;
                let app_id = app.id.clone();
                let step_id = resolve_step(app, &step)?.id.clone();
                tracker.delete_application_step(&app_id, &step_id)?;
                println!("Deleted step {}.", short_id(&step_id));
            }
        },

        Commands::Stats => {
            let apps = tracker.applications();
            let summary = stats::summarize(apps, today);
            if let Some(owner) = tracker.owner() {
                println!("Dashboard for {}", owner.profile_name());
            }
            println!("  Total applications: {}", summary.total);
            println!("  Active:             {}", summary.active);
            println!("  Response rate:      {:.1}%", summary.response_rate);
            println!("  Offer rate:         {:.1}%", summary.offer_rate);
            println!("  Applied (7 days):   {}", summary.applied_last_7_days);
            println!("  Applied (30 days):  {}", summary.applied_last_30_days);
            println!("  Avg. response time: {:.1} days", summary.avg_response_days);

            let breakdown = stats::status_breakdown(apps);
            if !breakdown.is_empty() {
                println!("\nBy status:");
                for share in breakdown {
                    print_share(&share);
                }
            }

            let responses = stats::first_response_breakdown(apps);
            if !responses.is_empty() {
                println!("\nFirst responses:");
                for share in responses {
                    print_share(&share);
                }
            }

            let favorites = stats::favorites(apps, 3);
            if !favorites.is_empty() {
                println!("\nFavorites:");
                for app in favorites {
                    println!("  {} - {} at {}", short_id(&app.id), app.position, app.company);
                }
            }

            let recent = stats::recent_applications(apps, 5);
            if !recent.is_empty() {
                println!("\nRecent:");
                for app in recent {
                    println!(
                        "  {} {} - {} at {} ({})",
                        app.date_applied,
                        short_id(&app.id),
                        app.position,
                        app.company,
                        app.current_status.label()
                    );
                }
            }
        }

        Commands::Export { output } => {
            let json = transfer::export_json(tracker.applications())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &json)
                        .with_context(|| format!("Failed to write to {}", path.display()))?;
                    println!(
                        "Exported {} application(s) to {}",
                        tracker.applications().len(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read import file: {}", file.display()))?;
            let apps = transfer::import_json(&raw)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            let count = apps.len();
            tracker.replace_all(apps)?;
            println!("Imported {} application(s).", count);
        }

        Commands::Clear { yes } => {
            let count = tracker.applications().len();
            if !yes {
                println!(
                    "This deletes all {} application(s). Re-run with --yes to confirm.",
                    count
                );
            } else {
                tracker.clear()?;
                println!("Deleted {} application(s).", count);
            }
        }
    }

    Ok(())
}

fn print_share(share: &stats::StatusShare) {
    println!(
        "  {:<16} {:>4} {:>6.1}%",
        share.status.label(),
        share.count,
        share.percentage
    );
}

fn print_wrapped(text: &str, indent: &str) {
    let options = textwrap::Options::new(76)
        .initial_indent(indent)
        .subsequent_indent(indent);
    for line in textwrap::wrap(text, &options) {
        println!("{}", line);
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
