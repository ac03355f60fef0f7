use std::{fs::File, path::PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use dpstash::{
    Config, LibraryDb, LibraryError, UserDb, YearlyStatsService,
    core::db::{
        ArtistRepository, CompanyRepository, DrillShape, KitCategory, NewCompany,
        NewProgressNote, NewProject, NewTag, ProgressNoteRepository, Project, ProjectQuery,
        ProjectRepository, ProjectStatus, SortDirection, SortField, SpinRepository,
        TagRepository, UserRepository, format_date, parse_date, today,
    },
    dashboard::{DashboardSession, ViewType},
    import::{ImportOptions, import_csv, template_csv},
    logging,
    randomizer::{self, CandidatePool},
    retry::{RetryPolicy, with_retry},
    stats::StatsSource,
};

#[derive(Parser)]
#[command(name = "dpstash")]
#[command(about = "Track diamond-painting projects in a portable library file")]
struct Cli {
    /// Library archive (created when missing)
    #[arg(long, value_name = "FILE", default_value = "library.dpstash")]
    library: PathBuf,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "dpstash.toml")]
    config: PathBuf,

    /// User the command acts for
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),
    /// Manage companies
    #[command(subcommand)]
    Company(NamedCommand),
    /// Manage artists
    #[command(subcommand)]
    Artist(NamedCommand),
    /// Progress notes of a project
    #[command(subcommand)]
    Note(NoteCommand),
    /// Yearly statistics
    Stats {
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
        /// Drop the cached aggregate first
        #[arg(long)]
        refresh: bool,
    },
    /// Show the dashboard, applying and saving filter changes
    Dashboard(DashboardArgs),
    /// Import projects from a CSV file
    Import {
        file: PathBuf,
        /// Validate only, write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Write an import template CSV
    Template {
        /// Print to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pick a random project to work on
    Randomize {
        /// Candidate project ids; defaults to every project in progress
        #[arg(long = "project")]
        projects: Vec<i64>,
        /// Show recent spins instead of spinning
        #[arg(long)]
        history: bool,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    Add { username: String },
    List,
}

#[derive(Subcommand)]
enum ProjectCommand {
    Add(ProjectArgs),
    List(ListArgs),
    Show { id: i64 },
    /// Change status; milestone dates fill in automatically
    Status { id: i64, status: ProjectStatus },
    Delete { id: i64 },
}

#[derive(Args)]
struct ProjectArgs {
    title: String,
    #[arg(long, default_value = "wishlist")]
    status: ProjectStatus,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    diamonds: Option<u64>,
    #[arg(long)]
    kit: Option<KitCategory>,
    #[arg(long)]
    shape: Option<DrillShape>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long, default_value = "")]
    notes: String,
    /// Tag names, created when missing
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    status: Option<ProjectStatus>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 25)]
    page_size: u32,
}

#[derive(Subcommand)]
enum TagCommand {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    List,
    Delete { name: String },
}

#[derive(Subcommand)]
enum NamedCommand {
    Add { name: String },
    List,
    Delete { name: String },
}

#[derive(Subcommand)]
enum NoteCommand {
    Add {
        project: i64,
        content: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    List { project: i64 },
}

#[derive(Args)]
struct DashboardArgs {
    /// Status filter, or "all"
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    asc: bool,
    #[arg(long)]
    view: Option<String>,
    /// Clear every filter
    #[arg(long)]
    reset: bool,
}

fn parse_serde_name<T: serde::de::DeserializeOwned>(field: &'static str, raw: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| LibraryError::validation(field, format!("unknown value '{}'", raw)).into())
}

fn print_project(project: &Project) {
    println!(
        "#{:<5} {:<32} {:<10} {:<20} {}",
        project.id,
        project.title,
        project.status,
        project.company_name.as_deref().unwrap_or("-"),
        project
            .total_diamonds
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into())
    );
}

async fn user_db(db: &LibraryDb, user: &Option<String>) -> anyhow::Result<UserDb> {
    let name = user
        .as_deref()
        .context("This command needs --user <NAME>")?;
    let user = db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| LibraryError::not_found("user", name))?;
    db.get_user_repo(user.id).await
}

async fn project_by_id(db: &UserDb, id: i64) -> anyhow::Result<Project> {
    Ok(db
        .get_project_by_id(id)
        .await?
        .ok_or_else(|| LibraryError::not_found("project", id))?)
}


async fn run_project(
    command: ProjectCommand,
    db: &UserDb,
    stats: &YearlyStatsService<LibraryDb>,
    retry: RetryPolicy,
) -> anyhow::Result<()> {
    match command {
        ProjectCommand::Add(args) => {
            let company_id = match &args.company {
                Some(name) => Some(match db.get_company_by_name(name).await? {
                    Some(company) => company.id,
                    None => {
                        db.add_company(&NewCompany {
                            name: name.clone(),
                            website: None,
                        })
                        .await?
                        .id
                    }
                }),
                None => None,
            };
            let artist_id = match &args.artist {
                Some(name) => Some(match db.get_artist_by_name(name).await? {
                    Some(artist) => artist.id,
                    None => db.add_artist(name).await?.id,
                }),
                None => None,
            };
            let mut tag_ids = Vec::new();
            for name in &args.tags {
                let tag = match db.get_tag_by_name(name).await? {
                    Some(tag) => tag,
                    None => {
                        db.add_tag(&NewTag {
                            name: name.clone(),
                            color: None,
                        })
                        .await?
                    }
                };
                tag_ids.push(tag.id);
            }
            let project = db
                .add_project(&NewProject {
                    title: args.title,
                    status: args.status,
                    company_id,
                    artist_id,
                    width: args.width,
                    height: args.height,
                    total_diamonds: args.diamonds,
                    kit_category: args.kit,
                    drill_shape: args.shape,
                    source_url: args.url,
                    general_notes: args.notes,
                    tag_ids,
                    ..Default::default()
                })
                .await?;
            stats.invalidate_user(db.user_id()).await;
            println!("Added project #{} \"{}\"", project.id, project.title);
        }
        ProjectCommand::List(args) => {
            let query = ProjectQuery {
                status: args.status,
                search: args.search,
                page: args.page,
                page_size: args.page_size,
                ..Default::default()
            };
            let page = with_retry(retry, "list projects", || db.list_projects(&query)).await?;
            for project in &page.items {
                print_project(project);
            }
            println!(
                "Page {}/{} ({} projects)",
                page.page,
                page.total_pages.max(1),
                page.total_items
            );
        }
        ProjectCommand::Show { id } => {
            let project = project_by_id(db, id).await?;
            print_project(&project);
            let tags = db.get_project_tags(&project).await?;
            if !tags.is_empty() {
                let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
                println!("  tags: {}", names.join(", "));
            }
            for (label, date) in [
                ("purchased", project.date_purchased),
                ("received", project.date_received),
                ("started", project.date_started),
                ("completed", project.date_completed),
            ] {
                if let Some(date) = date {
                    println!("  {:<10} {}", label, format_date(date));
                }
            }
            if !project.general_notes.is_empty() {
                println!("  {}", project.general_notes);
            }
        }
        ProjectCommand::Status { id, status } => {
            let before = project_by_id(db, id).await?;
            let project = db.update_status(&before, status).await?;
            stats.invalidate_user(db.user_id()).await;
            println!("#{} is now {}", project.id, project.status);
        }
        ProjectCommand::Delete { id } => {
            let project = project_by_id(db, id).await?;
            let contribution = project.contribution();
            let title = project.title.clone();
            db.delete_project(project).await?;
            stats
                .apply_project_deletion_to_user(db.user_id(), today().year(), &contribution)
                .await;
            println!("Deleted #{} \"{}\"", id, title);
        }
    }
    Ok(())
}

async fn run_dashboard(args: DashboardArgs, db: &UserDb, config: &Config) -> anyhow::Result<()> {
    let mut session = DashboardSession::mount(db.clone(), &config.dashboard).await;
    if args.reset {
        session.update(|s| s.reset());
    }
    if let Some(raw) = &args.status {
        let status = match raw.as_str() {
            "all" => None,
            other => Some(other.parse::<ProjectStatus>()?),
        };
        session.update(|s| s.update_status(status));
    }
    if let Some(term) = args.search {
        session.update(|s| s.update_search(term));
    }
    if let Some(raw) = &args.sort {
        let field: SortField = parse_serde_name("sort", raw)?;
        let direction = if args.asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        session.update(|s| s.update_sort(field, direction));
    }
    if let Some(raw) = &args.view {
        let view: ViewType = parse_serde_name("view", raw)?;
        session.update(|s| s.update_view_type(view));
    }
    if let Some(size) = args.page_size {
        session.update(|s| s.set_page_size(size));
    }
    if let Some(page) = args.page {
        session.update(|s| s.set_page(page));
    }
    session.flush().await?;

    let filters = session.filters().clone();
    let retry = config.retry_policy();
    let counts = with_retry(retry, "status counts", || db.status_counts()).await?;
    let tabs: Vec<String> = filters
        .status_tab_counts(&counts)
        .iter()
        .map(|tab| {
            let marker = if tab.active { "*" } else { "" };
            format!("{}{} ({})", marker, tab.label(), tab.count)
        })
        .collect();
    println!("{}", tabs.join("  "));
    println!("Active filters: {}", filters.active_filter_count());

    let query = filters.to_query();
    let page = with_retry(retry, "list projects", || db.list_projects(&query)).await?;
    for project in &page.items {
        print_project(project);
    }
    println!(
        "Page {}/{} ({} projects, {:?} view)",
        page.page,
        page.total_pages.max(1),
        page.total_items,
        filters.view_type
    );
    Ok(())
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let db = LibraryDb::new(&cli.library).await?;
    let stats = YearlyStatsService::new(db.clone(), config.stats.clone(), config.retry_policy())?;

    match cli.command {
        Command::User(UserCommand::Add { username }) => {
            let user = db.add_user(&username).await?;
            println!("Added user {} ({})", username, user.user_id());
        }
        Command::User(UserCommand::List) => {
            for user in db.get_users().await? {
                println!("{}  {}", user.id, user.username);
            }
        }
        Command::Project(command) => {
            let user_db = user_db(&db, &cli.user).await?;
            run_project(command, &user_db, &stats, config.retry_policy()).await?;
        }
        Command::Tag(command) => {
            let user_db = user_db(&db, &cli.user).await?;
            match command {
                TagCommand::Add { name, color } => {
                    let tag = user_db.add_tag(&NewTag { name, color }).await?;
                    println!("Added tag {} ({}, {})", tag.name, tag.slug, tag.color);
                }
                TagCommand::List => {
                    for tag in user_db.get_tags().await? {
                        println!("{:<24} {:<24} {} {:>4}", tag.name, tag.slug, tag.color, tag.project_count);
                    }
                }
                TagCommand::Delete { name } => {
                    let tag = user_db
                        .get_tag_by_name(&name)
                        .await?
                        .ok_or_else(|| LibraryError::not_found("tag", &name))?;
                    user_db.delete_tag(tag).await?;
                    println!("Deleted tag {}", name);
                }
            }
        }
        Command::Company(command) => {
            let user_db = user_db(&db, &cli.user).await?;
            match command {
                NamedCommand::Add { name } => {
                    let company = user_db
                        .add_company(&NewCompany {
                            name,
                            website: None,
                        })
                        .await?;
                    println!("Added company {}", company.name);
                }
                NamedCommand::List => {
                    for company in user_db.get_companies().await? {
                        println!("{:<32} {:>4}", company.name, company.project_count);
                    }
                }
                NamedCommand::Delete { name } => {
                    let company = user_db
                        .get_company_by_name(&name)
                        .await?
                        .ok_or_else(|| LibraryError::not_found("company", &name))?;
                    user_db.delete_company(company).await?;
                    println!("Deleted company {}", name);
                }
            }
        }
        Command::Artist(command) => {
            let user_db = user_db(&db, &cli.user).await?;
            match command {
                NamedCommand::Add { name } => {
                    let artist = user_db.add_artist(&name).await?;
                    println!("Added artist {}", artist.name);
                }
                NamedCommand::List => {
                    for artist in user_db.get_artists().await? {
                        println!("{:<32} {:>4}", artist.name, artist.project_count);
                    }
                }
                NamedCommand::Delete { name } => {
                    let artist = user_db
                        .get_artist_by_name(&name)
                        .await?
                        .ok_or_else(|| LibraryError::not_found("artist", &name))?;
                    user_db.delete_artist(artist).await?;
                    println!("Deleted artist {}", name);
                }
            }
        }
        Command::Note(command) => {
            let user_db = user_db(&db, &cli.user).await?;
            match command {
                NoteCommand::Add {
                    project,
                    content,
                    date,
                    image,
                } => {
                    let project = project_by_id(&user_db, project).await?;
                    let date = match date {
                        Some(raw) => parse_date(&raw)?,
                        None => today(),
                    };
                    let note = user_db
                        .add_note(
                            &project,
                            &NewProgressNote {
                                date,
                                content,
                                image_path: image,
                            },
                        )
                        .await?;
                    println!("Added note #{} to \"{}\"", note.id, project.title);
                }
                NoteCommand::List { project } => {
                    let project = project_by_id(&user_db, project).await?;
                    for note in user_db.get_notes(&project).await? {
                        let image = if note.image_fname.is_some() { " [image]" } else { "" };
                        println!("{}  {}{}", format_date(note.date), note.content, image);
                    }
                }
            }
        }
        Command::Stats { year, refresh } => {
            let user_db = user_db(&db, &cli.user).await?;
            let year = year.unwrap_or_else(|| today().year());
            if refresh {
                stats.invalidate(user_db.user_id(), year).await;
            }
            let result = stats.get_yearly_stats(user_db.user_id(), year).await;
            if result.source == StatsSource::Fallback {
                eprintln!("Warning: statistics could not be recalculated, showing fallback data");
            }
            println!("{}", serde_json::to_string_pretty(&result.stats)?);
            match result.last_calculated {
                Some(at) => println!("source: {:?}, calculated {}", result.source, at),
                None => println!("source: {:?}, never calculated", result.source),
            }
        }
        Command::Dashboard(args) => {
            let user_db = user_db(&db, &cli.user).await?;
            run_dashboard(args, &user_db, &config).await?;
        }
        Command::Import { file, dry_run } => {
            let user_db = user_db(&db, &cli.user).await?;
            let reader = File::open(&file).with_context(|| format!("Failed to open {:?}", file))?;
            let report = import_csv(&user_db, reader, ImportOptions { dry_run }).await?;
            if !report.project_ids.is_empty() {
                stats.invalidate_user(user_db.user_id()).await;
            }
            for duplicate in &report.analysis.duplicates {
                println!(
                    "Column \"{}\" ignored: {} already read from column {}",
                    duplicate.header,
                    duplicate.field,
                    duplicate.chosen_column + 1
                );
            }
            for error in &report.errors {
                println!("line {}: {}", error.line, error.message);
            }
            println!(
                "{} {} of {} rows ({} skipped, {} errors); created {} companies, {} artists, {} tags",
                if dry_run { "Would import" } else { "Imported" },
                report.imported,
                report.rows_read,
                report.skipped,
                report.errors.len(),
                report.created_companies,
                report.created_artists,
                report.created_tags
            );
        }
        Command::Template { output } => {
            let csv = template_csv()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv).with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Template written to {:?}", path);
                }
                None => print!("{}", csv),
            }
        }
        Command::Randomize { projects, history } => {
            let user_db = user_db(&db, &cli.user).await?;
            if history {
                for spin in user_db.spin_history(20).await? {
                    println!(
                        "{}  {} (out of {})",
                        format_date(spin.spun_at.date()),
                        spin.project_title,
                        spin.candidate_count
                    );
                }
            } else {
                let pool = if projects.is_empty() {
                    CandidatePool::InProgress
                } else {
                    CandidatePool::Projects(projects)
                };
                match randomizer::spin(&user_db, &pool).await? {
                    Some(outcome) => println!(
                        "Work on #{} \"{}\" (picked from {})",
                        outcome.winner.id, outcome.winner.title, outcome.candidate_count
                    ),
                    None => println!("No candidate projects."),
                }
            }
        }
    }

    stats.shutdown();
    db.save_library().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = Config::load(&cli.config)?;
    run(cli, config).await
}
