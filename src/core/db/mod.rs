mod artist;
mod company;
mod model;
mod progress_note;
mod project;
mod settings;
mod spin;
mod state;
mod tag;
mod user;
mod yearly_stats;

use std::{path::Path, sync::Arc};

use sqlx::{Connection, QueryBuilder, Row, Sqlite, SqliteConnection, sqlite::SqliteRow};
use state::LibraryState;
use time::Date;
use uuid::Uuid;

use crate::{error::LibraryError, slug};

pub use artist::{Artist, ArtistRepository};
pub use company::{Company, CompanyRepository, CompanyUpdate, NewCompany};
pub use model::{
    DrillShape, KitCategory, Page, ProjectStatus, StatusCounts, format_date, now_utc, parse_date,
    today,
};
pub use progress_note::{NewProgressNote, ProgressNote, ProgressNoteRepository, ProgressNoteUpdate};
pub use project::{
    NewProject, Project, ProjectContribution, ProjectQuery, ProjectRepository, ProjectUpdate,
    SortDirection, SortField,
};
pub use settings::DashboardSettingsRepository;
pub use spin::{RandomizerSpin, SpinRepository};
pub use tag::{NewTag, Tag, TagRepository, TagUpdate};
pub use user::{User, UserRepository};
pub use yearly_stats::{CachedYearlyStats, YearlyStatsRepository};

use model::{format_timestamp, parse_optional_date, parse_timestamp};

const MAX_PAGE_SIZE: u32 = 500;

/// An open library archive. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LibraryDb {
    state: Arc<LibraryState>,
}

impl LibraryDb {
    pub async fn new<P: AsRef<Path>>(library_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(LibraryState::new(library_file).await?),
        })
    }

    /// Explicitly save the library to disk.
    /// Required inside an async context, where drop cannot block on the save.
    pub async fn save_library(&self) -> anyhow::Result<()> {
        self.state.save_library().await
    }

    /// Bind to a user id without checking that it exists.
    pub(crate) fn bind_user(&self, user_id: Uuid) -> UserDb {
        UserDb {
            state: self.state.clone(),
            user_id,
        }
    }
}

/// Repositories scoped to a single user's records.
#[derive(Debug, Clone)]
pub struct UserDb {
    state: Arc<LibraryState>,
    user_id: Uuid,
}

impl UserDb {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn owner(&self) -> String {
        self.user_id.to_string()
    }

    pub async fn get_user(&self) -> anyhow::Result<User> {
        let mut conn = self.state.conn().await?;
        let row = sqlx::query("SELECT id, username, created_at FROM app_user WHERE id = $1")
            .bind(self.owner())
            .fetch_optional(&mut **conn)
            .await?
            .ok_or_else(|| LibraryError::not_found("user", self.user_id))?;
        user_from_row(&row)
    }

    fn ensure_project_owned(&self, project: &Project) -> anyhow::Result<()> {
        if project.user_id != self.user_id {
            return Err(LibraryError::forbidden("project", project.id).into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: Uuid::parse_str(row.try_get::<&str, _>("id")?)?,
        username: row.try_get("username")?,
        created_at: parse_timestamp(row.try_get::<&str, _>("created_at")?)?,
        _guard: (),
    })
}

const PROJECT_SELECT: &str = r#"SELECT
    p.id, p.user_id, p.title, p.status,
    p.company_id, c.name AS company_name,
    p.artist_id, a.name AS artist_name,
    p.width, p.height, p.total_diamonds, p.kit_category, p.drill_shape,
    p.source_url, p.general_notes,
    p.date_purchased, p.date_received, p.date_started, p.date_completed,
    p.created_at, p.updated_at
FROM project p
LEFT JOIN company c ON p.company_id = c.id
LEFT JOIN artist a ON p.artist_id = a.id"#;

fn opt_u32(row: &SqliteRow, col: &str) -> anyhow::Result<Option<u32>> {
    Ok(row
        .try_get::<Option<i64>, _>(col)?
        .map(u32::try_from)
        .transpose()?)
}

fn opt_u64(row: &SqliteRow, col: &str) -> anyhow::Result<Option<u64>> {
    Ok(row
        .try_get::<Option<i64>, _>(col)?
        .map(u64::try_from)
        .transpose()?)
}

fn opt_date(row: &SqliteRow, col: &str) -> anyhow::Result<Option<Date>> {
    parse_optional_date(row.try_get(col)?)
}

fn db_u64(value: Option<u64>) -> anyhow::Result<Option<i64>> {
    Ok(value.map(i64::try_from).transpose()?)
}

fn project_from_row(row: &SqliteRow) -> anyhow::Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        user_id: Uuid::parse_str(row.try_get::<&str, _>("user_id")?)?,
        title: row.try_get("title")?,
        status: ProjectStatus::try_from(row.try_get::<i64, _>("status")?)?,
        company_id: row.try_get("company_id")?,
        company_name: row.try_get("company_name")?,
        artist_id: row.try_get("artist_id")?,
        artist_name: row.try_get("artist_name")?,
        width: opt_u32(row, "width")?,
        height: opt_u32(row, "height")?,
        total_diamonds: opt_u64(row, "total_diamonds")?,
        kit_category: row
            .try_get::<Option<String>, _>("kit_category")?
            .map(|s| s.parse::<KitCategory>())
            .transpose()?,
        drill_shape: row
            .try_get::<Option<String>, _>("drill_shape")?
            .map(|s| s.parse::<DrillShape>())
            .transpose()?,
        source_url: row.try_get("source_url")?,
        general_notes: row.try_get("general_notes")?,
        date_purchased: opt_date(row, "date_purchased")?,
        date_received: opt_date(row, "date_received")?,
        date_started: opt_date(row, "date_started")?,
        date_completed: opt_date(row, "date_completed")?,
        created_at: parse_timestamp(row.try_get::<&str, _>("created_at")?)?,
        updated_at: parse_timestamp(row.try_get::<&str, _>("updated_at")?)?,
        _guard: (),
    })
}

fn contribution_from_row(row: &SqliteRow) -> anyhow::Result<ProjectContribution> {
    Ok(ProjectContribution {
        status: ProjectStatus::try_from(row.try_get::<i64, _>("status")?)?,
        total_diamonds: opt_u64(row, "total_diamonds")?,
        date_purchased: opt_date(row, "date_purchased")?,
        date_started: opt_date(row, "date_started")?,
        date_completed: opt_date(row, "date_completed")?,
    })
}

fn company_from_row(row: &SqliteRow) -> anyhow::Result<Company> {
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        project_count: row.try_get::<i64, _>("project_count")?.try_into()?,
        _guard: (),
    })
}

fn artist_from_row(row: &SqliteRow) -> anyhow::Result<Artist> {
    Ok(Artist {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        project_count: row.try_get::<i64, _>("project_count")?.try_into()?,
        _guard: (),
    })
}

fn tag_from_row(row: &SqliteRow) -> anyhow::Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        color: row.try_get("color")?,
        project_count: row.try_get::<i64, _>("project_count")?.try_into()?,
        _guard: (),
    })
}

fn note_from_row(row: &SqliteRow) -> anyhow::Result<ProgressNote> {
    Ok(ProgressNote {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        date: parse_date(row.try_get::<&str, _>("note_date")?)?,
        content: row.try_get("content")?,
        image_fname: row.try_get("image_fname")?,
        _guard: (),
    })
}

fn spin_from_row(row: &SqliteRow) -> anyhow::Result<RandomizerSpin> {
    Ok(RandomizerSpin {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        project_title: row.try_get("project_title")?,
        candidate_count: row.try_get::<i64, _>("candidate_count")?.try_into()?,
        spun_at: parse_timestamp(row.try_get::<&str, _>("spun_at")?)?,
        _guard: (),
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn required_name(field: &'static str, name: &str) -> anyhow::Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::validation(field, "must not be empty").into());
    }
    Ok(name.to_string())
}

/// Checks that `id` in `table` exists and belongs to `owner`.
async fn ensure_owned(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
    owner: &str,
) -> anyhow::Result<()> {
    let sql = format!("SELECT user_id FROM {table} WHERE id = $1");
    let found: Option<String> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        None => Err(LibraryError::not_found(table, id).into()),
        Some(user_id) if user_id != owner => Err(LibraryError::forbidden(table, id).into()),
        Some(_) => Ok(()),
    }
}

/// Case-insensitive name clash within the owner's rows of `table`.
async fn ensure_unique_name(
    conn: &mut SqliteConnection,
    table: &'static str,
    owner: &str,
    name: &str,
    except_id: Option<i64>,
) -> anyhow::Result<()> {
    let sql = format!(
        "SELECT id FROM {table} WHERE user_id = $1 AND name = $2 COLLATE NOCASE AND id != $3"
    );
    let clash: Option<i64> = sqlx::query_scalar(&sql)
        .bind(owner)
        .bind(name)
        .bind(except_id.unwrap_or(-1))
        .fetch_optional(&mut *conn)
        .await?;
    if clash.is_some() {
        return Err(LibraryError::duplicate(table, name).into());
    }
    Ok(())
}

async fn fetch_project(
    conn: &mut SqliteConnection,
    owner: &str,
    id: i64,
) -> anyhow::Result<Option<Project>> {
    let sql = format!("{PROJECT_SELECT} WHERE p.user_id = $1 AND p.id = $2");
    sqlx::query(&sql)
        .bind(owner)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(project_from_row)
        .transpose()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_project_filters(builder: &mut QueryBuilder<'_, Sqlite>, owner: &str, query: &ProjectQuery) {
    builder.push(" WHERE p.user_id = ").push_bind(owner.to_string());
    if let Some(status) = query.status {
        builder.push(" AND p.status = ").push_bind(i64::from(status));
    }
    if let Some(company_id) = query.company_id {
        builder.push(" AND p.company_id = ").push_bind(company_id);
    }
    if let Some(artist_id) = query.artist_id {
        builder.push(" AND p.artist_id = ").push_bind(artist_id);
    }
    if !query.tag_ids.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM project_tag pt WHERE pt.project_id = p.id AND pt.tag_id IN (",
        );
        let mut ids = builder.separated(", ");
        for id in &query.tag_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated("))");
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND p.title LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
}

/// Fill the milestone date that belongs to a status the project just moved into.
fn fill_milestone(
    status: ProjectStatus,
    date_purchased: &mut Option<Date>,
    date_started: &mut Option<Date>,
    date_completed: &mut Option<Date>,
) {
    let slot = match status {
        ProjectStatus::Purchased => date_purchased,
        ProjectStatus::Progress => date_started,
        ProjectStatus::Completed => date_completed,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(today());
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

impl UserRepository for LibraryDb {
    async fn add_user(&self, username: &str) -> anyhow::Result<UserDb> {
        let username = required_name("username", username)?;
        let mut conn = self.state.conn().await?;
        let clash: Option<String> =
            sqlx::query_scalar("SELECT id FROM app_user WHERE username = $1 COLLATE NOCASE")
                .bind(&username)
                .fetch_optional(&mut **conn)
                .await?;
        if clash.is_some() {
            return Err(LibraryError::duplicate("user", username).into());
        }
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO app_user (id, username, created_at) VALUES ($1, $2, $3)")
            .bind(id.to_string())
            .bind(&username)
            .bind(format_timestamp(&now_utc())?)
            .execute(&mut **conn)
            .await?;
        tracing::info!(user_id = %id, %username, "user created");
        Ok(self.bind_user(id))
    }

    async fn get_users(&self) -> anyhow::Result<Vec<User>> {
        let mut conn = self.state.conn().await?;
        sqlx::query("SELECT id, username, created_at FROM app_user ORDER BY username ASC")
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn get_user_by_name(&self, username: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            "SELECT id, username, created_at FROM app_user WHERE username = $1 COLLATE NOCASE",
        )
        .bind(username.trim())
        .fetch_optional(&mut **conn)
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn get_user_repo(&self, id: Uuid) -> anyhow::Result<UserDb> {
        let mut conn = self.state.conn().await?;
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM app_user WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&mut **conn)
            .await?;
        if exists.is_none() {
            return Err(LibraryError::not_found("user", id).into());
        }
        Ok(self.bind_user(id))
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

impl ProjectRepository for UserDb {
    async fn get_projects(&self) -> anyhow::Result<Vec<Project>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{PROJECT_SELECT} WHERE p.user_id = $1 ORDER BY p.id ASC");
        sqlx::query(&sql)
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(project_from_row)
            .collect()
    }

    async fn get_project_by_id(&self, id: i64) -> anyhow::Result<Option<Project>> {
        let mut conn = self.state.conn().await?;
        fetch_project(&mut conn, &self.owner(), id).await
    }

    async fn add_project(&self, project: &NewProject) -> anyhow::Result<Project> {
        let title = required_name("title", &project.title)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        if let Some(company_id) = project.company_id {
            ensure_owned(&mut conn, "company", company_id, &owner).await?;
        }
        if let Some(artist_id) = project.artist_id {
            ensure_owned(&mut conn, "artist", artist_id, &owner).await?;
        }
        for tag_id in &project.tag_ids {
            ensure_owned(&mut conn, "tag", *tag_id, &owner).await?;
        }

        let now = format_timestamp(&now_utc())?;
        let mut tx = conn.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO project (
                user_id, title, status, company_id, artist_id, width, height, total_diamonds,
                kit_category, drill_shape, source_url, general_notes,
                date_purchased, date_received, date_started, date_completed,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            RETURNING id"#,
        )
        .bind(&owner)
        .bind(&title)
        .bind(i64::from(project.status))
        .bind(project.company_id)
        .bind(project.artist_id)
        .bind(project.width.map(i64::from))
        .bind(project.height.map(i64::from))
        .bind(db_u64(project.total_diamonds)?)
        .bind(project.kit_category.map(|k| k.as_str()))
        .bind(project.drill_shape.map(|d| d.as_str()))
        .bind(project.source_url.as_deref())
        .bind(&project.general_notes)
        .bind(project.date_purchased.map(format_date))
        .bind(project.date_received.map(format_date))
        .bind(project.date_started.map(format_date))
        .bind(project.date_completed.map(format_date))
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;
        for tag_id in &project.tag_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO project_tag (project_id, tag_id, user_id) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(*tag_id)
            .bind(&owner)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::debug!(project_id = id, %title, "project created");

        fetch_project(&mut conn, &owner, id)
            .await?
            .ok_or_else(|| LibraryError::not_found("project", id).into())
    }

    async fn update_project(
        &self,
        project: &Project,
        update: &ProjectUpdate,
    ) -> anyhow::Result<Project> {
        self.ensure_project_owned(project)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        let current = fetch_project(&mut conn, &owner, project.id)
            .await?
            .ok_or_else(|| LibraryError::not_found("project", project.id))?;

        let title = match &update.title {
            Some(title) => required_name("title", title)?,
            None => current.title.clone(),
        };
        let status = update.status.unwrap_or(current.status);
        let company_id = update.company_id.unwrap_or(current.company_id);
        let artist_id = update.artist_id.unwrap_or(current.artist_id);
        if let Some(company_id) = company_id.filter(|id| Some(*id) != current.company_id) {
            ensure_owned(&mut conn, "company", company_id, &owner).await?;
        }
        if let Some(artist_id) = artist_id.filter(|id| Some(*id) != current.artist_id) {
            ensure_owned(&mut conn, "artist", artist_id, &owner).await?;
        }
        let mut date_purchased = update.date_purchased.unwrap_or(current.date_purchased);
        let date_received = update.date_received.unwrap_or(current.date_received);
        let mut date_started = update.date_started.unwrap_or(current.date_started);
        let mut date_completed = update.date_completed.unwrap_or(current.date_completed);
        if status != current.status {
            fill_milestone(status, &mut date_purchased, &mut date_started, &mut date_completed);
        }

        sqlx::query(
            r#"UPDATE project SET
                title = $1, status = $2, company_id = $3, artist_id = $4,
                width = $5, height = $6, total_diamonds = $7,
                kit_category = $8, drill_shape = $9, source_url = $10, general_notes = $11,
                date_purchased = $12, date_received = $13, date_started = $14, date_completed = $15,
                updated_at = $16
            WHERE id = $17 AND user_id = $18"#,
        )
        .bind(&title)
        .bind(i64::from(status))
        .bind(company_id)
        .bind(artist_id)
        .bind(update.width.unwrap_or(current.width).map(i64::from))
        .bind(update.height.unwrap_or(current.height).map(i64::from))
        .bind(db_u64(update.total_diamonds.unwrap_or(current.total_diamonds))?)
        .bind(update.kit_category.unwrap_or(current.kit_category).map(|k| k.as_str()))
        .bind(update.drill_shape.unwrap_or(current.drill_shape).map(|d| d.as_str()))
        .bind(update.source_url.clone().unwrap_or(current.source_url.clone()))
        .bind(update.general_notes.as_ref().unwrap_or(&current.general_notes))
        .bind(date_purchased.map(format_date))
        .bind(date_received.map(format_date))
        .bind(date_started.map(format_date))
        .bind(date_completed.map(format_date))
        .bind(format_timestamp(&now_utc())?)
        .bind(project.id)
        .bind(&owner)
        .execute(&mut **conn)
        .await?;

        fetch_project(&mut conn, &owner, project.id)
            .await?
            .ok_or_else(|| LibraryError::not_found("project", project.id).into())
    }

    async fn update_status(
        &self,
        project: &Project,
        status: ProjectStatus,
    ) -> anyhow::Result<Project> {
        let update = ProjectUpdate {
            status: Some(status),
            ..Default::default()
        };
        let updated = self.update_project(project, &update).await?;
        tracing::info!(project_id = project.id, from = %project.status, to = %status, "status changed");
        Ok(updated)
    }

    async fn delete_project(&self, project: Project) -> anyhow::Result<()> {
        self.ensure_project_owned(&project)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        let images: Vec<String> = sqlx::query_scalar(
            "SELECT image_fname FROM progress_note WHERE project_id = $1 AND image_fname IS NOT NULL",
        )
        .bind(project.id)
        .fetch_all(&mut *tx)
        .await?;
        // Notes and tag links go with the project through ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM project WHERE id = $1 AND user_id = $2")
            .bind(project.id)
            .bind(&owner)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(LibraryError::not_found("project", project.id).into());
        }
        tx.commit().await?;
        drop(conn);

        for fname in images {
            if let Err(e) = self.state.delete_image(&fname).await {
                tracing::warn!(project_id = project.id, error = %e, "orphaned note image");
            }
        }
        tracing::info!(project_id = project.id, "project deleted");
        Ok(())
    }

    async fn list_projects(&self, query: &ProjectQuery) -> anyhow::Result<Page<Project>> {
        let owner = self.owner();
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut conn = self.state.conn().await?;

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM project p \
             LEFT JOIN company c ON p.company_id = c.id \
             LEFT JOIN artist a ON p.artist_id = a.id",
        );
        push_project_filters(&mut count, &owner, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut **conn)
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(PROJECT_SELECT);
        push_project_filters(&mut select, &owner, query);
        let direction = query.sort_direction.keyword();
        select.push(format!(
            " ORDER BY {} {} NULLS LAST, p.id {}",
            query.sort_field.column(),
            direction,
            direction
        ));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(page_size));
        let items = select
            .build()
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(project_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Page::new(items, page, page_size, u64::try_from(total)?))
    }

    async fn status_counts(&self) -> anyhow::Result<StatusCounts> {
        let mut conn = self.state.conn().await?;
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM project WHERE user_id = $1 GROUP BY status",
        )
        .bind(self.owner())
        .fetch_all(&mut **conn)
        .await?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let status = ProjectStatus::try_from(row.try_get::<i64, _>("status")?)?;
            counts.add(status, row.try_get::<i64, _>("n")?.try_into()?);
        }
        Ok(counts)
    }

    async fn contributions_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Page<ProjectContribution>> {
        let owner = self.owner();
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let mut conn = self.state.conn().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM project WHERE user_id = $1")
            .bind(&owner)
            .fetch_one(&mut **conn)
            .await?;
        let items = sqlx::query(
            r#"SELECT status, total_diamonds, date_purchased, date_started, date_completed
            FROM project WHERE user_id = $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3"#,
        )
        .bind(&owner)
        .bind(i64::from(page_size))
        .bind(i64::from(page - 1) * i64::from(page_size))
        .fetch_all(&mut **conn)
        .await?
        .iter()
        .map(contribution_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Page::new(items, page, page_size, u64::try_from(total)?))
    }
}

// ---------------------------------------------------------------------------
// Companies & artists
// ---------------------------------------------------------------------------

const COMPANY_SELECT: &str = r#"SELECT c.id, c.name, c.website,
    (SELECT COUNT(*) FROM project p WHERE p.company_id = c.id) AS project_count
FROM company c"#;

const ARTIST_SELECT: &str = r#"SELECT a.id, a.name,
    (SELECT COUNT(*) FROM project p WHERE p.artist_id = a.id) AS project_count
FROM artist a"#;

impl CompanyRepository for UserDb {
    async fn get_companies(&self) -> anyhow::Result<Vec<Company>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{COMPANY_SELECT} WHERE c.user_id = $1 ORDER BY c.name COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(company_from_row)
            .collect()
    }

    async fn get_company_by_id(&self, id: i64) -> anyhow::Result<Option<Company>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{COMPANY_SELECT} WHERE c.user_id = $1 AND c.id = $2");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(id)
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(company_from_row)
            .transpose()
    }

    async fn get_company_by_name(&self, name: &str) -> anyhow::Result<Option<Company>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{COMPANY_SELECT} WHERE c.user_id = $1 AND c.name = $2 COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(name.trim())
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(company_from_row)
            .transpose()
    }

    async fn add_company(&self, company: &NewCompany) -> anyhow::Result<Company> {
        let name = required_name("name", &company.name)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        ensure_unique_name(&mut conn, "company", &owner, &name, None).await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO company (user_id, name, website) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&owner)
        .bind(&name)
        .bind(company.website.as_deref())
        .fetch_one(&mut **conn)
        .await?;
        Ok(Company {
            id,
            name,
            website: company.website.clone(),
            project_count: 0,
            _guard: (),
        })
    }

    async fn update_company(
        &self,
        company: &Company,
        update: &CompanyUpdate,
    ) -> anyhow::Result<Company> {
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        let name = match &update.name {
            Some(name) => {
                let name = required_name("name", name)?;
                ensure_unique_name(&mut conn, "company", &owner, &name, Some(company.id)).await?;
                Some(name)
            }
            None => None,
        };
        let website = update.website.clone().unwrap_or(company.website.clone());
        let changed = sqlx::query(
            "UPDATE company SET name = COALESCE($1, name), website = $2 WHERE id = $3 AND user_id = $4",
        )
        .bind(name)
        .bind(website)
        .bind(company.id)
        .bind(&owner)
        .execute(&mut **conn)
        .await?
        .rows_affected();
        if changed == 0 {
            return Err(LibraryError::not_found("company", company.id).into());
        }
        let sql = format!("{COMPANY_SELECT} WHERE c.id = $1");
        let row = sqlx::query(&sql)
            .bind(company.id)
            .fetch_one(&mut **conn)
            .await?;
        company_from_row(&row)
    }

    async fn delete_company(&self, company: Company) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM company WHERE id = $1 AND user_id = $2")
            .bind(company.id)
            .bind(self.owner())
            .execute(&mut **conn)
            .await?;
        Ok(())
    }
}

impl ArtistRepository for UserDb {
    async fn get_artists(&self) -> anyhow::Result<Vec<Artist>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{ARTIST_SELECT} WHERE a.user_id = $1 ORDER BY a.name COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(artist_from_row)
            .collect()
    }

    async fn get_artist_by_id(&self, id: i64) -> anyhow::Result<Option<Artist>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{ARTIST_SELECT} WHERE a.user_id = $1 AND a.id = $2");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(id)
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(artist_from_row)
            .transpose()
    }

    async fn get_artist_by_name(&self, name: &str) -> anyhow::Result<Option<Artist>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{ARTIST_SELECT} WHERE a.user_id = $1 AND a.name = $2 COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(name.trim())
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(artist_from_row)
            .transpose()
    }

    async fn add_artist(&self, name: &str) -> anyhow::Result<Artist> {
        let name = required_name("name", name)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        ensure_unique_name(&mut conn, "artist", &owner, &name, None).await?;
        let id: i64 =
            sqlx::query_scalar("INSERT INTO artist (user_id, name) VALUES ($1, $2) RETURNING id")
                .bind(&owner)
                .bind(&name)
                .fetch_one(&mut **conn)
                .await?;
        Ok(Artist {
            id,
            name,
            project_count: 0,
            _guard: (),
        })
    }

    async fn rename_artist(&self, artist: &Artist, name: &str) -> anyhow::Result<Artist> {
        let name = required_name("name", name)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        ensure_unique_name(&mut conn, "artist", &owner, &name, Some(artist.id)).await?;
        let changed = sqlx::query("UPDATE artist SET name = $1 WHERE id = $2 AND user_id = $3")
            .bind(&name)
            .bind(artist.id)
            .bind(&owner)
            .execute(&mut **conn)
            .await?
            .rows_affected();
        if changed == 0 {
            return Err(LibraryError::not_found("artist", artist.id).into());
        }
        Ok(Artist {
            name,
            ..artist.clone()
        })
    }

    async fn delete_artist(&self, artist: Artist) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM artist WHERE id = $1 AND user_id = $2")
            .bind(artist.id)
            .bind(self.owner())
            .execute(&mut **conn)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

const TAG_SELECT: &str = r#"SELECT t.id, t.name, t.slug, t.color,
    (SELECT COUNT(*) FROM project_tag pt WHERE pt.tag_id = t.id) AS project_count
FROM tag t"#;

fn tag_color(color: Option<&str>) -> anyhow::Result<String> {
    match color {
        Some(color) if slug::is_valid_color(color) => Ok(color.to_lowercase()),
        Some(color) => Err(LibraryError::validation(
            "color",
            format!("expected #rrggbb, got '{}'", color),
        )
        .into()),
        None => Ok(slug::random_tag_color()),
    }
}

fn tag_slug(name: &str) -> anyhow::Result<String> {
    let slug = slug::slugify(name);
    if slug.is_empty() {
        return Err(LibraryError::validation("name", "needs at least one letter or digit").into());
    }
    Ok(slug)
}

impl TagRepository for UserDb {
    async fn get_tags(&self) -> anyhow::Result<Vec<Tag>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{TAG_SELECT} WHERE t.user_id = $1 ORDER BY t.name COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(tag_from_row)
            .collect()
    }

    async fn get_tag_by_id(&self, id: i64) -> anyhow::Result<Option<Tag>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{TAG_SELECT} WHERE t.user_id = $1 AND t.id = $2");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(id)
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(tag_from_row)
            .transpose()
    }

    async fn get_tag_by_name(&self, name: &str) -> anyhow::Result<Option<Tag>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("{TAG_SELECT} WHERE t.user_id = $1 AND t.name = $2 COLLATE NOCASE");
        sqlx::query(&sql)
            .bind(self.owner())
            .bind(name.trim())
            .fetch_optional(&mut **conn)
            .await?
            .as_ref()
            .map(tag_from_row)
            .transpose()
    }

    async fn add_tag(&self, tag: &NewTag) -> anyhow::Result<Tag> {
        let name = required_name("name", &tag.name)?;
        let slug = tag_slug(&name)?;
        let color = tag_color(tag.color.as_deref())?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        ensure_unique_name(&mut conn, "tag", &owner, &name, None).await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tag (user_id, name, slug, color) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&owner)
        .bind(&name)
        .bind(&slug)
        .bind(&color)
        .fetch_one(&mut **conn)
        .await?;
        Ok(Tag {
            id,
            name,
            slug,
            color,
            project_count: 0,
            _guard: (),
        })
    }

    async fn update_tag(&self, tag: &Tag, update: &TagUpdate) -> anyhow::Result<Tag> {
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        let (name, slug) = match &update.name {
            Some(name) => {
                let name = required_name("name", name)?;
                ensure_unique_name(&mut conn, "tag", &owner, &name, Some(tag.id)).await?;
                let slug = tag_slug(&name)?;
                (name, slug)
            }
            None => (tag.name.clone(), tag.slug.clone()),
        };
        let color = match &update.color {
            Some(color) => tag_color(Some(color.as_str()))?,
            None => tag.color.clone(),
        };
        let changed = sqlx::query(
            "UPDATE tag SET name = $1, slug = $2, color = $3 WHERE id = $4 AND user_id = $5",
        )
        .bind(&name)
        .bind(&slug)
        .bind(&color)
        .bind(tag.id)
        .bind(&owner)
        .execute(&mut **conn)
        .await?
        .rows_affected();
        if changed == 0 {
            return Err(LibraryError::not_found("tag", tag.id).into());
        }
        Ok(Tag {
            name,
            slug,
            color,
            ..tag.clone()
        })
    }

    async fn delete_tag(&self, tag: Tag) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM tag WHERE id = $1 AND user_id = $2")
            .bind(tag.id)
            .bind(self.owner())
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn tag_project(&self, project: &Project, tag: &Tag) -> anyhow::Result<()> {
        self.ensure_project_owned(project)?;
        let mut conn = self.state.conn().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO project_tag (project_id, tag_id, user_id) VALUES ($1, $2, $3)",
        )
        .bind(project.id)
        .bind(tag.id)
        .bind(self.owner())
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn untag_project(&self, project: &Project, tag: &Tag) -> anyhow::Result<()> {
        self.ensure_project_owned(project)?;
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM project_tag WHERE project_id = $1 AND tag_id = $2 AND user_id = $3")
            .bind(project.id)
            .bind(tag.id)
            .bind(self.owner())
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn set_project_tags(&self, project: &Project, tag_ids: &[i64]) -> anyhow::Result<()> {
        self.ensure_project_owned(project)?;
        let owner = self.owner();
        let mut conn = self.state.conn().await?;
        for tag_id in tag_ids {
            ensure_owned(&mut conn, "tag", *tag_id, &owner).await?;
        }
        let mut tx = conn.begin().await?;
        sqlx::query("DELETE FROM project_tag WHERE project_id = $1 AND user_id = $2")
            .bind(project.id)
            .bind(&owner)
            .execute(&mut *tx)
            .await?;
        for tag_id in tag_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO project_tag (project_id, tag_id, user_id) VALUES ($1, $2, $3)",
            )
            .bind(project.id)
            .bind(*tag_id)
            .bind(&owner)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_project_tags(&self, project: &Project) -> anyhow::Result<Vec<Tag>> {
        let mut conn = self.state.conn().await?;
        let sql = format!(
            "{TAG_SELECT} JOIN project_tag j ON j.tag_id = t.id \
             WHERE j.project_id = $1 AND t.user_id = $2 ORDER BY t.name COLLATE NOCASE"
        );
        sqlx::query(&sql)
            .bind(project.id)
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(tag_from_row)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Progress notes
// ---------------------------------------------------------------------------

impl ProgressNoteRepository for UserDb {
    async fn get_notes(&self, project: &Project) -> anyhow::Result<Vec<ProgressNote>> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"SELECT id, project_id, note_date, content, image_fname FROM progress_note
            WHERE project_id = $1 AND user_id = $2
            ORDER BY note_date DESC, id DESC"#,
        )
        .bind(project.id)
        .bind(self.owner())
        .fetch_all(&mut **conn)
        .await?
        .iter()
        .map(note_from_row)
        .collect()
    }

    async fn add_note(
        &self,
        project: &Project,
        note: &NewProgressNote,
    ) -> anyhow::Result<ProgressNote> {
        self.ensure_project_owned(project)?;
        let content = note.content.trim().to_string();
        if content.is_empty() && note.image_path.is_none() {
            return Err(LibraryError::validation("content", "a note needs text or an image").into());
        }
        let image_fname = match &note.image_path {
            Some(path) => Some(self.state.store_image(path).await?),
            None => None,
        };

        let inserted = async {
            let mut conn = self.state.conn().await?;
            let id: i64 = sqlx::query_scalar(
                r#"INSERT INTO progress_note (project_id, user_id, note_date, content, image_fname, created_at)
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"#,
            )
            .bind(project.id)
            .bind(self.owner())
            .bind(format_date(note.date))
            .bind(&content)
            .bind(image_fname.as_deref())
            .bind(format_timestamp(&now_utc())?)
            .fetch_one(&mut **conn)
            .await?;
            anyhow::Ok(id)
        }
        .await;

        match inserted {
            Ok(id) => Ok(ProgressNote {
                id,
                project_id: project.id,
                date: note.date,
                content,
                image_fname,
                _guard: (),
            }),
            Err(e) => {
                if let Some(fname) = &image_fname {
                    if let Err(cleanup) = self.state.delete_image(fname).await {
                        tracing::warn!(error = %cleanup, "failed to remove image of rejected note");
                    }
                }
                Err(e)
            }
        }
    }

    async fn update_note(
        &self,
        note: &ProgressNote,
        update: &ProgressNoteUpdate,
    ) -> anyhow::Result<ProgressNote> {
        let date = update.date.unwrap_or(note.date);
        let content = update
            .content
            .as_deref()
            .map(str::trim)
            .unwrap_or(&note.content)
            .to_string();
        let mut conn = self.state.conn().await?;
        let changed = sqlx::query(
            "UPDATE progress_note SET note_date = $1, content = $2 WHERE id = $3 AND user_id = $4",
        )
        .bind(format_date(date))
        .bind(&content)
        .bind(note.id)
        .bind(self.owner())
        .execute(&mut **conn)
        .await?
        .rows_affected();
        if changed == 0 {
            return Err(LibraryError::not_found("progress note", note.id).into());
        }
        Ok(ProgressNote {
            date,
            content,
            ..note.clone()
        })
    }

    async fn delete_note(&self, note: ProgressNote) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM progress_note WHERE id = $1 AND user_id = $2")
            .bind(note.id)
            .bind(self.owner())
            .execute(&mut **conn)
            .await?;
        drop(conn);
        if let Some(fname) = &note.image_fname {
            self.state.delete_image(fname).await?;
        }
        Ok(())
    }

    async fn load_note_image(
        &self,
        note: &ProgressNote,
    ) -> anyhow::Result<Option<image::DynamicImage>> {
        match &note.image_fname {
            Some(fname) => Ok(Some(self.state.load_image(fname).await?)),
            None => Ok(None),
        }
    }

    async fn note_thumbnail(
        &self,
        note: &ProgressNote,
        max_px: u32,
    ) -> anyhow::Result<Option<image::DynamicImage>> {
        let max_px = max_px.max(1);
        Ok(self
            .load_note_image(note)
            .await?
            .map(|img| img.thumbnail(max_px, max_px)))
    }
}

// ---------------------------------------------------------------------------
// Dashboard settings, cached stats, randomizer history
// ---------------------------------------------------------------------------

impl DashboardSettingsRepository for UserDb {
    async fn load_navigation_context(&self) -> anyhow::Result<Option<serde_json::Value>> {
        let mut conn = self.state.conn().await?;
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT navigation_context FROM user_dashboard_settings WHERE user_id = $1",
        )
        .bind(self.owner())
        .fetch_optional(&mut **conn)
        .await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn save_navigation_context(&self, context: &serde_json::Value) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO user_dashboard_settings (user_id, navigation_context, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                navigation_context = EXCLUDED.navigation_context,
                updated_at = EXCLUDED.updated_at"#,
        )
        .bind(self.owner())
        .bind(serde_json::to_string(context)?)
        .bind(format_timestamp(&now_utc())?)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }
}

impl YearlyStatsRepository for UserDb {
    async fn load_yearly_stats(&self, year: i32) -> anyhow::Result<Option<CachedYearlyStats>> {
        let mut conn = self.state.conn().await?;
        let Some(row) = sqlx::query(
            "SELECT payload, last_calculated FROM user_yearly_stats WHERE user_id = $1 AND year = $2",
        )
        .bind(self.owner())
        .bind(year)
        .fetch_optional(&mut **conn)
        .await?
        else {
            return Ok(None);
        };
        let payload: &str = row.try_get("payload")?;
        match serde_json::from_str(payload) {
            Ok(stats) => Ok(Some(CachedYearlyStats {
                stats,
                last_calculated: parse_timestamp(row.try_get::<&str, _>("last_calculated")?)?,
            })),
            Err(e) => {
                // Payloads written by an older layout are treated as absent.
                tracing::warn!(user_id = %self.user_id, year, error = %e, "unreadable cached stats");
                Ok(None)
            }
        }
    }

    async fn store_yearly_stats(
        &self,
        stats: &crate::stats::YearlyStats,
    ) -> anyhow::Result<CachedYearlyStats> {
        let last_calculated = now_utc();
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO user_yearly_stats (user_id, year, payload, last_calculated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, year) DO UPDATE SET
                payload = EXCLUDED.payload,
                last_calculated = EXCLUDED.last_calculated"#,
        )
        .bind(self.owner())
        .bind(stats.year)
        .bind(serde_json::to_string(stats)?)
        .bind(format_timestamp(&last_calculated)?)
        .execute(&mut **conn)
        .await?;
        Ok(CachedYearlyStats {
            stats: stats.clone(),
            last_calculated,
        })
    }

    async fn delete_yearly_stats(&self, year: i32) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM user_yearly_stats WHERE user_id = $1 AND year = $2")
            .bind(self.owner())
            .bind(year)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn cached_stats_years(&self) -> anyhow::Result<Vec<i32>> {
        let mut conn = self.state.conn().await?;
        let rows = sqlx::query("SELECT year FROM user_yearly_stats WHERE user_id = $1 ORDER BY year")
            .bind(self.owner())
            .fetch_all(&mut **conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<i32, _>("year"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn clear_yearly_stats(&self) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let removed = sqlx::query("DELETE FROM user_yearly_stats WHERE user_id = $1")
            .bind(self.owner())
            .execute(&mut **conn)
            .await?
            .rows_affected();
        tracing::debug!(user_id = %self.user_id, removed, "cleared cached stats");
        Ok(())
    }
}

impl SpinRepository for UserDb {
    async fn record_spin(
        &self,
        winner: &Project,
        candidate_count: u32,
    ) -> anyhow::Result<RandomizerSpin> {
        self.ensure_project_owned(winner)?;
        let spun_at = now_utc();
        let mut conn = self.state.conn().await?;
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO randomizer_spin (user_id, project_id, project_title, candidate_count, spun_at)
            VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
        )
        .bind(self.owner())
        .bind(winner.id)
        .bind(&winner.title)
        .bind(i64::from(candidate_count))
        .bind(format_timestamp(&spun_at)?)
        .fetch_one(&mut **conn)
        .await?;
        Ok(RandomizerSpin {
            id,
            project_id: Some(winner.id),
            project_title: winner.title.clone(),
            candidate_count,
            spun_at,
            _guard: (),
        })
    }

    async fn spin_history(&self, limit: u32) -> anyhow::Result<Vec<RandomizerSpin>> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"SELECT id, project_id, project_title, candidate_count, spun_at FROM randomizer_spin
            WHERE user_id = $1 ORDER BY spun_at DESC, id DESC LIMIT $2"#,
        )
        .bind(self.owner())
        .bind(i64::from(limit))
        .fetch_all(&mut **conn)
        .await?
        .iter()
        .map(spin_from_row)
        .collect()
    }
}
