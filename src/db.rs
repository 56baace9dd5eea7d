use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;

use crate::error::ActionError;
use crate::leaderboard::ContributorTotals;
use crate::models::{
    Category, Comment, Issue, IssueId, IssueStats, Location, NewIssue, Priority, Status, User,
    UserId,
};
use crate::upvote::UpvoteState;

const SCHEMA_VERSION: i32 = 1;

const ISSUE_COLUMNS: &str = "i.id, i.title, i.description, i.category, i.status, i.priority, \
     i.address, i.latitude, i.longitude, i.reported_by, u.name, i.created_at, i.updated_at, i.resolved_at";

/// Server-side filters applied before the client pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub reported_by: Option<UserId>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_salt TEXT NOT NULL,
                    password_digest TEXT NOT NULL,
                    is_admin INTEGER NOT NULL DEFAULT 0,
                    avatar TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'open',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    address TEXT NOT NULL,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    reported_by INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    resolved_at TEXT,
                    FOREIGN KEY (reported_by) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS issue_photos (
                    issue_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    PRIMARY KEY (issue_id, position),
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
                );

                -- One row per (issue, user): upvoters are unique by construction
                CREATE TABLE IF NOT EXISTS upvotes (
                    issue_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (issue_id, user_id),
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    issue_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    is_admin INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS comment_photos (
                    comment_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    PRIMARY KEY (comment_id, position),
                    FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
                CREATE INDEX IF NOT EXISTS idx_issues_category ON issues(category);
                CREATE INDEX IF NOT EXISTS idx_issues_reporter ON issues(reported_by);
                CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id);
                CREATE INDEX IF NOT EXISTS idx_upvotes_issue ON upvotes(issue_id);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Users and sessions
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<UserId> {
        let email = email.trim().to_lowercase();
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            [&email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(ActionError::Validation(
                "User with this email already exists".to_string(),
            )
            .into());
        }

        let salt = random_hex(16);
        let digest = password_digest(&salt, password);
        let avatar = format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
            name.trim().replace(' ', "%20")
        );
        self.conn.execute(
            "INSERT INTO users (name, email, password_salt, password_digest, is_admin, avatar, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![name.trim(), email, salt, digest, is_admin, avatar, now_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn has_admin(&self) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE is_admin = 1)",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Returns the user when the email exists and the password matches.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let row: Option<(UserId, String, String)> = self
            .conn
            .query_row(
                "SELECT id, password_salt, password_digest FROM users WHERE email = ?1",
                [email.trim().to_lowercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((id, salt, digest)) if password_digest(&salt, password) == digest => {
                self.get_user(id)
            }
            _ => Ok(None),
        }
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, is_admin, avatar, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn create_session(&self, user_id: UserId) -> Result<String> {
        let token = random_hex(32);
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, now_str()],
        )?;
        Ok(token)
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.name, u.email, u.is_admin, u.avatar, u.created_at FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?1",
                [token],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        Ok(rows > 0)
    }

    // Issue CRUD
    pub fn create_issue(&self, issue: &NewIssue, reporter: UserId) -> Result<IssueId> {
        let now = now_str();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO issues (title, description, category, status, priority, address, latitude, longitude, reported_by, created_at, updated_at) VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                issue.title,
                issue.description,
                issue.category.as_str(),
                issue.priority.as_str(),
                issue.location.address,
                issue.location.latitude,
                issue.location.longitude,
                reporter,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        for (position, url) in issue.photos.iter().enumerate() {
            tx.execute(
                "INSERT INTO issue_photos (issue_id, position, url) VALUES (?1, ?2, ?3)",
                params![id, position as i64, url],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn get_issue(&self, id: IssueId) -> Result<Option<Issue>> {
        let sql = format!(
            "SELECT {} FROM issues i JOIN users u ON u.id = i.reported_by WHERE i.id = ?1",
            ISSUE_COLUMNS
        );
        let issue = self
            .conn
            .query_row(&sql, [id], issue_from_row)
            .optional()?;

        match issue {
            Some(mut issue) => {
                self.attach_relations(&mut issue)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    /// Issues matching `query`, newest first.
    pub fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        let mut sql = format!(
            "SELECT {} FROM issues i JOIN users u ON u.id = i.reported_by",
            ISSUE_COLUMNS
        );
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = query.status {
            conditions.push("i.status = ?".to_string());
            params_vec.push(Box::new(status.as_str()));
        }

        if let Some(category) = query.category {
            conditions.push("i.category = ?".to_string());
            params_vec.push(Box::new(category.as_str()));
        }

        if let Some(user_id) = query.reported_by {
            conditions.push("i.reported_by = ?".to_string());
            params_vec.push(Box::new(user_id));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY i.created_at DESC, i.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut issues = stmt
            .query_map(params_refs.as_slice(), issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for issue in &mut issues {
            self.attach_relations(issue)?;
        }

        Ok(issues)
    }

    fn attach_relations(&self, issue: &mut Issue) -> Result<()> {
        issue.photos = self.issue_photos(issue.id)?;
        issue.upvoted_by = self.upvoters(issue.id)?;
        issue.upvotes = issue.upvoted_by.len() as u32;
        Ok(())
    }

    fn issue_photos(&self, issue_id: IssueId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM issue_photos WHERE issue_id = ?1 ORDER BY position")?;
        let urls = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn upvoters(&self, issue_id: IssueId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM upvotes WHERE issue_id = ?1 ORDER BY rowid")?;
        let users = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<UserId>, _>>()?;
        Ok(users)
    }

    /// Sets the status, stamping `resolved_at` when it becomes resolved.
    pub fn update_status(&self, id: IssueId, status: Status) -> Result<bool> {
        self.change_status(id, status, None)
    }

    /// Status change plus an optional admin note, applied together or not at all.
    pub fn change_status(
        &self,
        id: IssueId,
        status: Status,
        note: Option<(UserId, &str)>,
    ) -> Result<bool> {
        let now = now_str();
        let resolved_at = (status == Status::Resolved).then(|| now.clone());
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            "UPDATE issues SET status = ?1, resolved_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), resolved_at, now, id],
        )?;
        if rows == 0 {
            return Ok(false);
        }
        if let Some((admin, text)) = note {
            tx.execute(
                "INSERT INTO comments (issue_id, user_id, text, is_admin, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
                params![id, admin, text, now],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn delete_issue(&self, id: IssueId) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM issues WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // Upvotes

    /// Adds the user's upvote, or removes it if present, and returns the
    /// resulting upvote state of the issue.
    pub fn toggle_upvote(&self, issue_id: IssueId, user_id: UserId) -> Result<UpvoteState> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
            [issue_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(ActionError::issue_not_found(issue_id).into());
        }

        let removed = tx.execute(
            "DELETE FROM upvotes WHERE issue_id = ?1 AND user_id = ?2",
            params![issue_id, user_id],
        )?;
        if removed == 0 {
            tx.execute(
                "INSERT INTO upvotes (issue_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![issue_id, user_id, now_str()],
            )?;
        }
        tx.execute(
            "UPDATE issues SET updated_at = ?1 WHERE id = ?2",
            params![now_str(), issue_id],
        )?;
        tx.commit()?;

        Ok(UpvoteState::new(self.upvoters(issue_id)?))
    }

    // Comments
    pub fn add_comment(
        &self,
        issue_id: IssueId,
        user_id: UserId,
        text: &str,
        photos: &[String],
        is_admin: bool,
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO comments (issue_id, user_id, text, is_admin, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![issue_id, user_id, text, is_admin, now_str()],
        )?;
        let id = tx.last_insert_rowid();
        for (position, url) in photos.iter().enumerate() {
            tx.execute(
                "INSERT INTO comment_photos (comment_id, position, url) VALUES (?1, ?2, ?3)",
                params![id, position as i64, url],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn get_comments(&self, issue_id: IssueId) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.issue_id, c.user_id, u.name, c.text, c.is_admin, c.created_at FROM comments c JOIN users u ON u.id = c.user_id WHERE c.issue_id = ?1 ORDER BY c.created_at, c.id",
        )?;
        let mut comments = stmt
            .query_map([issue_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    user_id: row.get(2)?,
                    user_name: row.get(3)?,
                    text: row.get(4)?,
                    photos: Vec::new(),
                    is_admin: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut photo_stmt = self
            .conn
            .prepare("SELECT url FROM comment_photos WHERE comment_id = ?1 ORDER BY position")?;
        for comment in &mut comments {
            comment.photos = photo_stmt
                .query_map([comment.id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
        }
        Ok(comments)
    }

    // Aggregates
    pub fn issue_stats(&self) -> Result<IssueStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM issues GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((parse_column::<Status>(row, 0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(IssueStats::from_statuses(rows.into_iter().flat_map(
            |(status, count)| std::iter::repeat(status).take(count as usize),
        )))
    }

    /// Per-user totals feeding the leaderboard, one row per registered user.
    pub fn contributor_totals(&self) -> Result<Vec<ContributorTotals>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.id, u.name, u.avatar,
                COUNT(i.id),
                COALESCE(SUM(CASE WHEN i.status = 'open' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.status = 'in_progress' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.status = 'resolved' THEN 1 ELSE 0 END), 0),
                (SELECT COUNT(*) FROM upvotes v JOIN issues vi ON vi.id = v.issue_id WHERE vi.reported_by = u.id)
            FROM users u
            LEFT JOIN issues i ON i.reported_by = u.id
            GROUP BY u.id
            ORDER BY u.id
            "#,
        )?;

        let totals = stmt
            .query_map([], |row| {
                Ok(ContributorTotals {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    avatar: row.get(2)?,
                    total_issues: row.get(3)?,
                    open_issues: row.get(4)?,
                    in_progress_issues: row.get(5)?,
                    resolved_issues: row.get(6)?,
                    total_upvotes: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(totals)
    }
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: parse_column::<Category>(row, 3)?,
        status: parse_column::<Status>(row, 4)?,
        priority: parse_column::<Priority>(row, 5)?,
        location: Location {
            address: row.get(6)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
        },
        photos: Vec::new(),
        reported_by: row.get(9)?,
        reported_by_name: row.get(10)?,
        upvotes: 0,
        upvoted_by: Vec::new(),
        comments: Vec::new(),
        created_at: parse_datetime(row.get::<_, String>(11)?),
        updated_at: parse_datetime(row.get::<_, String>(12)?),
        resolved_at: row.get::<_, Option<String>>(13)?.map(parse_datetime),
        distance: None,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        is_admin: row.get(3)?,
        avatar: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fixed-width so that lexical order matches chronological order.
fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
