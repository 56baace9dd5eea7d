pub mod auth;
pub mod chat;
pub mod comment;
pub mod delete;
pub mod init;
pub mod leaderboard;
pub mod list;
pub mod locate;
pub mod report;
pub mod show;
pub mod stats;
pub mod status;
pub mod upvote;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::ActionError;
use crate::models::User;
use crate::store::{AuthState, LocalStorage};

pub const DATA_DIR: &str = ".civic";
pub const DB_FILE: &str = "civic.db";
pub const UPLOADS_DIR: &str = "uploads";

/// Everything a command needs from the data directory.
pub struct Workspace {
    pub dir: PathBuf,
    pub db: Database,
    pub config: Config,
    pub storage: LocalStorage,
}

impl Workspace {
    pub fn open(civic_dir: &Path) -> Result<Self> {
        let db = Database::open(&civic_dir.join(DB_FILE)).context("Failed to open database")?;
        let config = Config::load(civic_dir)?;
        let storage = LocalStorage::open(civic_dir)?;
        Ok(Workspace {
            dir: civic_dir.to_path_buf(),
            db,
            config,
            storage,
        })
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.join(UPLOADS_DIR)
    }

    /// The logged-in user. A token the store no longer knows is dropped.
    pub fn current_user(&mut self) -> Result<Option<User>> {
        let Some(token) = AuthState::load(&self.storage).token else {
            return Ok(None);
        };
        match self.db.user_for_token(&token)? {
            Some(user) => {
                debug!(user = user.id, "authenticated");
                Ok(Some(user))
            }
            None => {
                warn!("stored session is no longer valid, clearing it");
                AuthState::logout(&mut self.storage)?;
                Ok(None)
            }
        }
    }

    pub fn require_user(&mut self) -> Result<User> {
        match self.current_user()? {
            Some(user) => Ok(user),
            None => Err(ActionError::login_required().into()),
        }
    }

    pub fn require_admin(&mut self) -> Result<User> {
        let user = self.require_user()?;
        if !user.is_admin {
            return Err(ActionError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(user)
    }
}

/// Shortens `s` to `max_chars` characters, marking the cut with `...`.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else if max_chars <= 3 {
        s.chars().take(max_chars).collect()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
