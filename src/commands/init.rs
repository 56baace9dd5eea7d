use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use super::auth::validate_registration;
use super::{DATA_DIR, DB_FILE, UPLOADS_DIR};
use crate::config::{CONFIG_FILE, DEFAULT_CONFIG};
use crate::db::Database;
use crate::error::ActionError;

/// The first administrator, created while setting up the project.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccount<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

pub fn run(path: &Path, force: bool, admin: Option<&AdminAccount>) -> Result<()> {
    let civic_dir = path.join(DATA_DIR);
    let config_path = civic_dir.join(CONFIG_FILE);

    let civic_exists = civic_dir.exists();
    if civic_exists && config_path.exists() && !force {
        println!("Already initialized at {}", path.display());
        if let Some(admin) = admin {
            return create_admin(&civic_dir, admin);
        }
        println!("Use --force to restore the default configuration.");
        return Ok(());
    }

    // Create .civic directory and database
    if !civic_exists {
        fs::create_dir_all(&civic_dir).context("Failed to create .civic directory")?;
        Database::open(&civic_dir.join(DB_FILE))?;
        println!("Created {}", civic_dir.display());
    }

    fs::create_dir_all(civic_dir.join(UPLOADS_DIR))
        .context("Failed to create uploads directory")?;

    let config_existed = config_path.exists();
    fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    if config_existed {
        println!("Restored default {}", config_path.display());
    } else {
        println!("Wrote default {}", config_path.display());
    }

    match admin {
        Some(admin) => create_admin(&civic_dir, admin),
        None => Ok(()),
    }
}

/// Only allowed while the project has no administrator yet.
fn create_admin(civic_dir: &Path, admin: &AdminAccount) -> Result<()> {
    validate_registration(admin.name, admin.email, admin.password)?;
    let db = Database::open(&civic_dir.join(DB_FILE))?;
    if db.has_admin()? {
        return Err(ActionError::Forbidden(
            "An administrator already exists; ask them for access".to_string(),
        )
        .into());
    }
    let id = db.create_user(admin.name, admin.email, admin.password, true)?;
    info!(user = id, "administrator created");
    println!("Created administrator {} <{}>", admin.name.trim(), admin.email.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    // ==================== Unit Tests ====================

    #[test]
    fn test_init_creates_layout() {
        let dir = tempdir().unwrap();
        run(dir.path(), false, None).unwrap();

        let civic_dir = dir.path().join(DATA_DIR);
        assert!(civic_dir.join(DB_FILE).exists());
        assert!(civic_dir.join(UPLOADS_DIR).is_dir());
        assert_eq!(Config::load(&civic_dir).unwrap(), Config::default());
    }

    #[test]
    fn test_init_twice_keeps_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), false, None).unwrap();
        let config_path = dir.path().join(DATA_DIR).join(CONFIG_FILE);
        fs::write(&config_path, r#"{"page_size": 3}"#).unwrap();

        run(dir.path(), false, None).unwrap();
        assert_eq!(fs::read_to_string(&config_path).unwrap(), r#"{"page_size": 3}"#);
    }

    #[test]
    fn test_init_force_restores_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), false, None).unwrap();
        let civic_dir = dir.path().join(DATA_DIR);
        fs::write(civic_dir.join(CONFIG_FILE), r#"{"page_size": 3}"#).unwrap();

        run(dir.path(), true, None).unwrap();
        assert_eq!(Config::load(&civic_dir).unwrap().page_size, 12);
    }

    #[test]
    fn test_init_preserves_existing_data() {
        let dir = tempdir().unwrap();
        run(dir.path(), false, None).unwrap();
        let civic_dir = dir.path().join(DATA_DIR);
        {
            let db = Database::open(&civic_dir.join(DB_FILE)).unwrap();
            db.create_user("Ada", "ada@example.com", "pw", false).unwrap();
        }

        run(dir.path(), true, None).unwrap();
        let db = Database::open(&civic_dir.join(DB_FILE)).unwrap();
        assert!(db.authenticate("ada@example.com", "pw").unwrap().is_some());
    }

    #[test]
    fn test_init_creates_first_admin_only() {
        let dir = tempdir().unwrap();
        let clerk = AdminAccount {
            name: "Clerk",
            email: "clerk@example.com",
            password: "secret123",
        };
        run(dir.path(), false, Some(&clerk)).unwrap();

        let civic_dir = dir.path().join(DATA_DIR);
        {
            let db = Database::open(&civic_dir.join(DB_FILE)).unwrap();
            let user = db.authenticate("clerk@example.com", "secret123").unwrap().unwrap();
            assert!(user.is_admin);
        }

        let intruder = AdminAccount {
            name: "Mallory",
            email: "mallory@example.com",
            password: "secret123",
        };
        let err = run(dir.path(), false, Some(&intruder)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ActionError>(),
            Some(ActionError::Forbidden(_))
        ));
        let db = Database::open(&civic_dir.join(DB_FILE)).unwrap();
        assert!(db.authenticate("mallory@example.com", "secret123").unwrap().is_none());
    }

    #[test]
    fn test_init_admin_validated() {
        let dir = tempdir().unwrap();
        let weak = AdminAccount {
            name: "Clerk",
            email: "clerk@example.com",
            password: "123",
        };
        assert!(run(dir.path(), false, Some(&weak)).is_err());
    }
}
