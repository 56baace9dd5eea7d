use anyhow::Result;
use tracing::info;

use super::Workspace;
use crate::error::ActionError;
use crate::store::AuthState;

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), ActionError> {
    if name.trim().is_empty() {
        return Err(ActionError::Validation("Name is required".to_string()));
    }
    let email = email.trim();
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if !valid_email {
        return Err(ActionError::Validation(format!(
            "Invalid email address '{}'",
            email
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ActionError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Creates a citizen account and logs it in. Admin accounts only come from
/// `civic init --admin-email`.
pub fn register(ws: &mut Workspace, name: &str, email: &str, password: &str) -> Result<()> {
    validate_registration(name, email, password)?;

    let user_id = ws.db.create_user(name, email, password, false)?;
    let token = ws.db.create_session(user_id)?;
    AuthState::login(&mut ws.storage, &token)?;
    info!(user = user_id, "registered");

    println!("Registered {} and logged in", name.trim());
    Ok(())
}

pub fn login(ws: &mut Workspace, email: &str, password: &str) -> Result<()> {
    let user = match ws.db.authenticate(email, password)? {
        Some(user) => user,
        None => {
            return Err(
                ActionError::Unauthorized("Invalid email or password".to_string()).into(),
            )
        }
    };

    let token = ws.db.create_session(user.id)?;
    AuthState::login(&mut ws.storage, &token)?;
    info!(user = user.id, "logged in");
    println!("Welcome back, {}!", user.name);
    Ok(())
}

pub fn logout(ws: &mut Workspace) -> Result<()> {
    match AuthState::load(&ws.storage).token {
        Some(token) => {
            ws.db.delete_session(&token)?;
            AuthState::logout(&mut ws.storage)?;
            println!("Logged out");
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

pub fn whoami(ws: &mut Workspace) -> Result<()> {
    match ws.current_user()? {
        Some(user) => {
            let role = if user.is_admin { "admin" } else { "citizen" };
            println!("{} <{}> [{}]", user.name, user.email, role);
            println!("Member since {}", user.created_at.format("%Y-%m-%d"));
        }
        None => println!("Not logged in"),
    }
    Ok(())
}
