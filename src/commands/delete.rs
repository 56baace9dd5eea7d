use anyhow::{bail, Result};
use std::io::{self, Write};
use tracing::info;

use super::Workspace;
use crate::error::ActionError;
use crate::models::{IssueId, Status};

/// Reporters may withdraw their own issues while they are still pending.
pub fn run(ws: &mut Workspace, id: IssueId, force: bool) -> Result<()> {
    let user = ws.require_user()?;
    let issue = match ws.db.get_issue(id)? {
        Some(i) => i,
        None => return Err(ActionError::issue_not_found(id).into()),
    };

    if issue.reported_by != user.id {
        return Err(
            ActionError::Forbidden("Only the reporter can delete this issue".to_string()).into(),
        );
    }
    if issue.status != Status::Open {
        return Err(ActionError::Forbidden(format!(
            "Only pending issues can be deleted (issue #{} is {})",
            id,
            issue.status.label()
        ))
        .into());
    }

    if !force {
        print!("Delete issue #{} \"{}\"? [y/N] ", id, issue.title);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if ws.db.delete_issue(id)? {
        info!(issue = id, user = user.id, "issue deleted");
        println!("Deleted issue #{}", id);
    } else {
        bail!("Failed to delete issue #{}", id);
    }

    Ok(())
}

/// Internal function for testing without stdin interaction
#[cfg(test)]
pub fn run_force(ws: &mut Workspace, id: IssueId) -> Result<()> {
    run(ws, id, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{login_as, setup_workspace};
    use crate::db::tests::sample_issue;
    use crate::models::Category;

    // ==================== Unit Tests ====================

    #[test]
    fn test_reporter_deletes_pending_issue() {
        let (mut ws, _dir) = setup_workspace();
        let ada = login_as(&mut ws, "Ada", false);
        let id = ws
            .db
            .create_issue(&sample_issue("Overflowing bin", Category::Garbage), ada.id)
            .unwrap();
        ws.db.add_comment(id, ada.id, "Smells", &[], false).unwrap();

        run_force(&mut ws, id).unwrap();
        assert!(ws.db.get_issue(id).unwrap().is_none());
        assert!(ws.db.get_comments(id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_nonexistent_issue() {
        let (mut ws, _dir) = setup_workspace();
        login_as(&mut ws, "Ada", false);
        let result = run_force(&mut ws, 99999);
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_other_user_cannot_delete() {
        let (mut ws, _dir) = setup_workspace();
        let ada = login_as(&mut ws, "Ada", false);
        let id = ws
            .db
            .create_issue(&sample_issue("Overflowing bin", Category::Garbage), ada.id)
            .unwrap();

        login_as(&mut ws, "Mallory", true);
        let err = run_force(&mut ws, id).unwrap_err();
        assert_eq!(err.to_string(), "Only the reporter can delete this issue");
        assert!(ws.db.get_issue(id).unwrap().is_some());
    }

    #[test]
    fn test_cannot_delete_after_triage() {
        let (mut ws, _dir) = setup_workspace();
        let ada = login_as(&mut ws, "Ada", false);
        let id = ws
            .db
            .create_issue(&sample_issue("Overflowing bin", Category::Garbage), ada.id)
            .unwrap();
        ws.db.update_status(id, Status::InProgress).unwrap();

        let err = run_force(&mut ws, id).unwrap_err();
        assert!(err.to_string().contains("Only pending issues"));
    }

    #[test]
    fn test_delete_requires_login() {
        let (mut ws, _dir) = setup_workspace();
        assert!(run_force(&mut ws, 1).is_err());
    }
}
