use anyhow::Result;
use tracing::info;

use super::Workspace;
use crate::error::ActionError;
use crate::models::{IssueId, Status};

/// Admin triage. Resolving needs a message, which is kept as an admin
/// comment; any other transition may carry one.
pub fn run(ws: &mut Workspace, id: IssueId, status: &str, message: Option<&str>) -> Result<()> {
    let admin = ws.require_admin()?;
    let next: Status = status.parse().map_err(ActionError::Validation)?;

    let issue = match ws.db.get_issue(id)? {
        Some(i) => i,
        None => return Err(ActionError::issue_not_found(id).into()),
    };

    if !issue.status.can_advance_to(next) {
        return Err(ActionError::Validation(format!(
            "Cannot move issue #{} from {} to {}",
            id,
            issue.status.label(),
            next.label()
        ))
        .into());
    }

    let message = message.map(str::trim).filter(|m| !m.is_empty());
    if next == Status::Resolved && message.is_none() {
        return Err(ActionError::Validation(
            "A resolution message is required to resolve an issue".to_string(),
        )
        .into());
    }

    let note = message.map(|m| (admin.id, m));
    if !ws.db.change_status(id, next, note)? {
        return Err(ActionError::issue_not_found(id).into());
    }
    info!(issue = id, from = %issue.status, to = %next, admin = admin.id, "status changed");
    println!(
        "Issue #{}: {} -> {}",
        id,
        issue.status.label(),
        next.label()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{login_as, setup_workspace};
    use crate::db::tests::sample_issue;
    use crate::models::Category;

    fn issue_by(ws: &Workspace) -> IssueId {
        let citizen = ws.db.create_user("Ada", "ada@example.com", "pw", false).unwrap();
        ws.db
            .create_issue(&sample_issue("Flooding", Category::Drainage), citizen)
            .unwrap()
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_status_requires_admin() {
        let (mut ws, _dir) = setup_workspace();
        let id = issue_by(&ws);
        login_as(&mut ws, "Bob", false);
        let err = run(&mut ws, id, "in_progress", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ActionError>(),
            Some(ActionError::Forbidden(_))
        ));
    }

    #[test]
    fn test_monotonic_transitions() {
        let (mut ws, _dir) = setup_workspace();
        let id = issue_by(&ws);
        login_as(&mut ws, "Clerk", true);

        run(&mut ws, id, "in_progress", None).unwrap();
        assert!(run(&mut ws, id, "open", None).is_err());
        run(&mut ws, id, "resolved", Some("Drain cleared")).unwrap();
        assert!(run(&mut ws, id, "closed", None).is_err());

        let issue = ws.db.get_issue(id).unwrap().unwrap();
        assert_eq!(issue.status, Status::Resolved);
        assert!(issue.resolved_at.is_some());
    }

    #[test]
    fn test_resolve_requires_message() {
        let (mut ws, _dir) = setup_workspace();
        let id = issue_by(&ws);
        login_as(&mut ws, "Clerk", true);

        let err = run(&mut ws, id, "resolved", Some("   ")).unwrap_err();
        assert!(err.to_string().contains("resolution message"));
        assert_eq!(ws.db.get_issue(id).unwrap().unwrap().status, Status::Open);
    }

    #[test]
    fn test_resolution_stored_as_admin_comment() {
        let (mut ws, _dir) = setup_workspace();
        let id = issue_by(&ws);
        login_as(&mut ws, "Clerk", true);
        run(&mut ws, id, "resolved", Some("Drain cleared")).unwrap();

        let comments = ws.db.get_comments(id).unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].is_admin);
        assert_eq!(comments[0].text, "Drain cleared");
    }

    #[test]
    fn test_reject_accepts_label() {
        let (mut ws, _dir) = setup_workspace();
        let id = issue_by(&ws);
        login_as(&mut ws, "Clerk", true);
        run(&mut ws, id, "rejected", None).unwrap();
        assert_eq!(ws.db.get_issue(id).unwrap().unwrap().status, Status::Closed);
    }

    #[test]
    fn test_status_missing_issue() {
        let (mut ws, _dir) = setup_workspace();
        login_as(&mut ws, "Clerk", true);
        let err = run(&mut ws, 404, "closed", None).unwrap_err();
        assert_eq!(err.to_string(), "Issue #404 not found");
    }
}
