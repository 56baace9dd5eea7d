use anyhow::Result;
use tracing::info;

use super::report::resolve_photo;
use super::Workspace;
use crate::error::ActionError;
use crate::models::IssueId;

pub fn run(ws: &mut Workspace, id: IssueId, text: &str, photos: &[String]) -> Result<()> {
    let user = ws.require_user()?;
    let ws: &Workspace = ws;
    let text = text.trim();
    if text.is_empty() {
        return Err(ActionError::Validation("Comment cannot be empty".to_string()).into());
    }
    if ws.db.get_issue(id)?.is_none() {
        return Err(ActionError::issue_not_found(id).into());
    }
    let photos = photos
        .iter()
        .map(|p| resolve_photo(ws, p))
        .collect::<Result<Vec<_>>>()?;

    let comment_id = ws.db.add_comment(id, user.id, text, &photos, user.is_admin)?;
    info!(issue = id, comment = comment_id, admin = user.is_admin, "comment added");
    println!("Added comment to issue #{}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{login_as, setup_workspace};
    use crate::db::tests::sample_issue;
    use crate::models::Category;

    // ==================== Unit Tests ====================

    #[test]
    fn test_comment_records_author_and_photos() {
        let (mut ws, _dir) = setup_workspace();
        let user = login_as(&mut ws, "Ada", false);
        let id = ws
            .db
            .create_issue(&sample_issue("Dark alley", Category::Streetlight), user.id)
            .unwrap();

        let photos = vec!["https://img.example/night.jpg".to_string()];
        run(&mut ws, id, "  Still dark tonight  ", &photos).unwrap();

        let comments = ws.db.get_comments(id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "Still dark tonight");
        assert_eq!(comments[0].user_name, "Ada");
        assert!(!comments[0].is_admin);
        assert_eq!(comments[0].photos, photos);
    }

    #[test]
    fn test_admin_comment_flagged() {
        let (mut ws, _dir) = setup_workspace();
        let clerk = login_as(&mut ws, "Clerk", true);
        let id = ws
            .db
            .create_issue(&sample_issue("Dark alley", Category::Streetlight), clerk.id)
            .unwrap();
        run(&mut ws, id, "Scheduled for Friday", &[]).unwrap();
        assert!(ws.db.get_comments(id).unwrap()[0].is_admin);
    }

    #[test]
    fn test_comment_errors() {
        let (mut ws, _dir) = setup_workspace();
        assert!(run(&mut ws, 1, "hello", &[]).is_err());

        login_as(&mut ws, "Ada", false);
        let err = run(&mut ws, 99, "hello", &[]).unwrap_err();
        assert!(err.to_string().contains("not found"));
        let err = run(&mut ws, 99, "   ", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Comment cannot be empty");
    }

    #[test]
    fn test_comment_with_bad_photo_adds_nothing() {
        let (mut ws, _dir) = setup_workspace();
        let user = login_as(&mut ws, "Ada", false);
        let id = ws
            .db
            .create_issue(&sample_issue("Dark alley", Category::Streetlight), user.id)
            .unwrap();
        let photos = vec!["/definitely/not/here.png".to_string()];
        assert!(run(&mut ws, id, "look", &photos).is_err());
        assert!(ws.db.get_comments(id).unwrap().is_empty());
    }
}
