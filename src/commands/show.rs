use anyhow::Result;

use super::Workspace;
use crate::error::ActionError;
use crate::models::{Comment, Issue, IssueId, Status};

/// The admin comment that closed out a resolved issue.
pub fn resolution_comment(issue: &Issue, comments: &[Comment]) -> Option<usize> {
    if issue.status != Status::Resolved {
        return None;
    }
    comments.iter().rposition(|c| c.is_admin)
}

pub fn run(ws: &Workspace, id: IssueId, json: bool) -> Result<()> {
    let mut issue = match ws.db.get_issue(id)? {
        Some(i) => i,
        None => return Err(ActionError::issue_not_found(id).into()),
    };
    let comments = ws.db.get_comments(id)?;

    if json {
        issue.comments = comments;
        println!("{}", serde_json::to_string_pretty(&issue)?);
        return Ok(());
    }

    println!("Issue #{}: {}", issue.id, issue.title);
    println!("Status: {}", issue.status.label());
    println!("Category: {}", issue.category);
    println!("Priority: {}", issue.priority);
    println!(
        "Location: {} ({:.4}, {:.4})",
        issue.location.address, issue.location.latitude, issue.location.longitude
    );
    println!("Reported by: {}", issue.reported_by_name);
    println!("Upvotes: {}", issue.upvotes);
    println!("Created: {}", issue.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", issue.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(resolved) = issue.resolved_at {
        println!("Resolved: {}", resolved.format("%Y-%m-%d %H:%M:%S"));
    }

    println!("\nDescription:");
    for line in issue.description.lines() {
        println!("  {}", line);
    }

    if !issue.photos.is_empty() {
        println!("\nPhotos:");
        for url in &issue.photos {
            println!("  {}", url);
        }
    }

    let resolution = resolution_comment(&issue, &comments);
    if let Some(idx) = resolution {
        println!("\n*** Resolution ({}) ***", comments[idx].user_name);
        for line in comments[idx].text.lines() {
            println!("  {}", line);
        }
    }

    if !comments.is_empty() {
        println!("\nComments:");
        for comment in &comments {
            let author = if comment.is_admin {
                format!("{} (admin)", comment.user_name)
            } else {
                comment.user_name.clone()
            };
            println!(
                "  [{}] {}: {}",
                comment.created_at.format("%Y-%m-%d %H:%M"),
                author,
                comment.text
            );
            for url in &comment.photos {
                println!("      {}", url);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::setup_workspace;
    use crate::db::tests::sample_issue;
    use crate::models::Category;

    // ==================== Unit Tests ====================

    #[test]
    fn test_show_missing_issue() {
        let (ws, _dir) = setup_workspace();
        let err = run(&ws, 42, false).unwrap_err();
        assert_eq!(err.to_string(), "Issue #42 not found");
    }

    #[test]
    fn test_show_existing_issue() {
        let (ws, _dir) = setup_workspace();
        let ada = ws.db.create_user("Ada", "ada@example.com", "pw", false).unwrap();
        let id = ws
            .db
            .create_issue(&sample_issue("Leak", Category::WaterSupply), ada)
            .unwrap();
        ws.db.add_comment(id, ada, "Still leaking", &[], false).unwrap();
        assert!(run(&ws, id, false).is_ok());
        assert!(run(&ws, id, true).is_ok());
    }

    #[test]
    fn test_resolution_comment_is_last_admin_comment() {
        let (ws, _dir) = setup_workspace();
        let ada = ws.db.create_user("Ada", "ada@example.com", "pw", false).unwrap();
        let clerk = ws.db.create_user("Clerk", "clerk@example.com", "pw", true).unwrap();
        let id = ws
            .db
            .create_issue(&sample_issue("Leak", Category::WaterSupply), ada)
            .unwrap();
        ws.db.add_comment(id, clerk, "Crew dispatched", &[], true).unwrap();
        ws.db.add_comment(id, clerk, "Pipe replaced", &[], true).unwrap();
        ws.db.add_comment(id, ada, "Thanks!", &[], false).unwrap();

        let comments = ws.db.get_comments(id).unwrap();
        let open = ws.db.get_issue(id).unwrap().unwrap();
        assert_eq!(resolution_comment(&open, &comments), None);

        ws.db.update_status(id, Status::Resolved).unwrap();
        let resolved = ws.db.get_issue(id).unwrap().unwrap();
        let idx = resolution_comment(&resolved, &comments).unwrap();
        assert_eq!(comments[idx].text, "Pipe replaced");
    }
}
