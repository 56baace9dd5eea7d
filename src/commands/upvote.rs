use anyhow::Result;

use super::Workspace;
use crate::error::ActionError;
use crate::models::IssueId;
use crate::upvote::{UpvotePhase, UpvoteState, UpvoteToggle};

/// Toggles the current user's upvote and returns the settled state.
pub fn run(ws: &mut Workspace, id: IssueId) -> Result<UpvoteState> {
    let user = ws.require_user()?;
    let issue = match ws.db.get_issue(id)? {
        Some(i) => i,
        None => return Err(ActionError::issue_not_found(id).into()),
    };

    let mut toggle = UpvoteToggle::new(UpvoteState::from_issue(&issue));
    toggle.click(user.id);
    let optimistic = toggle.state().has_upvoted(user.id);

    let response = ws.db.toggle_upvote(id, user.id);
    let failure = response.as_ref().err().map(|e| e.to_string());

    match toggle.settle(response) {
        UpvotePhase::Committed => {
            let state = toggle.state().clone();
            if state.has_upvoted(user.id) {
                println!("Upvoted issue #{} ({} upvotes)", id, state.upvotes);
            } else {
                println!("Removed upvote from issue #{} ({} upvotes)", id, state.upvotes);
            }
            Ok(state)
        }
        UpvotePhase::RolledBack | UpvotePhase::Pending => {
            let verb = if optimistic { "upvote" } else { "remove upvote from" };
            Err(ActionError::Api(format!(
                "could not {} issue #{}: {}",
                verb,
                id,
                failure.unwrap_or_default()
            ))
            .into())
        }
    }
}
