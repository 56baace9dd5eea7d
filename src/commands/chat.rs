use anyhow::Result;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use super::report::{geocode_address, submit};
use super::Workspace;
use crate::chatbot::{ChatContext, ChatSession};
use crate::geocode::Geocoder;

const QUIT_WORDS: [&str; 2] = ["/quit", "/bye"];

/// Runs one user message through the assistant and returns the bot lines
/// it produced. A confirmed report is filed on the user's behalf.
pub(crate) fn converse(
    ws: &mut Workspace,
    message: &str,
    geocoder: &dyn Geocoder,
) -> Result<Vec<String>> {
    let user = ws.current_user()?;
    let user_id = user.as_ref().map(|u| u.id);
    let mut session = ChatSession::load(&ws.storage, user_id);

    let outcome = {
        let ctx = ChatContext {
            user: user.as_ref(),
            data: &ws.db,
        };
        session.respond(message, &ctx)
    };
    let Some(outcome) = outcome else {
        return Ok(Vec::new());
    };

    let mut replies = vec![outcome.reply];
    if let (Some(draft), Some(user)) = (outcome.draft, user.as_ref()) {
        let coordinates = geocode_address(ws, geocoder, &draft.location);
        let issue = draft.into_new_issue(coordinates);
        let text = match submit(ws, &issue, user.id) {
            Ok(id) => {
                info!(issue = id, user = user.id, "report filed from chat");
                format!(
                    "Your report #{} \"{}\" at {} has been submitted! You can follow it on the \"My Issues\" page.",
                    id, issue.title, issue.location.address
                )
            }
            Err(e) => {
                warn!(error = %e, "chat report rejected");
                format!("Sorry, I couldn't submit your report: {}", e)
            }
        };
        session.say(&text);
        replies.push(text);
    }

    session.save(&mut ws.storage, user_id)?;
    Ok(replies)
}

pub fn run(ws: &mut Workspace, message: Option<&str>, geocoder: &dyn Geocoder) -> Result<()> {
    if let Some(message) = message {
        for reply in converse(ws, message, geocoder)? {
            println!("{}", reply);
        }
        return Ok(());
    }

    let user = ws.current_user()?;
    let session = ChatSession::load(&ws.storage, user.map(|u| u.id));
    if let Some(last) = session.messages().last().filter(|m| m.is_bot) {
        println!("{}", last.text);
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if QUIT_WORDS.contains(&line.trim()) {
            break;
        }
        for reply in converse(ws, &line, geocoder)? {
            println!("{}\n", reply);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::{FormStep, LOGIN_PROMPT, NO_ISSUES, WELCOME};
    use crate::commands::tests::{login_as, setup_workspace};
    use crate::db::IssueQuery;
    use crate::geocode::KeywordGeocoder;
    use crate::models::{Category, Priority};

    fn geocoder(ws: &Workspace) -> KeywordGeocoder {
        KeywordGeocoder::without_jitter(ws.config.default_location)
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_guest_is_asked_to_login() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        let replies = converse(&mut ws, "what's my status", &geo).unwrap();
        assert_eq!(replies, vec![LOGIN_PROMPT.to_string()]);
    }

    #[test]
    fn test_blank_line_produces_nothing() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        assert!(converse(&mut ws, "  \n", &geo).unwrap().is_empty());
    }

    #[test]
    fn test_transcript_persists_for_user() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        let user = login_as(&mut ws, "Ada", false);

        let replies = converse(&mut ws, "my complaint", &geo).unwrap();
        assert_eq!(replies, vec![NO_ISSUES.to_string()]);

        let session = ChatSession::load(&ws.storage, Some(user.id));
        let texts: Vec<_> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec![WELCOME, "my complaint", NO_ISSUES]);
    }

    #[test]
    fn test_form_state_survives_between_invocations() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        let user = login_as(&mut ws, "Ada", false);

        converse(&mut ws, "report", &geo).unwrap();
        converse(&mut ws, "Fallen tree", &geo).unwrap();
        let session = ChatSession::load(&ws.storage, Some(user.id));
        assert_eq!(session.form().step(), FormStep::Description);
    }

    #[test]
    fn test_confirmed_form_files_issue() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        let user = login_as(&mut ws, "Ada", false);

        for line in [
            "report",
            "Fallen tree",
            "Blocking the footpath",
            "parks",
            "high",
            "uptown",
            "skip",
        ] {
            converse(&mut ws, line, &geo).unwrap();
        }
        let replies = converse(&mut ws, "yes", &geo).unwrap();
        // The confirmation is the only output for the filed report
        assert_eq!(replies.len(), 2);
        assert!(replies[1].starts_with("Your report #"));
        assert!(replies[1].contains("\"Fallen tree\" at uptown"));

        let issues = ws
            .db
            .list_issues(&IssueQuery {
                reported_by: Some(user.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Fallen tree");
        assert_eq!(issues[0].category, Category::Parks);
        assert_eq!(issues[0].priority, Priority::High);
        assert_eq!(issues[0].location.address, "uptown");
        assert_eq!(issues[0].location.latitude, 40.7829);
    }

    #[test]
    fn test_one_shot_run() {
        let (mut ws, _dir) = setup_workspace();
        let geo = geocoder(&ws);
        assert!(run(&mut ws, Some("hello"), &geo).is_ok());
    }
}
