//! The city assistant.
//!
//! Messages are matched against an ordered rule table, first match wins.
//! While a report form is open, input goes to the form instead, except for
//! the cancel keywords.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{Database, IssueQuery};
use crate::models::{
    Category, Coordinates, IssueStats, Location, NewIssue, Priority, Status, User, UserId,
    MAX_TITLE_LEN,
};
use crate::store::{chat_key, LocalStorage};

pub const WELCOME: &str = "Hi! I'm your city assistant. I can help you check the status of your complaints or guide you through reporting issues. Just ask me!";
pub const LOGIN_PROMPT: &str =
    "Please login to check your complaint status. You can login from the top right corner.";
pub const NO_ISSUES: &str = "You haven't reported any issues yet. Would you like to report one?";
pub const STATUS_FAILURE: &str =
    "Sorry, I couldn't fetch your complaint status. Please try again.";
pub const HOW_TO_REPORT: &str = "To report a new issue:\n1. Click on 'Report Issue' in the navigation\n2. Fill in the details (title, description, location)\n3. Add photos if available\n4. Submit your report\n\nWould you like me to guide you through anything else?";
pub const PLATFORM_OVERVIEW: &str = "Here's how Improve My City works:\n\n1. 📝 Report issues in your community\n2. 📊 Track your reports in 'My Issues'\n3. 👍 Upvote issues you care about\n4. 💬 Comment and engage with others\n5. ✅ See resolved issues for transparency\n\nWhat else would you like to know?";
pub const COMMUNITY_FAILURE: &str =
    "Sorry, I couldn't fetch community stats. Please try the dashboard page.";
pub const GUEST_GREETING: &str = "Hello! 👋 I'm here to help. You can ask me about:\n• Checking complaint status\n• Reporting new issues\n• How the platform works\n\nWhat would you like to know?";
pub const CAPABILITIES: &str = "I can help you with:\n• Checking your complaint status\n• Reporting new issues\n• Understanding how the platform works\n• Community statistics\n\nTry asking something like 'What's my complaint status?' or 'How do I report an issue?'";

const CANCELLED: &str = "Okay, I've cancelled the report. Let me know if you need anything else.";
const CANCEL_WORDS: [&str; 6] = ["cancel", "stop", "quit", "exit", "nevermind", "never mind"];
const GREETING_WORDS: [&str; 4] = ["hi", "hello", "hey", "greetings"];
const MAX_TRANSCRIPT: usize = 200;

/// What the assistant may look up on the user's behalf.
pub trait ChatData {
    fn user_statuses(&self, user: UserId) -> Result<Vec<Status>>;
    fn community_stats(&self) -> Result<IssueStats>;
}

impl ChatData for Database {
    fn user_statuses(&self, user: UserId) -> Result<Vec<Status>> {
        let issues = self.list_issues(&IssueQuery {
            reported_by: Some(user),
            ..Default::default()
        })?;
        Ok(issues.into_iter().map(|issue| issue.status).collect())
    }

    fn community_stats(&self) -> Result<IssueStats> {
        self.issue_stats()
    }
}

pub struct ChatContext<'a> {
    pub user: Option<&'a User>,
    pub data: &'a dyn ChatData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub is_bot: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    #[default]
    Idle,
    Title,
    Description,
    Category,
    Priority,
    Location,
    Images,
    Confirm,
}

/// A report collected through the chat, ready to be geocoded and submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub category: Option<Category>,
    pub priority: Priority,
    pub location: String,
    pub photos: Vec<String>,
}

impl IssueDraft {
    pub fn into_new_issue(self, coordinates: Coordinates) -> NewIssue {
        NewIssue {
            title: self.title,
            description: self.description,
            category: self.category.unwrap_or(Category::Other),
            priority: self.priority,
            location: Location {
                address: self.location,
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            },
            photos: self.photos,
        }
    }

    fn summary(&self) -> String {
        let category = self.category.map(|c| c.as_str()).unwrap_or("Other");
        let photos = if self.photos.is_empty() {
            "none".to_string()
        } else {
            self.photos.len().to_string()
        };
        format!(
            "Here's your report:\n• Title: {}\n• Description: {}\n• Category: {}\n• Priority: {}\n• Location: {}\n• Photos: {}\n\nSubmit it? (yes/no)",
            self.title, self.description, category, self.priority, self.location, photos
        )
    }
}

enum FormReply {
    Prompt(String),
    Submit(IssueDraft),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatForm {
    step: FormStep,
    draft: IssueDraft,
}

impl ChatForm {
    pub fn step(&self) -> FormStep {
        self.step
    }

    pub fn is_active(&self) -> bool {
        self.step != FormStep::Idle
    }

    fn start(&mut self) -> String {
        *self = ChatForm {
            step: FormStep::Title,
            draft: IssueDraft::default(),
        };
        "Let's report a new issue. What's a short title for the problem? (type 'cancel' at any time to stop)".to_string()
    }

    fn abandon(&mut self) {
        *self = ChatForm::default();
    }

    fn advance(&mut self, input: &str) -> FormReply {
        let input = input.trim();
        let lower = input.to_lowercase();
        let prompt = |text: &str| FormReply::Prompt(text.to_string());

        match self.step {
            FormStep::Idle => prompt(CAPABILITIES),
            FormStep::Title => {
                if input.is_empty() {
                    return prompt("Title is required. Please enter a short title.");
                }
                if input.chars().count() > MAX_TITLE_LEN {
                    return FormReply::Prompt(format!(
                        "That title is too long. Please keep it under {} characters.",
                        MAX_TITLE_LEN
                    ));
                }
                self.draft.title = input.to_string();
                self.step = FormStep::Description;
                prompt("Got it. Please describe the issue in a few sentences.")
            }
            FormStep::Description => {
                if input.is_empty() {
                    return prompt("Description is required. What's going on?");
                }
                self.draft.description = input.to_string();
                self.step = FormStep::Category;
                FormReply::Prompt(format!(
                    "Which category fits best? {}",
                    numbered_categories()
                ))
            }
            FormStep::Category => match parse_category_choice(input) {
                Some(category) => {
                    self.draft.category = Some(category);
                    self.step = FormStep::Priority;
                    prompt("How urgent is it? low, medium or high (or 'skip' for medium)")
                }
                None => FormReply::Prompt(format!(
                    "Please choose one of: {}",
                    numbered_categories()
                )),
            },
            FormStep::Priority => {
                let priority = if lower.is_empty() || lower == "skip" {
                    Ok(Priority::Medium)
                } else {
                    lower.parse::<Priority>()
                };
                match priority {
                    Ok(priority) => {
                        self.draft.priority = priority;
                        self.step = FormStep::Location;
                        prompt("Where is it? Enter an address or landmark.")
                    }
                    Err(_) => prompt("Please answer low, medium or high."),
                }
            }
            FormStep::Location => {
                if input.is_empty() {
                    return prompt("Location is required. Where is the issue?");
                }
                self.draft.location = input.to_string();
                self.step = FormStep::Images;
                prompt("Paste photo links separated by spaces, or type 'skip'.")
            }
            FormStep::Images => {
                if matches!(lower.as_str(), "" | "skip" | "none" | "no") {
                    self.draft.photos.clear();
                } else {
                    let links: Vec<&str> = input
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .filter(|s| !s.is_empty())
                        .collect();
                    if links
                        .iter()
                        .any(|l| !(l.starts_with("http://") || l.starts_with("https://")))
                    {
                        return prompt(
                            "Photo links must start with http:// or https://. Paste links or type 'skip'.",
                        );
                    }
                    self.draft.photos = links.into_iter().map(String::from).collect();
                }
                self.step = FormStep::Confirm;
                FormReply::Prompt(self.draft.summary())
            }
            FormStep::Confirm => match lower.as_str() {
                "yes" | "y" | "submit" => {
                    let draft = std::mem::take(&mut self.draft);
                    self.abandon();
                    FormReply::Submit(draft)
                }
                "no" | "n" => {
                    self.abandon();
                    prompt("Okay, I've discarded the report.")
                }
                _ => prompt("Please answer yes or no."),
            },
        }
    }
}

fn numbered_categories() -> String {
    Category::ALL
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}) {}", i + 1, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_category_choice(input: &str) -> Option<Category> {
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| Category::ALL.get(i)).copied();
    }
    input.parse().ok()
}

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: String,
    /// Present when the user confirmed a report in this turn.
    pub draft: Option<IssueDraft>,
}

struct Turn {
    lower: String,
    form_active: bool,
}

type Matcher = fn(&Turn) -> bool;
type Handler = fn(&mut ChatSession, &ChatContext) -> String;

struct Rule {
    name: &'static str,
    matches: Matcher,
    respond: Handler,
}

const RULES: &[Rule] = &[
    Rule {
        name: "cancel",
        matches: |t| t.form_active && is_cancel(&t.lower),
        respond: cancel_form,
    },
    Rule {
        name: "status",
        // "report a new issue" mentions an issue but asks for the form
        matches: |t| {
            contains_any(&t.lower, &["status", "complaint", "issue"]) && !wants_report(&t.lower)
        },
        respond: complaint_status,
    },
    Rule {
        name: "report",
        matches: |t| wants_report(&t.lower),
        respond: start_report,
    },
    Rule {
        name: "help",
        matches: |t| contains_any(&t.lower, &["how", "work", "help"]),
        respond: |_, _| PLATFORM_OVERVIEW.to_string(),
    },
    Rule {
        name: "community",
        matches: |t| contains_any(&t.lower, &["all issues", "community", "public"]),
        respond: community_overview,
    },
    Rule {
        name: "greeting",
        matches: |t| GREETING_WORDS.iter().any(|w| t.lower.starts_with(w)),
        respond: greet,
    },
    Rule {
        name: "fallback",
        matches: |_| true,
        respond: |_, _| CAPABILITIES.to_string(),
    },
];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn is_cancel(lower: &str) -> bool {
    CANCEL_WORDS.contains(&lower.trim())
}

fn wants_report(lower: &str) -> bool {
    contains_any(lower, &["report", "new issue"])
}

fn cancel_form(session: &mut ChatSession, _: &ChatContext) -> String {
    session.form.abandon();
    CANCELLED.to_string()
}

fn complaint_status(_: &mut ChatSession, ctx: &ChatContext) -> String {
    let Some(user) = ctx.user else {
        return LOGIN_PROMPT.to_string();
    };
    match ctx.data.user_statuses(user.id) {
        Ok(statuses) if statuses.is_empty() => NO_ISSUES.to_string(),
        Ok(statuses) => {
            let count = |s: Status| statuses.iter().filter(|x| **x == s).count();
            format!(
                "Here's your complaint status:\n• {} Pending\n• {} In Progress\n• {} Resolved\n\nYou can view details on the \"My Issues\" page.",
                count(Status::Open),
                count(Status::InProgress),
                count(Status::Resolved)
            )
        }
        Err(e) => {
            warn!(error = %e, "could not load complaint status");
            STATUS_FAILURE.to_string()
        }
    }
}

fn start_report(session: &mut ChatSession, ctx: &ChatContext) -> String {
    if ctx.user.is_none() {
        return HOW_TO_REPORT.to_string();
    }
    session.form.start()
}

fn community_overview(_: &mut ChatSession, ctx: &ChatContext) -> String {
    match ctx.data.community_stats() {
        Ok(stats) => format!(
            "Community Overview:\n• Total Issues: {}\n• Pending: {}\n• In Progress: {}\n• Resolved: {}\n\nCheck the dashboard to explore all issues!",
            stats.total, stats.pending, stats.in_progress, stats.resolved
        ),
        Err(e) => {
            warn!(error = %e, "could not load community stats");
            COMMUNITY_FAILURE.to_string()
        }
    }
}

fn greet(_: &mut ChatSession, ctx: &ChatContext) -> String {
    match ctx.user {
        Some(user) => format!(
            "Hello {}! 👋 How can I assist you today? I can help you check your complaint status, guide you through reporting issues, or answer questions about the platform.",
            user.name
        ),
        None => GUEST_GREETING.to_string(),
    }
}

/// Transcript plus any report form in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    form: ChatForm,
}

impl Default for ChatSession {
    fn default() -> Self {
        ChatSession {
            messages: vec![ChatMessage {
                text: WELCOME.to_string(),
                is_bot: true,
                timestamp: Utc::now(),
            }],
            form: ChatForm::default(),
        }
    }
}

impl ChatSession {
    pub fn new() -> Self {
        ChatSession::default()
    }

    /// The saved session for a logged-in user. Guests always start fresh.
    pub fn load(storage: &LocalStorage, user: Option<UserId>) -> Self {
        user.and_then(|id| storage.get(&chat_key(id)))
            .unwrap_or_default()
    }

    pub fn save(&self, storage: &mut LocalStorage, user: Option<UserId>) -> Result<()> {
        match user {
            Some(id) => storage.set(&chat_key(id), self),
            None => Ok(()),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn form(&self) -> &ChatForm {
        &self.form
    }

    /// Appends a bot message outside the normal turn flow.
    pub fn say(&mut self, text: &str) {
        self.push(text, true);
    }

    fn push(&mut self, text: &str, is_bot: bool) {
        self.messages.push(ChatMessage {
            text: text.to_string(),
            is_bot,
            timestamp: Utc::now(),
        });
        if self.messages.len() > MAX_TRANSCRIPT {
            let excess = self.messages.len() - MAX_TRANSCRIPT;
            self.messages.drain(..excess);
        }
    }

    /// Handles one user message. Blank input is ignored.
    pub fn respond(&mut self, message: &str, ctx: &ChatContext) -> Option<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        self.push(message, false);

        let turn = Turn {
            lower: message.to_lowercase(),
            form_active: self.form.is_active(),
        };

        let outcome = if turn.form_active && !is_cancel(&turn.lower) {
            match self.form.advance(message) {
                FormReply::Prompt(reply) => ChatOutcome { reply, draft: None },
                FormReply::Submit(draft) => ChatOutcome {
                    reply: "Submitting your report...".to_string(),
                    draft: Some(draft),
                },
            }
        } else {
            let rule = RULES
                .iter()
                .find(|rule| (rule.matches)(&turn))
                .unwrap_or(&RULES[RULES.len() - 1]);
            debug!(rule = rule.name, "chat rule matched");
            ChatOutcome {
                reply: (rule.respond)(self, ctx),
                draft: None,
            }
        };

        self.push(&outcome.reply, true);
        Some(outcome)
    }
}
