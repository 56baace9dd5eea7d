use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ActionError;

pub type UserId = i64;
pub type IssueId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Pothole,
    Garbage,
    Streetlight,
    #[serde(rename = "Water Supply")]
    WaterSupply,
    Drainage,
    #[serde(rename = "Road Damage")]
    RoadDamage,
    Parks,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Pothole,
        Category::Garbage,
        Category::Streetlight,
        Category::WaterSupply,
        Category::Drainage,
        Category::RoadDamage,
        Category::Parks,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pothole => "Pothole",
            Category::Garbage => "Garbage",
            Category::Streetlight => "Streetlight",
            Category::WaterSupply => "Water Supply",
            Category::Drainage => "Drainage",
            Category::RoadDamage => "Road Damage",
            Category::Parks => "Parks",
            Category::Other => "Other",
        }
    }

    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the display name in any case, with spaces, dashes or underscores.
impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        Category::ALL
            .iter()
            .find(|c| c.as_str().replace(' ', "").to_lowercase() == key)
            .copied()
            .ok_or_else(|| {
                format!(
                    "Invalid category '{}'. Must be one of: {}",
                    s,
                    Category::names()
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Open,
        Status::InProgress,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Resolved => "resolved",
            Status::Closed => "closed",
        }
    }

    /// Citizen-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Open => "Pending",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
            Status::Closed => "Rejected",
        }
    }

    /// Position in the triage workflow, used for sorting.
    pub fn rank(&self) -> u8 {
        match self {
            Status::Open => 1,
            Status::InProgress => 2,
            Status::Resolved => 3,
            Status::Closed => 4,
        }
    }

    /// Whether an administrator may move an issue from `self` to `next`.
    /// Resolved and closed are terminal.
    pub fn can_advance_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::Open, Status::InProgress)
            | (Status::Open, Status::Resolved)
            | (Status::Open, Status::Closed)
            | (Status::InProgress, Status::Resolved)
            | (Status::InProgress, Status::Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "open" | "pending" => Ok(Status::Open),
            "in_progress" | "inprogress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            "closed" | "rejected" => Ok(Status::Closed),
            _ => Err(format!(
                "Invalid status '{}'. Must be one of: open, in_progress, resolved, closed",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!(
                "Invalid priority '{}'. Must be one of: low, medium, high",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub status: Status,
    pub priority: Priority,
    pub location: Location,
    pub photos: Vec<String>,
    pub reported_by: UserId,
    pub reported_by_name: String,
    pub upvotes: u32,
    pub upvoted_by: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Kilometres from the active location filter, when one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Fields a citizen supplies when reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub location: Location,
    pub photos: Vec<String>,
}

pub const MAX_TITLE_LEN: usize = 200;

impl NewIssue {
    /// Checks the fields a report cannot be submitted without.
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.title.trim().is_empty() {
            return Err(ActionError::Validation("Title is required".to_string()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ActionError::Validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ActionError::Validation(
                "Description is required".to_string(),
            ));
        }
        if self.location.address.trim().is_empty() {
            return Err(ActionError::Validation("Location is required".to_string()));
        }
        if !self.location.coordinates().is_valid() {
            return Err(ActionError::Validation(format!(
                "Coordinates out of range: {}, {}",
                self.location.latitude, self.location.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub issue_id: IssueId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub photos: Vec<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Badge {
    Legend,
    Hero,
    Champion,
    #[serde(rename = "Rising Star")]
    RisingStar,
    #[serde(rename = "Reporter Pro")]
    ReporterPro,
    #[serde(rename = "Active Reporter")]
    ActiveReporter,
    #[serde(rename = "Community Favorite")]
    CommunityFavorite,
    Popular,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Legend => "Legend",
            Badge::Hero => "Hero",
            Badge::Champion => "Champion",
            Badge::RisingStar => "Rising Star",
            Badge::ReporterPro => "Reporter Pro",
            Badge::ActiveReporter => "Active Reporter",
            Badge::CommunityFavorite => "Community Favorite",
            Badge::Popular => "Popular",
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub name: String,
    pub avatar: String,
    pub total_issues: u32,
    pub open_issues: u32,
    pub in_progress_issues: u32,
    pub resolved_issues: u32,
    pub total_upvotes: u32,
    pub score: u32,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStats {
    pub total: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub resolved: u32,
    pub rejected: u32,
}

impl IssueStats {
    pub fn from_statuses<I: IntoIterator<Item = Status>>(statuses: I) -> Self {
        let mut stats = IssueStats::default();
        for status in statuses {
            stats.total += 1;
            match status {
                Status::Open => stats.pending += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Resolved => stats.resolved += 1,
                Status::Closed => stats.rejected += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_variants() {
        assert_eq!("pothole".parse::<Category>().unwrap(), Category::Pothole);
        assert_eq!(
            "Water Supply".parse::<Category>().unwrap(),
            Category::WaterSupply
        );
        assert_eq!(
            "road-damage".parse::<Category>().unwrap(),
            Category::RoadDamage
        );
        assert!("volcano".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_uses_display_name() {
        let json = serde_json::to_string(&Category::WaterSupply).unwrap();
        assert_eq!(json, "\"Water Supply\"");
    }

    #[test]
    fn test_status_parse_labels() {
        assert_eq!("Pending".parse::<Status>().unwrap(), Status::Open);
        assert_eq!("in progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("Rejected".parse::<Status>().unwrap(), Status::Closed);
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn test_status_transitions_are_forward_only() {
        assert!(Status::Open.can_advance_to(Status::InProgress));
        assert!(Status::InProgress.can_advance_to(Status::Resolved));
        assert!(!Status::InProgress.can_advance_to(Status::Open));
        assert!(!Status::Resolved.can_advance_to(Status::InProgress));
        assert!(!Status::Closed.can_advance_to(Status::Open));
        assert!(!Status::Open.can_advance_to(Status::Open));
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(40.7128, -74.0060).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -181.0).is_valid());
    }

    #[test]
    fn test_stats_from_statuses() {
        let stats = IssueStats::from_statuses([
            Status::Open,
            Status::Open,
            Status::InProgress,
            Status::Resolved,
            Status::Closed,
        ]);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.rejected, 1);
    }

    fn draft() -> NewIssue {
        NewIssue {
            title: "Broken hydrant".to_string(),
            description: "Leaking since Monday".to_string(),
            category: Category::WaterSupply,
            priority: Priority::High,
            location: Location {
                address: "5th Avenue".to_string(),
                latitude: 40.7,
                longitude: -73.9,
            },
            photos: Vec::new(),
        }
    }

    #[test]
    fn test_new_issue_validation() {
        assert!(draft().validate().is_ok());

        let mut blank_title = draft();
        blank_title.title = "   ".to_string();
        assert_eq!(
            blank_title.validate().unwrap_err(),
            ActionError::Validation("Title is required".to_string())
        );

        let mut no_address = draft();
        no_address.location.address.clear();
        assert_eq!(
            no_address.validate().unwrap_err().to_string(),
            "Location is required"
        );

        let mut bad_coords = draft();
        bad_coords.location.latitude = 123.0;
        assert!(bad_coords.validate().is_err());

        let mut long_title = draft();
        long_title.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(long_title.validate().is_err());
    }
}
