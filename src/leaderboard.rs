use std::cmp::Reverse;

use crate::models::{Badge, LeaderboardEntry, UserId};

const POINTS_PER_ISSUE: u32 = 10;
const POINTS_PER_RESOLVED: u32 = 15;
const POINTS_PER_UPVOTE: u32 = 2;

/// Raw per-user counts as aggregated by the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorTotals {
    pub user_id: UserId,
    pub name: String,
    pub avatar: String,
    pub total_issues: u32,
    pub open_issues: u32,
    pub in_progress_issues: u32,
    pub resolved_issues: u32,
    /// Upvotes received across all of the user's issues.
    pub total_upvotes: u32,
}

pub fn score(totals: &ContributorTotals) -> u32 {
    totals.total_issues * POINTS_PER_ISSUE
        + totals.resolved_issues * POINTS_PER_RESOLVED
        + totals.total_upvotes * POINTS_PER_UPVOTE
}

/// At most one score badge, one volume badge and one popularity badge.
pub fn badges(totals: &ContributorTotals, score: u32) -> Vec<Badge> {
    let mut badges = Vec::new();

    let by_score = [
        (500, Badge::Legend),
        (250, Badge::Hero),
        (100, Badge::Champion),
        (25, Badge::RisingStar),
    ];
    if let Some((_, badge)) = by_score.iter().find(|(min, _)| score >= *min) {
        badges.push(*badge);
    }

    if totals.total_issues >= 25 {
        badges.push(Badge::ReporterPro);
    } else if totals.total_issues >= 10 {
        badges.push(Badge::ActiveReporter);
    }

    if totals.total_upvotes >= 50 {
        badges.push(Badge::CommunityFavorite);
    } else if totals.total_upvotes >= 10 {
        badges.push(Badge::Popular);
    }

    badges
}

/// Scores, orders and numbers the contributors.
pub fn rank(totals: Vec<ContributorTotals>) -> Vec<LeaderboardEntry> {
    let mut scored: Vec<(u32, ContributorTotals)> =
        totals.into_iter().map(|t| (score(&t), t)).collect();
    scored.sort_by_key(|(score, t)| (Reverse(*score), Reverse(t.total_upvotes), t.user_id));

    scored
        .into_iter()
        .enumerate()
        .map(|(idx, (score, t))| LeaderboardEntry {
            rank: idx as u32 + 1,
            badges: badges(&t, score),
            score,
            user_id: t.user_id,
            name: t.name,
            avatar: t.avatar,
            total_issues: t.total_issues,
            open_issues: t.open_issues,
            in_progress_issues: t.in_progress_issues,
            resolved_issues: t.resolved_issues,
            total_upvotes: t.total_upvotes,
        })
        .collect()
}
