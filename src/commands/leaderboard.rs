use anyhow::Result;

use super::{truncate, Workspace};
use crate::leaderboard;
use crate::models::LeaderboardEntry;

/// Ranked contributors, optionally cut to the top `limit`.
pub fn entries(ws: &Workspace, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
    let mut ranked = leaderboard::rank(ws.db.contributor_totals()?);
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    Ok(ranked)
}

pub fn run(ws: &Workspace, limit: Option<usize>, json: bool) -> Result<()> {
    let ranked = entries(ws, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    if ranked.is_empty() {
        println!("No contributors yet.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<20} {:>6} {:>6} {:>8} {:>7}  Badges",
        "Rank", "Name", "Score", "Issues", "Resolved", "Upvotes"
    );
    for entry in &ranked {
        let badges = entry
            .badges
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:>4}  {:<20} {:>6} {:>6} {:>8} {:>7}  {}",
            entry.rank,
            truncate(&entry.name, 20),
            entry.score,
            entry.total_issues,
            entry.resolved_issues,
            entry.total_upvotes,
            badges
        );
    }
    Ok(())
}
