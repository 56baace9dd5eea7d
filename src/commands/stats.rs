use anyhow::Result;

use super::Workspace;
use crate::models::IssueStats;

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) * 100.0 / f64::from(total)
    }
}

pub fn run(ws: &Workspace, json: bool) -> Result<IssueStats> {
    let stats = ws.db.issue_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(stats);
    }

    println!("Community Overview");
    println!("  Total issues:  {}", stats.total);
    for (label, count) in [
        ("Pending", stats.pending),
        ("In Progress", stats.in_progress),
        ("Resolved", stats.resolved),
        ("Rejected", stats.rejected),
    ] {
        println!(
            "  {:<13}  {} ({:.0}%)",
            format!("{}:", label),
            count,
            percent(count, stats.total)
        );
    }
    Ok(stats)
}
