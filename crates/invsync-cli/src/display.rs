//! Terminal rendering for InvSync results

use console::{style, StyledObject};
use invsync_store::{Page, StoreStats};
use invsync_sync::{LogLevel, PreviewReport, SyncResult};
use invsync_types::{RunStatus, StoredResource, SyncRecord};
use std::time::Duration;

/// Display a success message with proper formatting
pub fn display_success(message: &str) {
    println!("{}", format_log_line(LogLevel::Success, message));
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{}", format_log_line(LogLevel::Info, message));
}

/// One colored line of the live log
pub fn format_log_line(level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info => format!("{} {}", style("ℹ").blue().bold(), message),
        LogLevel::Success => format!("{} {}", style("✓").green().bold(), style(message).green()),
        LogLevel::Warning => format!("{} {}", style("⚠").yellow().bold(), style(message).yellow()),
        LogLevel::Error => format!("{} {}", style("✗").red().bold(), style(message).red()),
        LogLevel::Debug => format!("{} {}", style("·").dim(), style(message).dim()),
    }
}

fn status_style(status: RunStatus) -> StyledObject<RunStatus> {
    match status {
        RunStatus::Success => style(status).green().bold(),
        RunStatus::Partial => style(status).yellow().bold(),
        RunStatus::Failed => style(status).red().bold(),
    }
}

fn count_style(count: usize) -> StyledObject<usize> {
    if count > 0 {
        style(count).red()
    } else {
        style(count).green()
    }
}

/// Print the statistics of a finished run
pub fn print_sync_result(result: &SyncResult) {
    let stats = &result.stats;
    println!();
    println!("{}", style("Sync Statistics:").bold().underlined());
    println!("  Status: {}", status_style(result.status));
    println!("  Processed: {}", style(stats.resources_processed).cyan());
    println!("  Created: {}", style(stats.resources_created).green());
    println!("  Updated: {}", style(stats.resources_updated).green());
    println!("  Deleted: {}", style(stats.resources_deleted).green());
    println!("  Skipped: {}", style(stats.resources_skipped).yellow());
    println!(
        "  Conflicts: {} detected, {} resolved, {} pending",
        style(stats.conflicts_detected).cyan(),
        style(stats.conflicts_resolved).green(),
        count_style(result.conflicts_pending)
    );
    println!("  Errors: {}", count_style(result.errors.len()));
    println!(
        "  Duration: {}",
        style(format_duration(Duration::from_millis(stats.duration_ms))).blue()
    );
    println!("  History id: {}", style(&result.history_id).dim());

    for error in &result.errors {
        println!("    {} {}", style("✗").red(), style(error).red());
    }
}

/// Print counts, conflicts and change lists of a preview
pub fn print_preview(report: &PreviewReport) {
    let summary = &report.summary;
    println!();
    println!("{}", style("Preview:").bold().underlined());
    println!("  Resources: {}", style(summary.total_resources).cyan());
    println!("  New: {}", style(summary.new_resources).green());
    println!("  Updated: {}", style(summary.updated_resources).green());
    println!("  Deleted: {}", style(summary.deleted_resources).red());
    println!("  Unchanged: {}", style(summary.unchanged_resources).dim());
    println!("  Conflicts: {}", count_style(summary.conflicts));

    if !report.conflicts.is_empty() {
        println!();
        println!("{}", style("Conflicts:").bold().underlined());
        for conflict in &report.conflicts {
            println!(
                "  {}.{}: live {} / stored {}",
                style(&conflict.resource_name).cyan(),
                style(conflict.field).bold(),
                style(&conflict.live_value).green(),
                style(&conflict.stored_value).yellow()
            );
        }
    }

    let changes = &report.changes;
    if changes.is_empty() {
        println!();
        display_success("Inventory is up to date");
        return;
    }
    for (label, names) in [
        ("To create:", &changes.new),
        ("To update:", &changes.updated),
        ("To delete:", &changes.deleted),
    ] {
        if names.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(label).bold().underlined());
        for name in names {
            println!("  • {}", name);
        }
    }
}

/// Print one page of stored resources
pub fn print_resource_page(page: &Page<StoredResource>) {
    if page.items.is_empty() {
        display_info("No stored resources match");
        return;
    }

    println!();
    for record in &page.items {
        let r = &record.resource;
        println!(
            "  {} {} {} {} {}",
            style(&r.name).cyan().bold(),
            style(r.resource_type).dim(),
            style(&r.resource_group).dim(),
            style(&r.location).dim(),
            style(r.status).green()
        );
        if let Some(repo) = &r.git_repository {
            println!("      repo: {}", style(&repo.url).blue());
        }
    }
    println!();
    println!(
        "  Page {} ({} of {} resources{})",
        page.page,
        page.items.len(),
        page.total,
        if page.has_more { ", more available" } else { "" }
    );
}

/// Print run history, newest first
pub fn print_history(history: &[SyncRecord]) {
    if history.is_empty() {
        display_info("No synchronization runs recorded yet");
        return;
    }

    println!();
    println!("{}", style("Sync History:").bold().underlined());
    for record in history {
        println!(
            "  {} {} {} {} by {}",
            style(record.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            status_style(record.status),
            style(record.sync_type).cyan(),
            record.details,
            record
                .user_id
                .clone()
                .unwrap_or_else(|| record.source.to_string())
        );
        for error in &record.errors {
            println!("      {} {}", style("✗").red(), style(error).red());
        }
    }
}

/// Print the inventory summary
pub fn print_store_stats(stats: &StoreStats) {
    println!();
    println!("{}", style("Inventory Statistics:").bold().underlined());
    println!("  Resources: {}", style(stats.total_resources).cyan().bold());
    println!(
        "  With repository: {} / without: {}",
        style(stats.with_git_repository).green(),
        style(stats.without_git_repository).yellow()
    );
    match (stats.last_sync, stats.last_sync_status) {
        (Some(at), Some(status)) => println!(
            "  Last successful sync: {} ({})",
            style(at.format("%Y-%m-%d %H:%M:%S")).blue(),
            status_style(status)
        ),
        _ => println!("  Last successful sync: {}", style("never").dim()),
    }

    if !stats.by_type.is_empty() {
        println!("  By type:");
        for (resource_type, count) in &stats.by_type {
            println!("    {}: {}", resource_type, style(count).cyan());
        }
    }
    if !stats.by_environment.is_empty() {
        println!("  By environment:");
        for (environment, count) in &stats.by_environment {
            println!("    {}: {}", environment, style(count).cyan());
        }
    }
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
