//! Terminal rendering for server responses

use colored::{ColoredString, Colorize};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use flik_common::types::{RateLimitStatus, RunHandle, RunState, RunStatus};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn state_label(state: RunState) -> ColoredString {
    match state {
        RunState::Running => state.as_str().yellow(),
        RunState::Completed => state.as_str().green(),
        RunState::HaltedQuota => state.as_str().magenta(),
        RunState::Failed => state.as_str().red(),
        RunState::Skipped => state.as_str().dimmed(),
    }
}

pub fn render_handle(handle: &RunHandle) -> String {
    format!(
        "Run accepted\n  Run id:  {}\n  Job:     {}\n  State:   {}\n\nFollow it with 'flik status {}'",
        handle.run_id,
        handle.job_name,
        state_label(handle.state),
        handle.run_id
    )
}

pub fn render_status(status: &RunStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", status.job_name.cyan().bold()));
    out.push_str(&format!("  Run id:   {}\n", status.run_id));
    out.push_str(&format!("  Pipeline: {}\n", status.kind));
    out.push_str(&format!("  State:    {}\n", state_label(status.state)));
    out.push_str(&format!("  Started:  {}\n", status.started_at.format(TIME_FORMAT)));
    if let Some(ended_at) = status.ended_at {
        out.push_str(&format!("  Ended:    {}\n", ended_at.format(TIME_FORMAT)));
    }
    out.push_str(&format!("  Written:  {}\n", status.total_written()));
    if let Some(exit) = &status.exit_description {
        out.push_str(&format!("  Exit:     {}\n", exit));
    }

    if !status.stages.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Stage", "State", "Read", "Written", "Skipped", "Filtered", "API calls"]);

        for stage in &status.stages {
            table.add_row(vec![
                stage.name.clone(),
                format!("{:?}", stage.state),
                stage.stats.read_count.to_string(),
                stage.stats.write_count.to_string(),
                stage.stats.skip_count.to_string(),
                stage.stats.filter_count.to_string(),
                stage.stats.api_calls.to_string(),
            ]);
        }
        out.push('\n');
        out.push_str(&table.to_string());
        out.push('\n');
    }

    out
}

pub fn render_runs(runs: &[RunStatus]) -> String {
    if runs.is_empty() {
        return "No runs found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Run id", "Job", "State", "Written", "Started"]);

    for run in runs {
        table.add_row(vec![
            run.run_id.to_string(),
            run.job_name.clone(),
            run.state.to_string(),
            run.total_written().to_string(),
            run.started_at.format(TIME_FORMAT).to_string(),
        ]);
    }

    table.to_string()
}

pub fn render_rate_limit(status: &RateLimitStatus) -> String {
    let availability = if status.can_request {
        "yes".green()
    } else {
        "no, budget spent for today".red()
    };
    format!(
        "API call budget for {}\n  Used:      {}/{}\n  Remaining: {}\n  Available: {}",
        status.day, status.used, status.daily_limit, status.remaining, availability
    )
}
