//! One-shot commands: status, models, probe, stats

use anyhow::{Context, Result};
use crossterm::style::Stylize;

use parley_core::api::TranscriberProbe;
use parley_core::dashboard::{progress_width, UserStats};
use parley_core::ChatApi;

use crate::surface;

/// Characters in the budget bar
const BAR_WIDTH: usize = 30;

/// Print service availability
pub async fn status(api: &dyn ChatApi) -> Result<()> {
    let map = api
        .service_status()
        .await
        .context("Failed to fetch service status")?;
    surface::print_services(&map);
    Ok(())
}

/// Print installed Ollama models
pub async fn models(api: &dyn ChatApi) -> Result<()> {
    let models = api.list_models().await.context("Failed to list models")?;
    if models.is_empty() {
        println!("No Ollama models found.");
        return Ok(());
    }
    println!("Available Ollama models:");
    for model in models {
        match model.size {
            Some(bytes) => println!("  • {} {}", model.name, format_size(bytes).dark_grey()),
            None => println!("  • {}", model.name),
        }
    }
    Ok(())
}

/// Report whether the transcriber is up
pub async fn probe(api: &dyn ChatApi) -> Result<()> {
    match api
        .probe_transcriber()
        .await
        .context("Failed to reach the transcriber")?
    {
        TranscriberProbe::Available => {
            println!("{} Whisper API is working (empty upload rejected as expected)", "✓".green());
        }
        TranscriberProbe::Responded(code) => {
            println!("{} Whisper API responded with status {code}", "?".yellow());
        }
    }
    Ok(())
}

/// Print usage figures, the budget bar and the per-day series
pub async fn stats(api: &dyn ChatApi) -> Result<()> {
    let stats = api.user_stats().await.context("Failed to fetch usage")?;
    print!("{}", render_stats(&stats));
    Ok(())
}

fn render_stats(stats: &UserStats) -> String {
    let dashboard = stats.dashboard();
    let mut out = String::new();

    out.push_str(&format!(
        "requests: {}  tokens: {}  cost: ${:.4}\n",
        stats.total_requests, stats.total_tokens, stats.total_cost
    ));
    out.push_str(&format!(
        "budget:   [{}] {:.1}% (${:.2} of ${:.2})\n",
        budget_bar(dashboard.budget_percentage),
        dashboard.budget_percentage,
        stats.current_month_usage,
        stats.monthly_budget
    ));

    let series = dashboard.usage_series();
    if !series.is_empty() {
        out.push_str("daily usage:\n");
        for ((label, cost), requests) in series.labels.iter().zip(&series.costs).zip(&series.requests) {
            out.push_str(&format!("  {label}  ${cost:.4}  {requests} requests\n"));
        }
    }

    if let Some(warning) = dashboard.budget_warning() {
        out.push_str(&format!("{warning}\n"));
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn budget_bar(percentage: f64) -> String {
    let filled = (progress_width(percentage) / 100.0 * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.1} GB", bytes / GIB)
    } else {
        format!("{:.0} MB", bytes / MIB)
    }
}
