//! User-facing text for turns, progress and summaries.

use std::fmt::Write;

use chrono::{Duration, NaiveTime};
use theater_core::Persona;
use theater_core::util::truncate_chars;

use crate::registry::GlobalSummary;
use crate::session::{LoopOutcome, LoopState, SessionSummary};

const MAX_REASON_CHARS: usize = 300;

/// `[HH:MM] <emoji> <name>: <text>`
#[must_use]
pub fn turn_line(persona: &Persona, text: &str, at: NaiveTime) -> String {
    let stamp = at.format("%H:%M");
    if persona.emoji.is_empty() {
        format!("[{stamp}] {}: {text}", persona.name)
    } else {
        format!("[{stamp}] {} {}: {text}", persona.emoji, persona.name)
    }
}

#[must_use]
pub fn started(opener: &str) -> String {
    format!("🎬 The conversation has started!\n\n💭 First line: '{opener}'\n\n🍿 Sit back and enjoy!")
}

#[must_use]
pub fn human_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

fn pace(summary: &SessionSummary) -> String {
    match (summary.elapsed, summary.turns_per_minute) {
        (Some(elapsed), Some(rate)) => {
            format!("{} ({rate:.1} turns/min)", human_duration(elapsed))
        }
        (Some(elapsed), None) => human_duration(elapsed),
        _ => "-".to_string(),
    }
}

#[must_use]
pub fn progress(summary: &SessionSummary) -> String {
    format!(
        "🎉 {} turns reached! The conversation is flowing nicely.\n⏱️ {}",
        summary.turn_count,
        pace(summary)
    )
}

/// Closing message for a finished run.
#[must_use]
pub fn final_summary(summary: &SessionSummary, outcome: &LoopOutcome) -> String {
    let head = match outcome {
        LoopOutcome::Completed => format!(
            "🏁 The conversation reached its limit of {} turns!",
            summary.turn_limit
        ),
        LoopOutcome::Stopped => "🎭 The conversation has been stopped!".to_string(),
        LoopOutcome::Failed {
            reason,
            auth_rejected,
        } => {
            let mut text = format!(
                "❌ The conversation stopped after repeated failures.\nReason: {}",
                truncate_chars(reason, MAX_REASON_CHARS)
            );
            if *auth_rejected {
                text.push_str("\n🔑 The API key was rejected. Set a new one with /setkey.");
            }
            text
        }
    };
    format!(
        "{head}\n\n📊 {} turns in total\n⏱️ {}",
        summary.turn_count,
        pace(summary)
    )
}

fn state_label(summary: &SessionSummary) -> &'static str {
    match summary.state {
        LoopState::Running => "running",
        LoopState::Stopping => "stopping",
        LoopState::Idle => match summary.last_outcome {
            None => "idle",
            Some(LoopOutcome::Completed) => "completed",
            Some(LoopOutcome::Stopped) => "stopped",
            Some(LoopOutcome::Failed { .. }) => "failed",
        },
    }
}

#[must_use]
pub fn session_status(summary: &SessionSummary) -> String {
    let mut text = format!(
        "📋 Status: {}\n🔑 API key: {}\n💬 Turns: {}/{}\n🧠 History: {} entries\n⏱️ {}",
        state_label(summary),
        if summary.has_credential { "set" } else { "missing" },
        summary.turn_count,
        summary.turn_limit,
        summary.history_len,
        pace(summary)
    );
    if let Some(tier) = &summary.last_tier {
        let _ = write!(text, "\n🤖 Last model: {tier}");
    }
    for (tier, counter) in &summary.tier_stats {
        let _ = write!(
            text,
            "\n   • {tier}: {}/{} succeeded",
            counter.successes, counter.attempts
        );
    }
    text
}

#[must_use]
pub fn global_status(global: &GlobalSummary) -> String {
    let mut text = format!(
        "🌐 Sessions: {} ({} active",
        global.total_sessions, global.active_sessions
    );
    if !global.stopping.is_empty() {
        let _ = write!(text, ", {} stopping", global.stopping.len());
    }
    let _ = write!(text, ")\n💬 Total turns: {}", global.total_turns);
    for (tier, counter) in &global.tier_stats {
        let _ = write!(
            text,
            "\n   • {tier}: {}/{} succeeded",
            counter.successes, counter.attempts
        );
    }
    for summary in &global.active {
        let _ = write!(
            text,
            "\n▶️ {}: {}/{} turns, {}",
            summary.key,
            summary.turn_count,
            summary.turn_limit,
            pace(summary)
        );
    }
    for summary in &global.stopping {
        let _ = write!(
            text,
            "\n⏹️ {}: stopping after {} turns",
            summary.key, summary.turn_count
        );
    }
    text
}
