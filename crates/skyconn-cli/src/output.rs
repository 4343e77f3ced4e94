//! Output formatting helpers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print an expiry as a timestamp plus how long is left.
pub fn expiry(label: &str, at: Option<DateTime<Utc>>) {
    let Some(at) = at else {
        field(label, "never reported");
        return;
    };
    let remaining = at - Utc::now();
    let note = if remaining.num_seconds() <= 0 {
        "expired".red().to_string()
    } else if remaining.num_hours() > 0 {
        format!("in {}h{:02}m", remaining.num_hours(), remaining.num_minutes() % 60)
    } else {
        format!("in {}m", remaining.num_minutes().max(1))
    };
    field(label, &format!("{} ({})", at.to_rfc3339(), note));
}

/// Print a value as compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
