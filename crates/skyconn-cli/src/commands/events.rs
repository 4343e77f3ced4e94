//! Events command implementation.

use std::pin::Pin;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use serde_json::Value;

use skyconn_core::{EventFeed, EventKind, MessageKind, RawEvent};

use crate::cli::GlobalArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Output events as JSON, exactly as received
    #[arg(long)]
    pub json: bool,

    /// Acknowledge events that ask for it
    #[arg(long)]
    pub ack: bool,

    /// Also watch these contacts' presence (e.g. "live:alice")
    #[arg(long = "presence", value_name = "CONTACT")]
    pub presence: Vec<String>,

    /// Stop after this many events
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn run(args: EventsArgs, global: &GlobalArgs) -> Result<()> {
    let connection = session::resume(global).await?;

    if !args.presence.is_empty() {
        connection
            .subscribe_presence(&args.presence)
            .await
            .context("Failed to subscribe to presence")?;
    }

    eprintln!("{}", "Listening for events...".dimmed());
    eprintln!("{}", "Press Ctrl+C to stop.".dimmed());
    eprintln!();

    let mut stream: Pin<Box<dyn EventFeed>> = Box::pin(connection.events());
    let mut seen = 0usize;

    while let Some(result) = stream.next().await {
        match result {
            Ok(event) => {
                if args.ack
                    && let Err(e) = connection.ack(&event).await
                {
                    output::error(&format!("Failed to acknowledge event: {}", e));
                }
                if args.json {
                    output::json(event.as_value())?;
                } else {
                    print_event(&event);
                }
                seen += 1;
                if args.limit.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            Err(e) => {
                eprintln!("{} {}", "ERROR".red(), e);
            }
        }
    }

    Ok(())
}

fn print_event(event: &RawEvent) {
    let resource = event.resource().unwrap_or(&Value::Null);
    let text = |key: &str| resource.get(key).and_then(Value::as_str).unwrap_or("");
    let time = event.time().unwrap_or("");

    match event.kind() {
        EventKind::NewMessage => {
            let label = match event.message_kind() {
                Some(MessageKind::Posted) => "MESSAGE".green(),
                Some(MessageKind::Edited) => "EDITED".yellow(),
                Some(MessageKind::Typing) => "TYPING".dimmed(),
                Some(MessageKind::Call) => "CALL".magenta(),
                _ => "MESSAGE".normal(),
            };
            println!(
                "{} {} {} {}",
                label,
                time.dimmed(),
                sender(text("from")),
                preview(text("content"))
            );
        }
        EventKind::UserPresence => {
            println!(
                "{} {} {} {}",
                "PRESENCE".blue(),
                time.dimmed(),
                sender(text("selfLink")),
                text("status")
            );
        }
        EventKind::EndpointPresence => {
            println!(
                "{} {} {}",
                "ENDPOINT".cyan(),
                time.dimmed(),
                sender(text("selfLink"))
            );
        }
        EventKind::ConversationUpdate => {
            println!("{} {} {}", "CONVERSATION".magenta(), time.dimmed(), text("id"));
        }
        EventKind::ThreadUpdate => {
            println!("{} {} {}", "THREAD".yellow(), time.dimmed(), text("id"));
        }
        EventKind::Other => {
            eprintln!(
                "{} {}",
                "UNKNOWN".dimmed(),
                event.resource_type().unwrap_or("(no resourceType)")
            );
        }
    }
}

/// The contact id at the end of a `.../contacts/8:alice` style link.
fn sender(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

/// First line of a message body, shortened for the terminal.
fn preview(content: &str) -> String {
    const MAX: usize = 80;
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_takes_last_link_segment() {
        assert_eq!(
            sender("https://h/v1/users/ME/contacts/8:alice"),
            "8:alice"
        );
        assert_eq!(sender("8:bob"), "8:bob");
        assert_eq!(sender(""), "");
    }

    #[test]
    fn preview_keeps_first_line_and_truncates() {
        assert_eq!(preview("hello\nworld"), "hello");
        let long = "x".repeat(100);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 81);
        assert!(short.ends_with('…'));
    }
}
