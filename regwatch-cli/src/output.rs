#[cfg(feature = "colored-output")]
use colored::*;
use regwatch::{
    AlertSink, ConnectionStatus, HistoryRecord, Notification, NotificationEvent,
    NotificationSettings,
};
use serde_json::json;

use crate::cli::OutputFormat;
use crate::error::Result;

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_notification(
        &self,
        notification: &Notification,
        format: OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_event_pretty(
                notification.event(),
                Some(notification.is_read()),
            )),
            OutputFormat::Json => Ok(serde_json::to_string(notification)?),
        }
    }

    pub fn format_history(&self, records: &[HistoryRecord], format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            OutputFormat::Pretty => {
                if records.is_empty() {
                    return Ok("No changes recorded.".to_string());
                }
                let lines: Vec<String> = records
                    .iter()
                    .map(|record| self.format_event_pretty(&NotificationEvent::from(record.clone()), None))
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }

    pub fn format_settings(
        &self,
        settings: &NotificationSettings,
        format: OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(settings)?),
            OutputFormat::Pretty => Ok(format!(
                "{}\n  {}: {}\n  {}: {}",
                self.colorize("Notification Settings:", &Color::Green, true),
                self.colorize("Show toasts", &Color::Yellow, false),
                settings.show_toasts,
                self.colorize("Only significant", &Color::Yellow, false),
                settings.show_only_significant,
            )),
        }
    }

    pub fn format_status(&self, status: &ConnectionStatus, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => json!({
                "status": "connection",
                "connected": status.is_connected(),
                "message": status.to_string(),
            })
            .to_string(),
            OutputFormat::Pretty => {
                let color = if status.is_connected() {
                    Color::Green
                } else {
                    Color::Yellow
                };
                format!("-- {}", self.colorize(&status.to_string(), &color, false))
            }
        }
    }

    fn format_event_pretty(&self, event: &NotificationEvent, is_read: Option<bool>) -> String {
        let marker = match is_read {
            Some(false) => self.colorize("●", &Color::Cyan, true),
            _ => " ".to_string(),
        };
        let significance = if event.is_significant {
            self.colorize("!", &Color::Yellow, true)
        } else {
            " ".to_string()
        };
        let when = event
            .parsed_timestamp()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| event.timestamp.clone());

        format!(
            "{marker}{significance} {} {} [{} {}]\n     {}",
            self.colorize(&when, &Color::Blue, false),
            self.colorize(&event.title(), &Color::Green, true),
            event.entity_type,
            event.entity_id,
            event.description(),
        )
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

/// Prints each new notification to stdout.
pub struct PrinterSink {
    output: OutputManager,
    format: OutputFormat,
}

impl PrinterSink {
    pub fn new(output: OutputManager, format: OutputFormat) -> Self {
        Self { output, format }
    }
}

impl AlertSink for PrinterSink {
    fn alert(&self, notification: &Notification) {
        match self.output.format_notification(notification, self.format) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to format notification"),
        }
    }
}
