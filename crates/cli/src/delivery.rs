use std::io::{self, Write};

use anyhow::Result;
use chrono::Local;
use parking_lot::Mutex;

use crate::model::{NotificationEvent, TriggerKind};
use ordo_core::notifier::NotificationSink;
use ordo_core::settings::NotificationSettings;

const BELL: char = '\u{7}';

/// Prints each notification as one line, ringing the terminal bell when sound is on.
pub struct TerminalSink<W> {
    out: Mutex<W>,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> NotificationSink for TerminalSink<W> {
    fn deliver(&self, event: &NotificationEvent, settings: &NotificationSettings) -> Result<()> {
        let mut out = self.out.lock();
        if settings.plays_sound() {
            write!(out, "{}", BELL)?;
        }
        writeln!(out, "{}", format_event(event))?;
        out.flush()?;
        Ok(())
    }
}

pub fn format_event(event: &NotificationEvent) -> String {
    let when = event
        .trigger_time
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    match event.trigger {
        TriggerKind::Due => format!("[due {}] {} ({})", when, event.title, event.task_id),
        TriggerKind::Reminder => format!(
            "[reminder {}] {} ({}; reminder {})",
            when,
            event.title,
            event.task_id,
            event.reminder_id.as_deref().unwrap_or("-")
        ),
    }
}
