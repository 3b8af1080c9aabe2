use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{value_parser, ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::capture::CaptureInput;
use crate::model::TaskStatus;
use ordo_core::clarify::{ActionPlan, Disposition};
use ordo_core::settings::Permission;

pub const DEFAULT_OWNER: &str = "local";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordo",
    version,
    about = "Capture, clarify and arrange tasks as an outline, with due-date and reminder alerts.",
    after_help = "Examples:\n  ordo add Call the bank about the card\n  ordo clarify 01HX... next --context phone --due +2d\n  ordo move 01HX... 01HY... --offset 60\n  ordo watch --log debug"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Whose tasks to operate on
    #[arg(long, value_name = "OWNER", default_value = DEFAULT_OWNER, global = true)]
    pub owner: String,

    /// Override the tracing filter (e.g. "info", "ordo_core=debug")
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Capture a new item into the inbox
    Add(AddArgs),
    /// Show the task outline, or a flat list for one status
    List(ListArgs),
    /// Decide what an inbox item is
    Clarify(ClarifyArgs),
    /// Mark one or more tasks completed
    Complete(IdsArgs),
    /// Drop a task onto another one (reorder, or nest with --offset above the threshold)
    Move(MoveArgs),
    /// Delete one or more tasks by id; children move to the top level
    Delete(IdsArgs),
    /// Set or clear a task's due date
    Due(DueArgs),
    /// Add a reminder to a task
    Remind(RemindArgs),
    /// List a task's reminders
    Reminders(TaskIdArgs),
    /// Remove a reminder by id
    Unremind(ReminderIdArgs),
    /// Dismiss a due-date alert or reminder
    Ack(AckArgs),
    /// Run one notification check and exit
    Check,
    /// Keep checking for due tasks and reminders until Ctrl-C
    Watch,
    /// Show or change notification settings
    Settings(SettingsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,

    /// Optional detailed notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Capture as the last child of this task
    #[arg(long, value_name = "ID")]
    pub parent: Option<String>,

    /// Due date (RFC 3339, YYYY-MM-DD, YYYY-MM-DDTHH:MM, now, +30m, +2h, +3d)
    #[arg(long = "due", value_name = "WHEN")]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Expand these tasks (comma-separated or repeated flag)
    #[arg(long, value_name = "ID", value_delimiter = ',', action = ArgAction::Append)]
    pub expand: Vec<String>,

    /// Expand every task
    #[arg(long)]
    pub all: bool,

    /// Flat list of tasks with this status instead of the outline
    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarifyChoice {
    Trash,
    Someday,
    Reference,
    Next,
    Waiting,
}

#[derive(Args, Debug, Clone)]
pub struct ClarifyArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(value_enum, value_name = "DISPOSITION")]
    pub choice: ClarifyChoice,

    /// Project the action belongs to
    #[arg(long)]
    pub project: Option<String>,

    /// Contexts (comma-separated or repeated flag; '@' prefix optional)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub context: Vec<String>,

    /// Priority (0-3)
    #[arg(long, value_parser = value_parser!(u8).range(0..=3))]
    pub priority: Option<u8>,

    /// Due date (same formats as `add --due`)
    #[arg(long = "due", value_name = "WHEN")]
    pub due: Option<String>,

    /// Person the action is delegated to (required for `waiting`)
    #[arg(long = "waiting-on", value_name = "WHO")]
    pub waiting_on: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IdsArgs {
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    /// Task being dragged
    #[arg(value_name = "DRAGGED")]
    pub dragged: String,

    /// Task it was dropped on; omit to cancel the move
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// Horizontal drag distance; above the nest threshold the task becomes a child
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset: f64,
}

#[derive(Args, Debug, Clone)]
pub struct DueArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    /// New due date; omit together with --clear to remove it
    #[arg(value_name = "WHEN", required_unless_present = "clear")]
    pub when: Option<String>,

    #[arg(long, conflicts_with = "when")]
    pub clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RemindArgs {
    #[arg(value_name = "ID")]
    pub task_id: String,

    /// When to remind (same formats as `add --due`)
    #[arg(value_name = "WHEN")]
    pub when: String,
}

#[derive(Args, Debug, Clone)]
pub struct TaskIdArgs {
    #[arg(value_name = "ID")]
    pub task_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ReminderIdArgs {
    #[arg(value_name = "REMINDER_ID")]
    pub reminder_id: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Task,
    Reminder,
}

#[derive(Args, Debug, Clone)]
pub struct AckArgs {
    #[arg(value_enum, value_name = "KIND")]
    pub kind: AckKind,

    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Play a sound (terminal bell) with notifications
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub sound: Option<bool>,

    /// Notification volume between 0 and 1
    #[arg(long, value_name = "LEVEL")]
    pub volume: Option<f32>,

    /// Notification permission state
    #[arg(long, value_enum)]
    pub permission: Option<Permission>,
}

impl SettingsArgs {
    pub fn is_empty(&self) -> bool {
        self.sound.is_none() && self.volume.is_none() && self.permission.is_none()
    }
}

impl AddArgs {
    pub fn to_capture(&self, now: DateTime<Utc>) -> Result<CaptureInput> {
        Ok(CaptureInput {
            text: self.text.clone(),
            notes: self.notes.clone(),
            parent_id: self.parent.clone(),
            due_date: self.due.as_deref().map(|raw| parse_when(raw, now)).transpose()?,
        })
    }
}

impl ClarifyArgs {
    pub fn to_disposition(&self, now: DateTime<Utc>) -> Result<Disposition> {
        let plan = || -> Result<ActionPlan> {
            Ok(ActionPlan {
                project_id: self.project.clone(),
                contexts: self.context.clone(),
                priority: self.priority,
                due_date: self.due.as_deref().map(|raw| parse_when(raw, now)).transpose()?,
                delegated_to: self.waiting_on.clone(),
            })
        };
        match self.choice {
            ClarifyChoice::Trash => Ok(Disposition::Trash),
            ClarifyChoice::Someday => Ok(Disposition::Someday),
            ClarifyChoice::Reference => Ok(Disposition::Reference),
            ClarifyChoice::Next => {
                if self.waiting_on.is_some() {
                    bail!("--waiting-on only applies to `waiting`");
                }
                Ok(Disposition::Actionable(plan()?))
            }
            ClarifyChoice::Waiting => {
                if self.waiting_on.as_deref().map_or(true, |who| who.trim().is_empty()) {
                    bail!("`waiting` requires --waiting-on <WHO>");
                }
                Ok(Disposition::Actionable(plan()?))
            }
        }
    }
}

/// Parse a point in time. Dates without a zone are local time.
pub fn parse_when(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Some(relative) = trimmed.strip_prefix('+') {
        let offset = parse_offset(relative)?;
        return now
            .checked_add_signed(offset)
            .ok_or_else(|| anyhow!("Relative time '+{}' is too far in the future", relative));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("Unrecognised time '{}'", raw))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("'{}' does not exist in the local time zone", raw))
}

fn parse_offset(raw: &str) -> Result<Duration> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Relative time '+{}' needs a unit (m, h, d, w)", raw))?;
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| anyhow!("Relative time '+{}' needs a number", raw))?;
    let offset = match unit {
        "m" | "min" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        other => return Err(anyhow!("Unknown time unit '{}' (expected m, h, d or w)", other)),
    };
    offset.ok_or_else(|| anyhow!("Relative time '+{}' is out of range", raw))
}
