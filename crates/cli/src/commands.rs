use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::cli::{
    AckArgs, AckKind, AddArgs, ClarifyArgs, CliCommand, DueArgs, IdsArgs, ListArgs, MoveArgs,
    RemindArgs, SettingsArgs,
};
use crate::config::Session;
use crate::delivery::TerminalSink;
use crate::model::{Task, TaskStatus};
use ordo_core::error::{CoreError, ErrorKind};
use ordo_core::moves::{MoveIntent, MoveMode, MoveResolution};
use ordo_core::notifier::{NotificationSink, Notifier};
use ordo_core::services::{ClarifyOutcome, TasksService};
use ordo_core::settings::{JsonSettingsStore, SettingsStore};

pub async fn execute<W: Write>(session: &Session, command: CliCommand, writer: W) -> Result<()> {
    execute_with_sink(session, command, writer, Arc::new(TerminalSink::stdout())).await
}

/// Like [`execute`], delivering notifications to `sink` instead of stdout.
pub async fn execute_with_sink<W: Write>(
    session: &Session,
    command: CliCommand,
    mut writer: W,
    sink: Arc<dyn NotificationSink>,
) -> Result<()> {
    let service = TasksService::open(&session.config, session.engine.clone())
        .context("failed to open task store")?;
    let service = &service;

    match command {
        CliCommand::Add(args) => handle_add(session, service, &args, &mut writer).await,
        CliCommand::List(args) => handle_list(session, service, &args, &mut writer).await,
        CliCommand::Clarify(args) => handle_clarify(session, service, &args, &mut writer).await,
        CliCommand::Complete(args) => {
            let summary = run_batch(Verb::Completed, &args, |id| async move {
                service.complete(&session.owner, &id).await.map(|_| ())
            })
            .await?;
            summary.write_to(&mut writer)
        }
        CliCommand::Delete(args) => {
            let summary = run_batch(Verb::Deleted, &args, |id| async move {
                service.delete_task(&session.owner, &id).await.map(|_| ())
            })
            .await?;
            summary.write_to(&mut writer)
        }
        CliCommand::Move(args) => handle_move(session, service, &args, &mut writer).await,
        CliCommand::Due(args) => handle_due(session, service, &args, &mut writer).await,
        CliCommand::Remind(args) => handle_remind(session, service, &args, &mut writer).await,
        CliCommand::Reminders(args) => {
            let reminders = service.reminders(&session.owner, &args.task_id).await?;
            if reminders.is_empty() {
                writeln!(writer, "No reminders")?;
            }
            for reminder in reminders {
                writeln!(
                    writer,
                    "{}  {}{}",
                    reminder.id,
                    reminder.reminder_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    if reminder.notified { "  (acknowledged)" } else { "" }
                )?;
            }
            Ok(())
        }
        CliCommand::Unremind(args) => {
            service
                .remove_reminder(&session.owner, &args.reminder_id)
                .await?;
            writeln!(writer, "Removed reminder {}", args.reminder_id)?;
            Ok(())
        }
        CliCommand::Ack(args) => {
            let notifier = build_notifier(session, service, sink).await?;
            handle_ack(&notifier, &args, &mut writer).await
        }
        CliCommand::Check => {
            let notifier = build_notifier(session, service, sink).await?;
            let events = notifier.tick(Utc::now()).await?;
            writeln!(writer, "{}", SummaryLine::new(Verb::Notified, events.len()))?;
            Ok(())
        }
        CliCommand::Watch => {
            let notifier = Arc::new(build_notifier(session, service, sink).await?);
            writeln!(
                writer,
                "Watching due dates every {:?} and reminders every {:?} (Ctrl-C to stop)",
                session.engine.due_poll_interval, session.engine.reminder_poll_interval
            )?;
            writer.flush()?;
            watch_until_interrupted(notifier, tokio::signal::ctrl_c()).await
        }
        CliCommand::Settings(args) => handle_settings(session, &args, &mut writer).await,
    }
}

async fn handle_add<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &AddArgs,
    mut writer: W,
) -> Result<()> {
    let input = args.to_capture(Utc::now())?;
    let task = service.capture(&session.owner, input).await?;
    writeln!(writer, "Captured {} ({})", task.title, task.id)?;
    Ok(())
}

async fn handle_list<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &ListArgs,
    mut writer: W,
) -> Result<()> {
    if let Some(status) = args.status {
        let tasks = match status {
            TaskStatus::Inbox => service.inbox(&session.owner).await?,
            other => service.tasks_by_status(&session.owner, other).await?,
        };
        if tasks.is_empty() {
            writeln!(writer, "No {} tasks", status)?;
        }
        for task in &tasks {
            writeln!(writer, "{}", flat_line(task))?;
        }
        return Ok(());
    }

    let mut board = service.board(&session.owner).await?;
    if args.all {
        board.expand_all();
    }
    for id in &args.expand {
        board.expand(id.clone());
    }
    let projection = board.projection();
    let mut empty = true;
    for node in projection.iter() {
        empty = false;
        let marker = match (projection.has_children(node.id), projection.is_expanded(node.id)) {
            (false, _) => ' ',
            (true, true) => '-',
            (true, false) => '+',
        };
        writeln!(
            writer,
            "{}{} {}",
            "  ".repeat(node.depth),
            marker,
            flat_line(node.task)
        )?;
    }
    if empty {
        writeln!(writer, "No tasks")?;
    }
    Ok(())
}

fn flat_line(task: &Task) -> String {
    let mut line = format!("{} [{}] {}", task.id, task.status, task.title);
    if !task.contexts.is_empty() {
        let contexts: Vec<String> = task.contexts.iter().map(|c| format!("@{}", c)).collect();
        line.push_str(&format!(" {}", contexts.join(" ")));
    }
    if let Some(due) = task.due_date {
        line.push_str(&format!(
            " due:{}",
            due.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ));
    }
    if let Some(who) = &task.waiting_on {
        line.push_str(&format!(" waiting-on:{}", who));
    }
    line
}

async fn handle_clarify<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &ClarifyArgs,
    mut writer: W,
) -> Result<()> {
    let disposition = args.to_disposition(Utc::now())?;
    match service.clarify(&session.owner, &args.id, disposition).await? {
        ClarifyOutcome::Updated(task) => {
            writeln!(writer, "Clarified {} as {}", task.title, task.status)?;
        }
        ClarifyOutcome::Removed(outcome) => {
            writeln!(writer, "Trashed {}", outcome.id)?;
            if !outcome.orphaned.is_empty() {
                writeln!(
                    writer,
                    "Moved {} subtask{} to the top level",
                    outcome.orphaned.len(),
                    plural(outcome.orphaned.len())
                )?;
            }
        }
    }
    Ok(())
}

async fn handle_move<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &MoveArgs,
    mut writer: W,
) -> Result<()> {
    let mut board = service.board(&session.owner).await?;
    let intent = MoveIntent::new(args.dragged.clone(), args.target.clone(), args.offset);
    match service.move_task(&mut board, &intent).await? {
        MoveResolution::Cancelled => writeln!(writer, "Move cancelled")?,
        MoveResolution::Commit(plan) => {
            let place = match (&plan.mode, &plan.new_parent) {
                (MoveMode::Nest, Some(parent)) => format!("nested under {}", parent),
                (_, Some(parent)) => format!("reordered under {}", parent),
                (_, None) => "reordered at the top level".to_string(),
            };
            writeln!(writer, "Moved {} ({}, position {})", plan.task_id, place, plan.position)?;
            if !plan.rebalanced.is_empty() {
                writeln!(
                    writer,
                    "Respaced {} sibling{}",
                    plan.rebalanced.len(),
                    plural(plan.rebalanced.len())
                )?;
            }
        }
    }
    Ok(())
}

async fn handle_due<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &DueArgs,
    mut writer: W,
) -> Result<()> {
    let due = match (&args.when, args.clear) {
        (_, true) | (None, _) => None,
        (Some(raw), false) => Some(crate::cli::parse_when(raw, Utc::now())?),
    };
    let task = service.set_due_date(&session.owner, &args.id, due).await?;
    match task.due_date {
        Some(due) => writeln!(
            writer,
            "{} is due {}",
            task.title,
            due.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        )?,
        None => writeln!(writer, "Cleared due date of {}", task.title)?,
    }
    Ok(())
}

async fn handle_remind<W: Write>(
    session: &Session,
    service: &TasksService,
    args: &RemindArgs,
    mut writer: W,
) -> Result<()> {
    let when = crate::cli::parse_when(&args.when, Utc::now())?;
    let reminder = service
        .add_reminder(&session.owner, &args.task_id, when)
        .await?;
    writeln!(
        writer,
        "Reminder {} set for {}",
        reminder.id,
        reminder
            .reminder_time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    )?;
    Ok(())
}

async fn handle_ack<W: Write>(notifier: &Notifier, args: &AckArgs, mut writer: W) -> Result<()> {
    let changed = match args.kind {
        AckKind::Task => notifier.acknowledge_task(&args.id).await?,
        AckKind::Reminder => notifier.acknowledge_reminder(&args.id).await?,
    };
    if changed {
        writeln!(writer, "Acknowledged {}", args.id)?;
    } else {
        writeln!(writer, "{} was already acknowledged", args.id)?;
    }
    Ok(())
}

async fn handle_settings<W: Write>(
    session: &Session,
    args: &SettingsArgs,
    mut writer: W,
) -> Result<()> {
    let store = JsonSettingsStore::from_config(&session.config);
    let mut settings = store.load().await?;
    if !args.is_empty() {
        if let Some(sound) = args.sound {
            settings.sound_enabled = sound;
        }
        if let Some(volume) = args.volume {
            settings.volume = volume;
        }
        if let Some(permission) = args.permission {
            settings.permission = permission;
        }
        store.save(&settings).await?;
    }
    writeln!(writer, "sound: {}", if settings.sound_enabled { "on" } else { "off" })?;
    writeln!(writer, "volume: {:.2}", settings.volume)?;
    writeln!(writer, "permission: {}", settings.permission)?;
    Ok(())
}

async fn build_notifier(
    session: &Session,
    service: &TasksService,
    sink: Arc<dyn NotificationSink>,
) -> Result<Notifier> {
    let settings_store = Arc::new(JsonSettingsStore::from_config(&session.config));
    let notifier = Notifier::load(
        session.owner.clone(),
        service.store(),
        sink,
        settings_store,
        &session.engine,
    )
    .await
    .context("failed to load notification settings")?;
    Ok(notifier)
}

/// Run the pollers until `interrupt` resolves.
async fn watch_until_interrupted<F>(notifier: Arc<Notifier>, interrupt: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move { notifier.run(shutdown_rx).await })
    };
    interrupt.await.context("failed to listen for Ctrl-C")?;
    info!("interrupted; stopping notifier");
    // Fails only when the runner already exited; its result is awaited below.
    shutdown_tx.send(true).ok();
    runner.await??;
    Ok(())
}

async fn run_batch<F, Fut>(verb: Verb, args: &IdsArgs, mut op: F) -> Result<BatchSummary>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), CoreError>>,
{
    let mut summary = BatchSummary::new(verb);
    for id in &args.ids {
        match op(id.clone()).await {
            Ok(()) => summary.done += 1,
            Err(err) => match err.kind() {
                ErrorKind::NotFound => summary.missing.push(id.clone()),
                ErrorKind::Validation => summary.skipped.push(format!("{} ({})", id, err)),
                ErrorKind::Conflict | ErrorKind::TransientStore => return Err(err.into()),
            },
        }
    }
    Ok(summary)
}

struct BatchSummary {
    verb: Verb,
    done: usize,
    missing: Vec<String>,
    skipped: Vec<String>,
}

impl BatchSummary {
    fn new(verb: Verb) -> Self {
        Self {
            verb,
            done: 0,
            missing: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", SummaryLine::new(self.verb, self.done))?;
        if !self.missing.is_empty() {
            writeln!(writer, "Not found: {}", self.missing.join(", "))?;
        }
        if !self.skipped.is_empty() {
            writeln!(writer, "Skipped: {}", self.skipped.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Completed,
    Deleted,
    Notified,
}

struct SummaryLine {
    verb: Verb,
    count: usize,
}

impl SummaryLine {
    fn new(verb: Verb, count: usize) -> Self {
        Self { verb, count }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.verb, self.count) {
            (Verb::Completed, 0) => write!(f, "No tasks completed"),
            (Verb::Deleted, 0) => write!(f, "No tasks deleted"),
            (Verb::Notified, 0) => write!(f, "Nothing due"),
            (Verb::Completed, n) => write!(f, "Completed {} task{}", n, plural(n)),
            (Verb::Deleted, n) => write!(f, "Deleted {} task{}", n, plural(n)),
            (Verb::Notified, n) => write!(f, "Sent {} notification{}", n, plural(n)),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
