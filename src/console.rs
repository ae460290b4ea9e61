//! Interactive control loop.
//!
//! A reader thread forwards input lines over a channel; the loop executes them
//! between scheduler ticks so every command and tick runs on one thread.
use std::{
    io::{self, BufRead, Write},
    path::Path,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    activity::ActivityLog,
    cli::SlotArg,
    constants::DEFAULT_LOG_LINES,
    error::SupervisorError,
    pool::SupervisorPool,
    scheduler::PollScheduler,
    status::StatusRenderer,
    vcs::UpdateOutcome,
};

/// Upper bound on one wait so a shutdown request is noticed promptly.
const MAX_IDLE: Duration = Duration::from_millis(200);

const HELP: &str = "\
Commands (slots are 1-based):
  status                    show every slot
  start|stop|restart <slot>
  refresh [slot]
  configure <slot> <path>
  rename <slot> <name>
  update <slot>
  log [lines]
  help
  quit";

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Start(SlotArg),
    Stop(SlotArg),
    Restart(SlotArg),
    Refresh(Option<SlotArg>),
    Configure(SlotArg, String),
    Rename(SlotArg, String),
    Update(SlotArg),
    Log(usize),
    Help,
    Quit,
}

fn slot_of(word: Option<&str>, verb: &str) -> Result<SlotArg, String> {
    word.ok_or_else(|| format!("usage: {verb} <slot>"))?.parse()
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let mut words = rest.split_whitespace();

        match verb.to_ascii_lowercase().as_str() {
            "status" | "list" | "ls" => Ok(Self::Status),
            "start" => Ok(Self::Start(slot_of(words.next(), "start")?)),
            "stop" => Ok(Self::Stop(slot_of(words.next(), "stop")?)),
            "restart" => Ok(Self::Restart(slot_of(words.next(), "restart")?)),
            "update" => Ok(Self::Update(slot_of(words.next(), "update")?)),
            "refresh" => match words.next() {
                Some(word) => Ok(Self::Refresh(Some(word.parse()?))),
                None => Ok(Self::Refresh(None)),
            },
            "configure" | "rename" => {
                let (slot, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| format!("usage: {verb} <slot> <value>"))?;
                let slot = slot.parse()?;
                let value = value.trim().to_string();
                if verb.eq_ignore_ascii_case("configure") {
                    Ok(Self::Configure(slot, value))
                } else {
                    Ok(Self::Rename(slot, value))
                }
            }
            "log" => match words.next() {
                Some(word) => word
                    .parse()
                    .map(Self::Log)
                    .map_err(|_| format!("invalid line count '{word}'")),
                None => Ok(Self::Log(DEFAULT_LOG_LINES)),
            },
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "" => Err("empty command".into()),
            other => Err(format!("unknown command '{other}' (try 'help')")),
        }
    }
}

/// Runs commands against a pool while driving its scheduler.
pub struct Console<'a> {
    pool: &'a SupervisorPool,
    scheduler: PollScheduler,
    renderer: StatusRenderer,
    activity: Option<ActivityLog>,
}

impl<'a> Console<'a> {
    pub fn new(
        pool: &'a SupervisorPool,
        scheduler: PollScheduler,
        renderer: StatusRenderer,
        activity: Option<ActivityLog>,
    ) -> Self {
        Self {
            pool,
            scheduler,
            renderer,
            activity,
        }
    }

    /// Reads commands from `input` until it ends, `quit` is entered or
    /// `shutdown` is raised.
    pub fn run<R, W>(mut self, input: R, out: &mut W, shutdown: Arc<AtomicBool>) -> io::Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let (tx, rx) = mpsc::channel::<String>();
        thread::Builder::new()
            .name("console-input".into())
            .spawn(move || {
                for line in input.lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!("Failed to read console input: {err}");
                            break;
                        }
                    }
                }
            })?;

        self.scheduler.catch_up(self.pool, Instant::now());
        write!(out, "{}", self.render_status())?;
        out.flush()?;

        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            self.scheduler.run_due(self.pool, now);

            let wait = self
                .scheduler
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .unwrap_or(MAX_IDLE)
                .min(MAX_IDLE);

            match rx.recv_timeout(wait) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<ConsoleCommand>() {
                        Ok(ConsoleCommand::Quit) => break,
                        Ok(command) => {
                            let reply = self.execute(command);
                            writeln!(out, "{}", reply.trim_end())?;
                        }
                        Err(err) => writeln!(out, "{err}")?,
                    }
                    out.flush()?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Console input closed");
                    break;
                }
            }
        }

        Ok(())
    }

    fn render_status(&self) -> String {
        match self.pool.snapshots() {
            Ok(records) => self
                .renderer
                .render_pool(&records, Some(&self.scheduler.board())),
            Err(err) => format!("error: {err}"),
        }
    }

    /// Executes one command and returns the text to show.
    pub fn execute(&mut self, command: ConsoleCommand) -> String {
        let result = match command {
            ConsoleCommand::Status => return self.render_status(),
            ConsoleCommand::Help => return HELP.to_string(),
            ConsoleCommand::Quit => return String::new(),
            ConsoleCommand::Log(lines) => return self.render_log(lines),
            ConsoleCommand::Start(slot) => self.pool.start(slot.index()).map(|handle| {
                self.scheduler.arm_elapsed(slot.index(), Instant::now());
                format!("Bot {slot} started (PID {handle})")
            }),
            ConsoleCommand::Restart(slot) => self.pool.restart(slot.index()).map(|handle| {
                self.scheduler.arm_elapsed(slot.index(), Instant::now());
                format!("Bot {slot} restarted (PID {handle})")
            }),
            ConsoleCommand::Stop(slot) => self
                .pool
                .stop(slot.index())
                .map(|count| format!("Bot {slot} stopped ({count} process(es) signalled)")),
            ConsoleCommand::Refresh(Some(slot)) => self
                .pool
                .refresh(slot.index())
                .map(|state| format!("Bot {slot} is {state}")),
            ConsoleCommand::Refresh(None) => {
                for (slot, result) in self.pool.refresh_all() {
                    if let Err(err) = result {
                        warn!("Refresh of bot {} failed: {err}", slot + 1);
                    }
                }
                return self.render_status();
            }
            ConsoleCommand::Configure(slot, path) => self
                .pool
                .configure(slot.index(), Path::new(&path))
                .map(|state| format!("Bot {slot} configured ({state})")),
            ConsoleCommand::Rename(slot, name) => self
                .pool
                .rename(slot.index(), &name)
                .map(|()| format!("Bot {slot} renamed")),
            ConsoleCommand::Update(slot) => {
                self.pool.update(slot.index()).map(|outcome| match outcome {
                    UpdateOutcome::NotARepository { directory } => {
                        format!("{} is not a git repository", directory.display())
                    }
                    UpdateOutcome::Pulled { stdout, .. } => stdout,
                    UpdateOutcome::Failed { stderr, .. } => stderr,
                })
            }
        };

        result.unwrap_or_else(|err| describe_error(&err))
    }

    fn render_log(&self, lines: usize) -> String {
        let Some(log) = &self.activity else {
            return "Activity log is disabled.".to_string();
        };
        match log.tail(lines) {
            Ok(entries) => self.renderer.render_activity(&entries),
            Err(err) => format!("error: {err}"),
        }
    }
}

/// Prefixes an error with `warning:` or `error:` depending on its severity.
pub fn describe_error(err: &SupervisorError) -> String {
    if err.is_warning() {
        format!("warning: {err}")
    } else {
        format!("error: {err}")
    }
}
