//! Command prompt
//!
//! Runs on a blocking thread; level changes are handed to [`LevelControl`],
//! which spawns the sends back onto the runtime.

use crate::state::ChannelStore;
use crate::surface::{fraction_across, render_table, LevelControl, ViewOptions};
use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};

const HELP: &str = "\
Commands:
  level <loop> <fraction>      set wet level, fraction 0..1
  click <loop> <offset> <width> set wet level from a click on the level bar
  show                         print the loop table
  count                        print the number of loops
  help                         this text
  quit | exit                  leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Loop numbers are 1-based on the prompt
    Level { loop_no: usize, fraction: f64 },
    Click {
        loop_no: usize,
        offset: i32,
        width: i32,
    },
    Show,
    Count,
    Help,
    Quit,
    Empty,
}

fn arg<'a>(parts: &[&'a str], n: usize, what: &str) -> Result<&'a str> {
    parts
        .get(n)
        .copied()
        .with_context(|| format!("Missing {}", what))
}

fn loop_no(parts: &[&str]) -> Result<usize> {
    let raw = arg(parts, 1, "loop number")?;
    let n: usize = raw
        .parse()
        .with_context(|| format!("Invalid loop number '{}'", raw))?;
    if n == 0 {
        bail!("Loop numbers start at 1");
    }
    Ok(n)
}

/// Parse one prompt line
pub fn parse_command(line: &str) -> Result<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(head) = parts.first() else {
        return Ok(Command::Empty);
    };

    let cmd = match head.to_ascii_lowercase().as_str() {
        "level" => {
            let raw = arg(&parts, 2, "fraction")?;
            Command::Level {
                loop_no: loop_no(&parts)?,
                fraction: raw
                    .parse()
                    .with_context(|| format!("Invalid fraction '{}'", raw))?,
            }
        }
        "click" => {
            let offset = arg(&parts, 2, "offset")?;
            let width = arg(&parts, 3, "width")?;
            Command::Click {
                loop_no: loop_no(&parts)?,
                offset: offset
                    .parse()
                    .with_context(|| format!("Invalid offset '{}'", offset))?,
                width: width
                    .parse()
                    .with_context(|| format!("Invalid width '{}'", width))?,
            }
        }
        "show" => Command::Show,
        "count" => Command::Count,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("Unknown command '{}'", other),
    };
    Ok(cmd)
}

/// Interactive prompt over the shared store
pub struct Repl {
    store: ChannelStore,
    level: LevelControl,
    view: ViewOptions,
}

impl Repl {
    pub fn new(store: ChannelStore, level: LevelControl, view: ViewOptions) -> Self {
        Self { store, level, view }
    }

    /// Run one command; `None` means leave the prompt
    pub fn execute(&self, cmd: Command) -> Result<Option<String>> {
        let out = match cmd {
            Command::Level { loop_no, fraction } => {
                let write = self.level.set_level(loop_no - 1, fraction)?;
                format!("Loop {} wet -> {:.4}", loop_no, write.gain)
            }
            Command::Click {
                loop_no,
                offset,
                width,
            } => {
                let fraction = fraction_across(offset, width);
                let write = self.level.set_level(loop_no - 1, fraction)?;
                format!(
                    "Loop {} click {:.2} -> wet {:.4}",
                    loop_no, fraction, write.gain
                )
            }
            Command::Show => render_table(&self.store.snapshot(), &self.view),
            Command::Count => format!("{} loop(s)", self.store.channel_count()),
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(None),
            Command::Empty => String::new(),
        };
        Ok(Some(out))
    }

    /// Blocking read-eval loop; call from `spawn_blocking`
    pub fn run(self) -> Result<()> {
        let mut rl = DefaultEditor::new().context("Failed to initialize line editor")?;
        info!("Command prompt ready, type 'help'");

        loop {
            let line = match rl.readline("sooper> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e).context("Failed to read command"),
            };
            if !line.trim().is_empty() {
                let _ = rl.add_history_entry(line.as_str());
            }

            let result = parse_command(&line).and_then(|cmd| self.execute(cmd));
            match result {
                Ok(Some(out)) if out.is_empty() => {}
                Ok(Some(out)) => println!("{}", out.trim_end()),
                Ok(None) => break,
                Err(e) => {
                    debug!("Command failed: {:#}", e);
                    println!("{:#}\n{}", e, HELP);
                }
            }
        }
        Ok(())
    }
}
