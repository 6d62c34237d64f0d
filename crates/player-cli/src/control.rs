//! Interactive transport commands read from stdin.

use std::io::BufRead;

use anyhow::{Context, Result, bail};
use crossbeam_channel::Sender;

/// One transport command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Control {
    /// Play when paused or loaded, pause when playing.
    TogglePause,
    /// Fast review forward; `None` uses the configured step.
    Forward(Option<f64>),
    Backward(Option<f64>),
    Seek(f64),
    /// Suspend the session and resume it right away.
    SuspendResume,
    Info,
    Quit,
}

pub const HELP: &str =
    "commands: p pause/play | f [s] forward | b [s] backward | s SECONDS seek | z suspend+resume | i info | q quit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Control>> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        bail!("too many arguments: {line}");
    }

    let control = match (cmd, arg) {
        ("p", None) => Control::TogglePause,
        ("f", step) => Control::Forward(step.map(parse_seconds).transpose()?),
        ("b", step) => Control::Backward(step.map(parse_seconds).transpose()?),
        ("s", Some(at)) => Control::Seek(parse_seconds(at)?),
        ("s", None) => bail!("seek needs a position in seconds"),
        ("z", None) => Control::SuspendResume,
        ("i", None) => Control::Info,
        ("q", None) => Control::Quit,
        _ => bail!("unknown command: {line}"),
    };
    Ok(Some(control))
}

fn parse_seconds(raw: &str) -> Result<f64> {
    let secs: f64 = raw
        .parse()
        .with_context(|| format!("not a number of seconds: {raw}"))?;
    if !secs.is_finite() {
        bail!("not a number of seconds: {raw}");
    }
    Ok(secs)
}

/// Forward parsed stdin lines to `tx` until stdin closes or the receiver goes away.
pub fn spawn_stdin_reader(tx: Sender<Control>) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("pocketplay-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("stdin read failed: {e}");
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(control)) => {
                        if tx.send(control).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}\n{HELP}"),
                }
            }
            tracing::debug!("stdin closed");
        })
}
