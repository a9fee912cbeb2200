//! Interactive terminal chat over a single role-play session.

use anyhow::Context;
use roleplay_core::{Session, SessionController, SessionError, transcript};
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// One line of user input, either a message for the partner or a slash command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Say(String),
    Reset,
    Scenario(String),
    Export(PathBuf),
    Transcript,
    Quit,
}

impl ChatCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(Self::Say(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg) {
            ("reset", _) => Ok(Self::Reset),
            ("transcript", _) => Ok(Self::Transcript),
            ("quit" | "exit", _) => Ok(Self::Quit),
            ("scenario", "") => Err("usage: /scenario <key>".into()),
            ("scenario", key) => Ok(Self::Scenario(key.to_string())),
            ("export", "") => Err("usage: /export <path>".into()),
            ("export", path) => Ok(Self::Export(PathBuf::from(path))),
            _ => Err(format!("unknown command '/{name}'")),
        }
    }
}

fn print_intro(session: &Session, out: &mut impl Write) -> std::io::Result<()> {
    let scenario = session.scenario();
    writeln!(out, "=== {} ({}) ===", scenario.title, scenario.key)?;
    writeln!(out, "{}", scenario.instructions.trim())?;
    writeln!(
        out,
        "\nCommands: /reset, /scenario <key>, /export <path>, /transcript, /quit"
    )?;
    Ok(())
}

fn export(session: &Session, path: &Path) -> anyhow::Result<()> {
    let body = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => transcript::export_json(session)?,
        _ => transcript::render_text(session),
    };
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

/// Runs the chat loop until `/quit` or end of input.
pub async fn run<R, W>(
    controller: &SessionController,
    scenario: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<Session>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = controller.start(scenario)?;
    print_intro(&session, out)?;

    let mut lines = input.lines();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match ChatCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(out, "{message}")?;
                continue;
            }
        };
        debug!(?command, session_id = %session.id(), "Chat command");

        match command {
            ChatCommand::Say(text) => {
                let partner = session.scenario().partner_label;
                match controller.submit_user_turn(&mut session, &text).await {
                    Ok(reply) => writeln!(out, "{partner}: {}", reply.content)?,
                    Err(SessionError::Validation(_)) => {
                        writeln!(out, "Please enter a message.")?
                    }
                    Err(e) => writeln!(out, "{e}")?,
                }
            }
            ChatCommand::Reset => {
                controller.reset(&mut session);
                writeln!(out, "Conversation reset.")?;
            }
            ChatCommand::Scenario(key) => match controller.switch_scenario(&mut session, &key) {
                Ok(()) => print_intro(&session, out)?,
                Err(e) => writeln!(out, "{e}")?,
            },
            ChatCommand::Export(path) => match export(&session, &path) {
                Ok(()) => writeln!(out, "Transcript written to {}", path.display())?,
                Err(e) => writeln!(out, "{e:#}")?,
            },
            ChatCommand::Transcript => write!(out, "{}", transcript::render_text(&session))?,
            ChatCommand::Quit => break,
        }
    }
    Ok(session)
}
