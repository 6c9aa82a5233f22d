//! Operator console.
//!
//! Reads one command per line and forwards it to the engine. Only the verbs
//! listed in [`USAGE`] exist; arguments are parsed into typed values.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use singmic_types::PerformanceState;

use crate::engine::EngineHandle;

pub const USAGE: &str = "\
commands:
  performance <disable|enable|start|stop>   change the performance state
  play <entry-id>                           announce the playlist entry now playing
  refresh-catalogue                         ask peers to refetch the catalogue
  refresh-playlist                          ask peers to refetch the playlist
  status                                    print connected peers as JSON
  help                                      show this text
  exit | quit                               stop the server";

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Performance(PerformanceState),
    Play { entry_id: u32 },
    RefreshCatalogue,
    RefreshPlaylist,
    Status,
    Help,
    Exit,
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if let Some(extra) = words.next() {
        bail!("unexpected argument `{extra}`");
    }

    let cmd = match (verb.to_ascii_lowercase().as_str(), arg) {
        ("performance", Some(state)) => ConsoleCommand::Performance(
            state
                .trim_matches(|c| c == '\'' || c == '"')
                .parse::<PerformanceState>()
                .map_err(|e: String| anyhow!(e))?,
        ),
        ("play", Some(id)) => ConsoleCommand::Play {
            entry_id: id
                .parse::<u32>()
                .with_context(|| format!("invalid entry id `{id}`"))?,
        },
        ("refresh-catalogue", None) => ConsoleCommand::RefreshCatalogue,
        ("refresh-playlist", None) => ConsoleCommand::RefreshPlaylist,
        ("status", None) => ConsoleCommand::Status,
        ("help", None) => ConsoleCommand::Help,
        ("exit" | "quit", None) => ConsoleCommand::Exit,
        ("performance" | "play", None) => bail!("`{verb}` needs an argument"),
        (_, Some(arg)) if is_known_verb(verb) => bail!("`{verb}` takes no argument, got `{arg}`"),
        _ => bail!("unknown command `{verb}` (try `help`)"),
    };
    Ok(Some(cmd))
}

fn is_known_verb(verb: &str) -> bool {
    matches!(
        verb.to_ascii_lowercase().as_str(),
        "refresh-catalogue" | "refresh-playlist" | "status" | "help" | "exit" | "quit"
    )
}

/// Read commands until `exit` or end of input, then stop the engine.
pub fn run_console(engine: &EngineHandle, input: impl BufRead, mut output: impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line.context("read console input")?;
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{e:#}");
                continue;
            }
        };
        match cmd {
            ConsoleCommand::Performance(state) => engine.set_performance_state(state)?,
            ConsoleCommand::Play { entry_id } => engine.announce_current_song(entry_id)?,
            ConsoleCommand::RefreshCatalogue => engine.announce_catalogue_refresh()?,
            ConsoleCommand::RefreshPlaylist => engine.notify_playlist_changed()?,
            ConsoleCommand::Status => {
                let status = engine.snapshot(STATUS_TIMEOUT)?;
                let json = serde_json::to_string_pretty(&status).context("encode status")?;
                writeln!(output, "{json}")?;
            }
            ConsoleCommand::Help => writeln!(output, "{USAGE}")?,
            ConsoleCommand::Exit => break,
        }
    }
    tracing::info!("console closed; stopping");
    let _ = engine.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, channel};

    #[test]
    fn parses_performance_states() {
        assert_eq!(
            parse_command("performance start").unwrap(),
            Some(ConsoleCommand::Performance(PerformanceState::Started))
        );
        assert_eq!(
            parse_command("  Performance 'disable' ").unwrap(),
            Some(ConsoleCommand::Performance(PerformanceState::Disabled))
        );
        assert!(parse_command("performance sing").is_err());
        assert!(parse_command("performance").is_err());
    }

    #[test]
    fn parses_play_entry_id() {
        assert_eq!(
            parse_command("play 12").unwrap(),
            Some(ConsoleCommand::Play { entry_id: 12 })
        );
        assert!(parse_command("play twelve").is_err());
        assert!(parse_command("play -1").is_err());
        assert!(parse_command("play 1 2").is_err());
    }

    #[test]
    fn parses_bare_verbs() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("refresh-playlist").unwrap(),
            Some(ConsoleCommand::RefreshPlaylist)
        );
        assert_eq!(parse_command("QUIT").unwrap(), Some(ConsoleCommand::Exit));
        assert!(parse_command("status now").is_err());
    }

    #[test]
    fn rejects_unknown_verbs() {
        let err = parse_command("__import__('os')").unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn console_forwards_commands_and_stops_engine() {
        let (handle, rx) = channel();
        let input = b"performance enable\nbogus\n\nplay 4\nrefresh-playlist\nhelp\nexit\nplay 5\n";
        let mut out = Vec::new();
        run_console(&handle, &input[..], &mut out).unwrap();

        let cmds: Vec<EngineCommand> = rx.try_iter().collect();
        assert_eq!(cmds.len(), 4);
        assert!(matches!(
            cmds[0],
            EngineCommand::SetPerformance(PerformanceState::Enabled)
        ));
        assert!(matches!(
            cmds[1],
            EngineCommand::AnnounceCurrentSong { entry_id: 4 }
        ));
        assert!(matches!(cmds[2], EngineCommand::PlaylistChanged));
        assert!(matches!(cmds[3], EngineCommand::Shutdown));
        assert!(String::from_utf8(out).unwrap().contains("refresh-catalogue"));
    }

    #[test]
    fn end_of_input_stops_engine() {
        let (handle, rx) = channel();
        run_console(&handle, &b"refresh-catalogue\n"[..], std::io::sink()).unwrap();
        let cmds: Vec<EngineCommand> = rx.try_iter().collect();
        assert!(matches!(cmds[0], EngineCommand::AnnounceCatalogueRefresh));
        assert!(matches!(cmds[1], EngineCommand::Shutdown));
    }
}
