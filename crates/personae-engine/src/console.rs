//! Line-oriented operator console on stdin.
//!
//! ```text
//! connect <player-id>
//! disconnect <player-id>
//! players
//! <player-id> <admin command>
//! quit
//! ```

use personae_core::{AdminCommand, AdminError, SwitchCoordinator};
use personae_types::PlayerId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Errors from parsing a console line.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// The first word was neither a console command nor a player id.
    #[error("'{0}' is not a player id")]
    BadPlayer(String),

    /// The admin command after the player id did not parse.
    #[error(transparent)]
    Admin(#[from] AdminError),
}

/// One console line.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Stop the console.
    Quit,
    /// List connected players.
    Players,
    /// Start a session.
    Connect(PlayerId),
    /// End a session.
    Disconnect(PlayerId),
    /// Run an admin command as a player.
    Run {
        /// The acting player.
        player: PlayerId,
        /// The command to run.
        command: AdminCommand,
    },
}

impl ConsoleCommand {
    /// Parse one non-empty line.
    pub fn parse(line: &str) -> Result<Self, ConsoleError> {
        let line = line.trim();
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let player = |text: &str| PlayerId::parse(text).ok_or_else(|| ConsoleError::BadPlayer(text.to_owned()));

        match head.to_lowercase().as_str() {
            "quit" | "exit" => Ok(Self::Quit),
            "players" => Ok(Self::Players),
            "connect" => Ok(Self::Connect(player(rest)?)),
            "disconnect" => Ok(Self::Disconnect(player(rest)?)),
            _ => Ok(Self::Run {
                player: player(head)?,
                command: AdminCommand::parse(rest)?,
            }),
        }
    }
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(coordinator: &SwitchCoordinator) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Console ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(line = %line, "Console input");
        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => println!("{}", execute(coordinator, command).await),
            Err(e) => println!("error: {e}"),
        }
    }

    info!("Console closed");
    Ok(())
}

async fn execute(coordinator: &SwitchCoordinator, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Quit => String::new(),
        ConsoleCommand::Players => {
            let players = coordinator.connected_players();
            if players.is_empty() {
                "No players connected".to_owned()
            } else {
                players
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ConsoleCommand::Connect(player) => {
            let set = coordinator.connect_player(player).await;
            let active = set
                .active()
                .map_or_else(|| "none".to_owned(), |record| record.display_name().to_owned());
            format!("Connected {player}: {} characters, active {active}", set.len())
        }
        ConsoleCommand::Disconnect(player) => {
            if coordinator.disconnect_player(player).await {
                format!("Disconnected {player}")
            } else {
                format!("{player} was not connected")
            }
        }
        ConsoleCommand::Run { player, command } => match command.execute(coordinator, player).await {
            Ok(reply) => reply,
            Err(e) => format!("error: {e}"),
        },
    }
}
