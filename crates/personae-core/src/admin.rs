//! Text commands for players and operators.
//!
//! Each command is a single line:
//!
//! ```text
//! create <name>        switch <name|id>     list
//! delete <name|id>     rename <new name>    kill <name|id>
//! revive <name|id>
//! force <player-id|character-name> <command>
//! ```
//!
//! `force` runs the inner command as another player. The subject is a
//! single token: a player id, or the name of any character that player
//! owns. Offline players are connected for the duration of the command.

use std::fmt::Write as _;

use personae_types::{DataBag, PlayerId};
use tracing::info;

use crate::coordinator::SwitchCoordinator;
use crate::error::CoordinatorError;

/// Errors from parsing or executing an admin command.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a known command.
    #[error("unknown command '{command}'")]
    UnknownCommand {
        /// The unrecognised word.
        command: String,
    },

    /// A required argument was missing.
    #[error("usage: {usage}")]
    MissingArgument {
        /// The expected form of the command.
        usage: &'static str,
    },

    /// The `force` subject matched no player.
    #[error("no player or character matches '{subject}'")]
    UnknownPlayer {
        /// The subject as given.
        subject: String,
    },

    /// The coordinator refused the operation.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// One operation on a player's characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Create a character.
    Create {
        /// The new name.
        name: String,
    },
    /// Switch the active character.
    Switch {
        /// Name or id of the target.
        target: String,
    },
    /// List the player's characters.
    List,
    /// Delete an inactive character.
    Delete {
        /// Name or id of the target.
        target: String,
    },
    /// Rename the active character.
    Rename {
        /// The new name.
        name: String,
    },
    /// Mark a character deceased.
    Kill {
        /// Name or id of the target.
        target: String,
    },
    /// Clear a character's deceased flag.
    Revive {
        /// Name or id of the target.
        target: String,
    },
}

impl AdminAction {
    fn parse(line: &str) -> Result<Self, AdminError> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let argument = |usage: &'static str| -> Result<String, AdminError> {
            if rest.is_empty() {
                Err(AdminError::MissingArgument { usage })
            } else {
                Ok(rest.to_owned())
            }
        };

        match command.to_lowercase().as_str() {
            "" => Err(AdminError::Empty),
            "create" => Ok(Self::Create {
                name: argument("create <name>")?,
            }),
            "switch" => Ok(Self::Switch {
                target: argument("switch <name|id>")?,
            }),
            "list" => Ok(Self::List),
            "delete" => Ok(Self::Delete {
                target: argument("delete <name|id>")?,
            }),
            "rename" => Ok(Self::Rename {
                name: argument("rename <new name>")?,
            }),
            "kill" => Ok(Self::Kill {
                target: argument("kill <name|id>")?,
            }),
            "revive" => Ok(Self::Revive {
                target: argument("revive <name|id>")?,
            }),
            other => Err(AdminError::UnknownCommand {
                command: other.to_owned(),
            }),
        }
    }

    async fn run(&self, coordinator: &SwitchCoordinator, player: PlayerId) -> Result<String, AdminError> {
        match self {
            Self::Create { name } => {
                let record = coordinator
                    .create_character(player, name, DataBag::new())
                    .await?;
                Ok(format!("Created {} ({})", record.display_name(), record.id()))
            }
            Self::Switch { target } => {
                coordinator.switch_character(player, target).await?;
                let active = coordinator.active_character(player).await?;
                let name = active.as_ref().map_or(target.as_str(), |record| record.display_name());
                Ok(format!("Switched to {name}"))
            }
            Self::List => {
                let characters = coordinator.list_characters(player).await?;
                if characters.is_empty() {
                    return Ok("No characters".to_owned());
                }
                let mut out = String::new();
                for summary in characters {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&summary.name);
                    if summary.active {
                        out.push_str(" (active)");
                    }
                    if summary.deceased {
                        out.push_str(" (deceased)");
                    }
                    let _ = write!(out, " [{}]", summary.id);
                }
                Ok(out)
            }
            Self::Delete { target } => {
                coordinator.delete_character(player, target).await?;
                Ok(format!("Deleted {target}"))
            }
            Self::Rename { name } => {
                coordinator.rename_active_character(player, name).await?;
                Ok(format!("Renamed to {name}"))
            }
            Self::Kill { target } => {
                coordinator.set_deceased(player, target, true).await?;
                Ok(format!("{target} is now deceased"))
            }
            Self::Revive { target } => {
                coordinator.set_deceased(player, target, false).await?;
                Ok(format!("{target} has been revived"))
            }
        }
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Act on the caller's own characters.
    Own(AdminAction),
    /// Act on another player's characters.
    Force {
        /// Player id, or the name of one of the player's characters.
        subject: String,
        /// The action to run as that player.
        action: AdminAction,
    },
}

impl AdminCommand {
    /// Parse one command line.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Empty`], [`AdminError::UnknownCommand`], or
    /// [`AdminError::MissingArgument`].
    pub fn parse(line: &str) -> Result<Self, AdminError> {
        let line = line.trim();
        let Some((command, rest)) = line.split_once(char::is_whitespace) else {
            if line.eq_ignore_ascii_case("force") {
                return Err(AdminError::MissingArgument { usage: FORCE_USAGE });
            }
            return AdminAction::parse(line).map(Self::Own);
        };
        if !command.eq_ignore_ascii_case("force") {
            return AdminAction::parse(line).map(Self::Own);
        }

        let rest = rest.trim();
        let Some((subject, inner)) = rest.split_once(char::is_whitespace) else {
            return Err(AdminError::MissingArgument { usage: FORCE_USAGE });
        };
        Ok(Self::Force {
            subject: subject.to_owned(),
            action: AdminAction::parse(inner)?,
        })
    }

    /// Run the command for `actor` and describe the outcome in one line
    /// (or one line per character for `list`).
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::UnknownPlayer`] if a `force` subject matches
    /// nobody, or [`AdminError::Coordinator`] if the operation fails.
    pub async fn execute(&self, coordinator: &SwitchCoordinator, actor: PlayerId) -> Result<String, AdminError> {
        match self {
            Self::Own(action) => action.run(coordinator, actor).await,
            Self::Force { subject, action } => {
                let player = resolve_subject(coordinator, subject).ok_or_else(|| AdminError::UnknownPlayer {
                    subject: subject.clone(),
                })?;
                info!(actor = %actor, player_id = %player, action = ?action, "Forced admin action");

                let temporary = !coordinator.is_connected(player);
                if temporary {
                    coordinator.connect_player(player).await;
                }
                let outcome = action.run(coordinator, player).await;
                if temporary {
                    coordinator.disconnect_player(player).await;
                }
                outcome
            }
        }
    }
}

const FORCE_USAGE: &str = "force <player-id|character-name> <command>";

fn resolve_subject(coordinator: &SwitchCoordinator, subject: &str) -> Option<PlayerId> {
    if let Some(player) = PlayerId::parse(subject) {
        return Some(player);
    }
    let registry = coordinator.registry();
    registry
        .character_id_for_name(subject)
        .and_then(|id| registry.owner_of(id))
}
