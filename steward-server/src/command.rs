//! Slash commands, button ids and modal ids.
//!
//! Every privileged interaction maps onto exactly one [`Action`], which is
//! what the permission gate checks. Component and modal custom ids round-trip
//! through `Display`/`FromStr`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Value};
use steward_core::{Action, ChannelId, MessageId, RoleId, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("option `{name}` has an invalid value")]
    InvalidOption { name: &'static str },

    #[error("unrecognised interaction id `{0}`")]
    UnknownCustomId(String),
}

/// One option as delivered inside an application-command interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Sync,
    ManageRoles {
        role: RoleId,
        actions: Option<String>,
        reset: bool,
    },
    AddForm {
        channel: ChannelId,
    },
    ApprovalChannel {
        channel: Option<ChannelId>,
    },
    GiveApprover {
        approver_role: RoleId,
        approved_role: RoleId,
    },
    CreateMuster {
        capacity: i64,
        timer_minutes: Option<i64>,
    },
    BlacklistChannel {
        channel: ChannelId,
    },
    Blacklist {
        user: UserId,
        static_id: String,
        reason: String,
    },
    Unblacklist {
        user: UserId,
    },
}

struct Options<'a>(&'a [CommandOption]);

impl Options<'_> {
    fn raw(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|option| option.name == name)
            .map(|option| &option.value)
    }

    fn snowflake<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, CommandError> {
        match self.raw(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| CommandError::InvalidOption { name }),
            Some(Value::Number(n)) => n
                .to_string()
                .parse()
                .map(Some)
                .map_err(|_| CommandError::InvalidOption { name }),
            Some(_) => Err(CommandError::InvalidOption { name }),
        }
    }

    fn required_snowflake<T: FromStr>(&self, name: &'static str) -> Result<T, CommandError> {
        self.snowflake(name)?.ok_or(CommandError::MissingOption(name))
    }

    fn integer(&self, name: &'static str) -> Result<Option<i64>, CommandError> {
        match self.raw(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or(CommandError::InvalidOption { name }),
        }
    }

    fn string(&self, name: &'static str) -> Result<Option<String>, CommandError> {
        match self.raw(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(CommandError::InvalidOption { name }),
        }
    }

    fn required_string(&self, name: &'static str) -> Result<String, CommandError> {
        self.string(name)?
            .filter(|s| !s.trim().is_empty())
            .ok_or(CommandError::MissingOption(name))
    }

    fn boolean(&self, name: &'static str) -> Result<bool, CommandError> {
        match self.raw(name) {
            None | Some(Value::Null) => Ok(false),
            Some(value) => value.as_bool().ok_or(CommandError::InvalidOption { name }),
        }
    }
}

impl SlashCommand {
    pub fn parse(name: &str, options: &[CommandOption]) -> Result<Self, CommandError> {
        let action: Action = name
            .parse()
            .map_err(|_| CommandError::UnknownCommand(name.to_string()))?;
        let options = Options(options);

        Ok(match action {
            Action::Help => SlashCommand::Help,
            Action::Sync => SlashCommand::Sync,
            Action::ManageRoles => SlashCommand::ManageRoles {
                role: options.required_snowflake("role")?,
                actions: options.string("actions")?,
                reset: options.boolean("reset")?,
            },
            Action::AddForm => SlashCommand::AddForm {
                channel: options.required_snowflake("channel")?,
            },
            Action::ApprovalChannel => SlashCommand::ApprovalChannel {
                channel: options.snowflake("channel")?,
            },
            Action::GiveApprover => SlashCommand::GiveApprover {
                approver_role: options.required_snowflake("approver_role")?,
                approved_role: options.required_snowflake("approved_role")?,
            },
            Action::CreateMuster => SlashCommand::CreateMuster {
                capacity: options
                    .integer("capacity")?
                    .ok_or(CommandError::MissingOption("capacity"))?,
                timer_minutes: options.integer("timer")?,
            },
            Action::BlacklistChannel => SlashCommand::BlacklistChannel {
                channel: options.required_snowflake("channel")?,
            },
            Action::Blacklist => SlashCommand::Blacklist {
                user: options.required_snowflake("user")?,
                static_id: options.required_string("static_id")?,
                reason: options.required_string("reason")?,
            },
            Action::Unblacklist => SlashCommand::Unblacklist {
                user: options.required_snowflake("user")?,
            },
            Action::Review => return Err(CommandError::UnknownCommand(name.to_string())),
        })
    }

    /// The permission this command requires.
    pub fn action(&self) -> Action {
        match self {
            SlashCommand::Help => Action::Help,
            SlashCommand::Sync => Action::Sync,
            SlashCommand::ManageRoles { .. } => Action::ManageRoles,
            SlashCommand::AddForm { .. } => Action::AddForm,
            SlashCommand::ApprovalChannel { .. } => Action::ApprovalChannel,
            SlashCommand::GiveApprover { .. } => Action::GiveApprover,
            SlashCommand::CreateMuster { .. } => Action::CreateMuster,
            SlashCommand::BlacklistChannel { .. } => Action::BlacklistChannel,
            SlashCommand::Blacklist { .. } => Action::Blacklist,
            SlashCommand::Unblacklist { .. } => Action::Unblacklist,
        }
    }
}

impl fmt::Display for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.action())
    }
}

/// Button presses. Buttons are identified by the message they sit on, so
/// none of them carries an id of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    Apply,
    Approve,
    Deny,
    JoinMuster,
    LeaveMuster,
}

impl fmt::Display for ComponentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentAction::Apply => "apply",
            ComponentAction::Approve => "approve",
            ComponentAction::Deny => "deny",
            ComponentAction::JoinMuster => "join_muster",
            ComponentAction::LeaveMuster => "leave_muster",
        })
    }
}

impl FromStr for ComponentAction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(ComponentAction::Apply),
            "approve" => Ok(ComponentAction::Approve),
            "deny" => Ok(ComponentAction::Deny),
            "join_muster" => Ok(ComponentAction::JoinMuster),
            "leave_muster" => Ok(ComponentAction::LeaveMuster),
            other => Err(CommandError::UnknownCustomId(other.to_string())),
        }
    }
}

/// Modal submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalAction {
    ApplicationForm,
    /// Form-setup modal opened by `/addform`; carries the target channel.
    FormSetup(ChannelId),
    /// Reason modal opened by the Deny button; carries the review message.
    DenyReason(MessageId),
}

impl fmt::Display for ModalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModalAction::ApplicationForm => f.write_str("application_form"),
            ModalAction::FormSetup(channel) => write!(f, "form_setup:{}", channel),
            ModalAction::DenyReason(message) => write!(f, "deny_reason:{}", message),
        }
    }
}

impl FromStr for ModalAction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || CommandError::UnknownCustomId(s.to_string());
        match s.split_once(':') {
            None if s == "application_form" => Ok(ModalAction::ApplicationForm),
            Some(("form_setup", id)) => id.parse().map(ModalAction::FormSetup).map_err(|_| unknown()),
            Some(("deny_reason", id)) => id.parse().map(ModalAction::DenyReason).map_err(|_| unknown()),
            _ => Err(unknown()),
        }
    }
}

// Discord application command option types.
const OPTION_STRING: u8 = 3;
const OPTION_INTEGER: u8 = 4;
const OPTION_BOOLEAN: u8 = 5;
const OPTION_USER: u8 = 6;
const OPTION_CHANNEL: u8 = 7;
const OPTION_ROLE: u8 = 8;

fn option(kind: u8, name: &str, description: &str, required: bool) -> Value {
    json!({
        "type": kind,
        "name": name,
        "description": description,
        "required": required,
    })
}

/// The command catalog registered with the platform.
pub fn catalog() -> Value {
    let commands: Vec<Value> = Action::ALL
        .into_iter()
        .filter(|action| *action != Action::Review)
        .map(|action| {
            let options = match action {
                Action::ManageRoles => vec![
                    option(OPTION_ROLE, "role", "Role to configure", true),
                    option(
                        OPTION_STRING,
                        "actions",
                        "Comma-separated command names to grant",
                        false,
                    ),
                    option(OPTION_BOOLEAN, "reset", "Remove every grant from the role", false),
                ],
                Action::AddForm => vec![option(
                    OPTION_CHANNEL,
                    "channel",
                    "Channel to post the form in",
                    true,
                )],
                Action::ApprovalChannel => vec![option(
                    OPTION_CHANNEL,
                    "channel",
                    "Channel for incoming applications (omit to clear)",
                    false,
                )],
                Action::GiveApprover => vec![
                    option(OPTION_ROLE, "approver_role", "Role that reviews applications", true),
                    option(OPTION_ROLE, "approved_role", "Role given on approval", true),
                ],
                Action::CreateMuster => {
                    let mut capacity =
                        option(OPTION_INTEGER, "capacity", "Number of members", true);
                    capacity["min_value"] = json!(steward_core::muster::MIN_CAPACITY);
                    capacity["max_value"] = json!(steward_core::muster::MAX_CAPACITY);
                    let mut timer = option(
                        OPTION_INTEGER,
                        "timer",
                        "Minutes until the muster closes",
                        false,
                    );
                    timer["min_value"] = json!(steward_core::muster::MIN_TIMER_MINUTES);
                    timer["max_value"] = json!(steward_core::muster::MAX_TIMER_MINUTES);
                    vec![capacity, timer]
                }
                Action::BlacklistChannel => vec![option(
                    OPTION_CHANNEL,
                    "channel",
                    "Channel for blacklist reports",
                    true,
                )],
                Action::Blacklist => vec![
                    option(OPTION_USER, "user", "User to blacklist", true),
                    option(OPTION_STRING, "static_id", "In-game static ID", true),
                    option(OPTION_STRING, "reason", "Reason", true),
                ],
                Action::Unblacklist => {
                    vec![option(OPTION_USER, "user", "User to remove", true)]
                }
                Action::Help | Action::Sync | Action::Review => Vec::new(),
            };
            json!({
                "name": action.as_str(),
                "description": action.description(),
                "type": 1,
                "options": options,
            })
        })
        .collect();
    Value::Array(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, Value)]) -> Vec<CommandOption> {
        pairs
            .iter()
            .map(|(name, value)| CommandOption {
                name: name.to_string(),
                value: value.clone(),
            })
            .collect()
    }

    #[test]
    fn test_parse_create_muster() {
        let command = SlashCommand::parse(
            "createcapt",
            &opts(&[("capacity", json!(5)), ("timer", json!(30))]),
        )
        .unwrap();
        assert_eq!(
            command,
            SlashCommand::CreateMuster {
                capacity: 5,
                timer_minutes: Some(30)
            }
        );
        assert_eq!(command.action(), Action::CreateMuster);
    }

    #[test]
    fn test_parse_blacklist_reads_snowflake_strings() {
        let command = SlashCommand::parse(
            "blacklist",
            &opts(&[
                ("user", json!("1395845799174344776")),
                ("static_id", json!("4411")),
                ("reason", json!("scamming")),
            ]),
        )
        .unwrap();
        assert_eq!(
            command,
            SlashCommand::Blacklist {
                user: UserId(1395845799174344776),
                static_id: "4411".into(),
                reason: "scamming".into()
            }
        );
    }

    #[test]
    fn test_parse_reports_missing_and_invalid_options() {
        assert_eq!(
            SlashCommand::parse("createcapt", &[]),
            Err(CommandError::MissingOption("capacity"))
        );
        assert_eq!(
            SlashCommand::parse("unblacklist", &opts(&[("user", json!("abc"))])),
            Err(CommandError::InvalidOption { name: "user" })
        );
        assert_eq!(
            SlashCommand::parse("blacklist", &opts(&[("user", json!("1")), ("static_id", json!("  "))])),
            Err(CommandError::MissingOption("static_id"))
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            SlashCommand::parse("dance", &[]),
            Err(CommandError::UnknownCommand("dance".into()))
        );
        assert_eq!(
            SlashCommand::parse("review", &[]),
            Err(CommandError::UnknownCommand("review".into()))
        );
    }

    #[test]
    fn test_approval_channel_is_optional() {
        assert_eq!(
            SlashCommand::parse("approvchannel", &[]).unwrap(),
            SlashCommand::ApprovalChannel { channel: None }
        );
    }

    #[test]
    fn test_custom_ids_round_trip() {
        for action in [
            ComponentAction::Apply,
            ComponentAction::Approve,
            ComponentAction::Deny,
            ComponentAction::JoinMuster,
            ComponentAction::LeaveMuster,
        ] {
            assert_eq!(action.to_string().parse::<ComponentAction>().unwrap(), action);
        }
        for modal in [
            ModalAction::ApplicationForm,
            ModalAction::FormSetup(ChannelId(9)),
            ModalAction::DenyReason(MessageId(10)),
        ] {
            assert_eq!(modal.to_string().parse::<ModalAction>().unwrap(), modal);
        }
        assert!("deny_reason:x".parse::<ModalAction>().is_err());
        assert!("decided:5".parse::<ComponentAction>().is_err());
    }

    #[test]
    fn test_catalog_covers_every_command() {
        let catalog = catalog();
        let names: Vec<&str> = catalog
            .as_array()
            .unwrap()
            .iter()
            .map(|command| command["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), Action::ALL.len() - 1);
        assert!(names.contains(&"createcapt"));
        assert!(!names.contains(&"review"));
    }
}
