//! Newtypes for platform identifiers.
//!
//! Discord snowflakes are 64-bit integers that travel through JSON as strings,
//! so every identifier serializes as a string and accepts either a string or a
//! number when deserializing.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_snowflake(deserializer).map(Self)
            }
        }
    };
}

fn deserialize_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

snowflake!(
    /// A user (actor, applicant, reviewer, owner).
    UserId
);
snowflake!(
    /// A guild (server).
    GuildId
);
snowflake!(
    /// A role inside a guild.
    RoleId
);
snowflake!(
    /// A text channel.
    ChannelId
);
snowflake!(
    /// A message. Applications and musters are identified by the message that
    /// carries their interactive buttons.
    MessageId
);

impl UserId {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl RoleId {
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl ChannelId {
    pub fn mention(&self) -> String {
        format!("<#{}>", self.0)
    }
}

/// Identity of a muster: the guild it lives in plus the message carrying its
/// join/leave buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MusterId {
    pub guild_id: GuildId,
    pub message_id: MessageId,
}

impl MusterId {
    pub fn new(guild_id: impl Into<GuildId>, message_id: impl Into<MessageId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            message_id: message_id.into(),
        }
    }

    /// Document key in the `{guild}_{message}` format.
    pub fn key(&self) -> String {
        format!("{}_{}", self.guild_id, self.message_id)
    }
}

impl fmt::Display for MusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_serializes_as_string() {
        let id = UserId(1395845799174344776);
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"1395845799174344776\""
        );
    }

    #[test]
    fn test_snowflake_accepts_string_or_number() {
        let from_text: RoleId = serde_json::from_str("\"42\"").unwrap();
        let from_number: RoleId = serde_json::from_str("42").unwrap();
        assert_eq!(from_text, RoleId(42));
        assert_eq!(from_number, RoleId(42));
    }

    #[test]
    fn test_snowflake_rejects_garbage() {
        assert!(serde_json::from_str::<GuildId>("\"not-a-number\"").is_err());
        assert!("abc".parse::<ChannelId>().is_err());
        assert_eq!(" 17 ".parse::<ChannelId>().unwrap(), ChannelId(17));
    }

    #[test]
    fn test_mentions() {
        assert_eq!(UserId(5).mention(), "<@5>");
        assert_eq!(RoleId(6).mention(), "<@&6>");
        assert_eq!(ChannelId(7).mention(), "<#7>");
    }

    #[test]
    fn test_muster_id_key() {
        assert_eq!(MusterId::new(10u64, 20u64).key(), "10_20");
    }
}
