//! Membership applications and review decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ChannelId, GuildId, MessageId, UserId};

/// Answers collected by the application form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationAnswers {
    pub name: String,
    pub age: String,
    pub previous_families: String,
    pub favorite_activity: String,
    pub expectations: String,
}

impl ApplicationAnswers {
    /// Question labels paired with answers, in form order.
    pub fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("Name", self.name.as_str()),
            ("Age", self.age.as_str()),
            ("Previous families", self.previous_families.as_str()),
            ("Favorite activity", self.favorite_activity.as_str()),
            ("Expectations", self.expectations.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Denied,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Denied)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// A submitted application, identified by the review message that carries
/// its Approve/Deny buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub message_id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub applicant_id: UserId,
    pub answers: ApplicationAnswers,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        message_id: MessageId,
        guild_id: GuildId,
        channel_id: ChannelId,
        applicant_id: UserId,
        answers: ApplicationAnswers,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            guild_id,
            channel_id,
            applicant_id,
            answers,
            status: ApplicationStatus::Pending,
            submitted_at: now,
        }
    }

    /// Document key in the `{guild}_{message}` format.
    pub fn key(&self) -> String {
        format!("{}_{}", self.guild_id, self.message_id)
    }

    /// Mark the application as claimed by a reviewer. Terminal applications
    /// are left untouched.
    pub fn start_review(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ApplicationStatus::UnderReview;
        true
    }

    /// Apply a reviewer's decision. Terminal applications are left untouched
    /// and `false` is returned.
    pub fn decide(&mut self, decision: &Decision) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = decision.status();
        true
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny { reason: String },
}

impl Decision {
    pub fn status(&self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Deny { .. } => ApplicationStatus::Denied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn application() -> Application {
        Application::new(
            MessageId(900),
            GuildId(1),
            ChannelId(2),
            UserId(3),
            ApplicationAnswers {
                name: "Ada".into(),
                ..Default::default()
            },
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn test_decide_is_one_shot() {
        let mut app = application();
        assert!(app.decide(&Decision::Deny {
            reason: "too young".into()
        }));
        assert_eq!(app.status, ApplicationStatus::Denied);

        assert!(!app.decide(&Decision::Approve));
        assert_eq!(app.status, ApplicationStatus::Denied);
    }

    #[test]
    fn test_review_claim_keeps_application_open() {
        let mut app = application();
        assert!(app.start_review());
        assert_eq!(app.status, ApplicationStatus::UnderReview);
        assert!(!app.status.is_terminal());

        assert!(app.decide(&Decision::Approve));
        assert!(!app.start_review());
        assert_eq!(app.status, ApplicationStatus::Approved);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ApplicationStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
    }

    #[test]
    fn test_key_and_fields() {
        let app = application();
        assert_eq!(app.key(), "1_900");
        assert_eq!(app.answers.fields()[0], ("Name", "Ada"));
    }
}
