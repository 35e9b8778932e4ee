//! User-facing messages: muster boards, application cards, reports.

use steward_core::{Action, Application, Decision, Muster, RoleId, UserId};

use crate::command::{ComponentAction, ModalAction};
use crate::platform::{
    ActionRow, Button, ButtonStyle, Embed, Modal, OutgoingMessage, TextInput, TextInputStyle,
};
use crate::records::BlacklistEntry;

pub const COLOR_RED: u32 = 0xe74c3c;
pub const COLOR_GREEN: u32 = 0x2ed573;
pub const COLOR_ORANGE: u32 = 0xff9f43;
pub const COLOR_BLUE: u32 = 0x3742fa;
pub const COLOR_GREY: u32 = 0x747d8c;

/// Parse `#rrggbb` / `rrggbb`. Anything else yields `None`.
pub fn parse_color(text: &str) -> Option<u32> {
    let hex = text.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

pub fn member_list(members: &[UserId]) -> String {
    if members.is_empty() {
        return "_nobody yet_".to_string();
    }
    members
        .iter()
        .enumerate()
        .map(|(i, member)| format!("{}. {}", i + 1, member.mention()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn progress_bar(count: usize, capacity: usize) -> String {
    let filled = count.min(capacity);
    format!(
        "`{}{}` {}/{}",
        "🟩".repeat(filled),
        "⬜".repeat(capacity - filled),
        count,
        capacity
    )
}

// =========================================================================
// Musters
// =========================================================================

/// The interactive board of a forming muster.
pub fn muster_board(muster: &Muster) -> OutgoingMessage {
    let count = muster.count();
    let (color, status) = if count * 10 >= muster.capacity * 7 {
        (COLOR_ORANGE, "Almost full")
    } else {
        (COLOR_BLUE, "Recruiting")
    };

    let mut embed = Embed::new(format!("📋 Muster · {}", status))
        .color(color)
        .field(
            format!("👥 Members ({}/{})", count, muster.capacity),
            member_list(&muster.members),
        )
        .field("📊 Progress", progress_bar(count, muster.capacity));

    embed = match muster.deadline {
        Some(deadline) => embed.footer(format!(
            "Closes at {} UTC unless it fills up first",
            deadline.format("%H:%M")
        )),
        None => embed.footer("Press a button below to join or leave"),
    };

    OutgoingMessage::embed(embed).with_row(ActionRow::new(vec![
        Button::new(
            ButtonStyle::Success,
            "Join",
            ComponentAction::JoinMuster.to_string(),
        )
        .into(),
        Button::new(
            ButtonStyle::Danger,
            "Leave",
            ComponentAction::LeaveMuster.to_string(),
        )
        .into(),
    ]))
}

/// Final roster of a muster that filled up. Carries no buttons.
pub fn muster_completed(muster: &Muster) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new("🎊 Muster complete!")
            .description(format!("**{}** members are ready to go!", muster.capacity))
            .color(COLOR_GREEN)
            .field("Roster", member_list(&muster.members))
            .footer("Good luck out there 🍀"),
    )
}

/// Summary posted when a muster's deadline passes before it fills.
pub fn muster_expired(muster: &Muster) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new("⏰ Time's up!")
            .description(format!(
                "The muster closed with {}/{} members.",
                muster.count(),
                muster.capacity
            ))
            .color(COLOR_GREY)
            .field("Signed up", member_list(&muster.members)),
    )
}

// =========================================================================
// Applications
// =========================================================================

pub fn application_form_post(
    title: &str,
    description: &str,
    color: Option<u32>,
    image_url: Option<&str>,
) -> OutgoingMessage {
    let mut embed = Embed::new(title)
        .description(format!("```ansi\n{}\n```", description))
        .color(color.unwrap_or(COLOR_RED));
    if let Some(url) = image_url.filter(|url| !url.trim().is_empty()) {
        embed = embed.image(url.trim());
    }
    OutgoingMessage::embed(embed).with_row(ActionRow::new(vec![Button::new(
        ButtonStyle::Success,
        "Apply",
        ComponentAction::Apply.to_string(),
    )
    .into()]))
}

fn application_embed(application: &Application) -> Embed {
    let mut embed = Embed::new("New application").color(COLOR_RED);
    for (i, (label, answer)) in application.answers.fields().into_iter().enumerate() {
        embed = embed.field(format!("{}. {}", i + 1, label), answer);
    }
    embed
        .field("Applicant", application.applicant_id.mention())
        .footer(format!("Applicant ID: {}", application.applicant_id))
}

/// The review card posted to the review channel.
///
/// The buttons carry no id: the card's own message id identifies the
/// application.
pub fn application_review(application: &Application, approver_role: Option<RoleId>) -> OutgoingMessage {
    let ping = approver_role.map_or_else(|| "@everyone".to_string(), |role| role.mention());
    OutgoingMessage::embed(application_embed(application))
        .with_content(ping)
        .with_row(ActionRow::new(vec![
            Button::new(ButtonStyle::Success, "Approve", ComponentAction::Approve.to_string()).into(),
            Button::new(ButtonStyle::Danger, "Deny", ComponentAction::Deny.to_string()).into(),
        ]))
}

/// The review card after a decision: reviewer recorded, buttons replaced by a
/// single disabled status button.
pub fn application_decided(
    application: &Application,
    reviewer: UserId,
    decision: &Decision,
) -> OutgoingMessage {
    let (color, label, style) = match decision {
        Decision::Approve => (COLOR_GREEN, "Approved", ButtonStyle::Success),
        Decision::Deny { .. } => (COLOR_GREY, "Denied", ButtonStyle::Danger),
    };
    let mut embed = application_embed(application)
        .color(color)
        .field("Reviewed by", reviewer.mention());
    if let Decision::Deny { reason } = decision {
        embed = embed.field("Reason", reason.clone());
    }
    OutgoingMessage::embed(embed).with_row(ActionRow::new(vec![Button::new(
        style,
        label,
        format!("decided:{}", application.message_id),
    )
    .disabled()
    .into()]))
}

pub fn approval_notice() -> OutgoingMessage {
    OutgoingMessage::text("✅ Your application has been approved. Welcome!")
}

pub fn denial_notice(reason: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "❌ Unfortunately your application was denied.\nReason: `{}`",
        reason
    ))
}

pub fn application_modal() -> Modal {
    Modal::new(
        ModalAction::ApplicationForm.to_string(),
        "Application",
        vec![
            TextInput::new("name", "Your name", TextInputStyle::Short).max_length(100),
            TextInput::new("age", "Your age", TextInputStyle::Short).max_length(3),
            TextInput::new("families", "Which families have you played in?", TextInputStyle::Paragraph)
                .max_length(1000),
            TextInput::new("favorite", "Favorite activity", TextInputStyle::Paragraph).max_length(1000),
            TextInput::new("expectations", "What do you expect from us?", TextInputStyle::Paragraph)
                .max_length(1000),
        ],
    )
}

pub fn form_setup_modal(channel: steward_core::ChannelId) -> Modal {
    Modal::new(
        ModalAction::FormSetup(channel).to_string(),
        "Application form",
        vec![
            TextInput::new("title", "Title", TextInputStyle::Short).max_length(256),
            TextInput::new("description", "Description", TextInputStyle::Paragraph).max_length(4000),
            TextInput::new("image", "Image URL", TextInputStyle::Short).optional(),
            TextInput::new("color", "Colour (hex, e.g. #ff0000)", TextInputStyle::Short)
                .optional()
                .max_length(7),
        ],
    )
}

pub fn deny_reason_modal(application: steward_core::MessageId) -> Modal {
    Modal::new(
        ModalAction::DenyReason(application).to_string(),
        "Deny application",
        vec![TextInput::new("reason", "Reason", TextInputStyle::Paragraph).max_length(500)],
    )
}

// =========================================================================
// Blacklist
// =========================================================================

pub fn blacklist_report(entry: &BlacklistEntry) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new("⛔ Blacklist entry")
            .color(COLOR_RED)
            .inline_field("User", entry.user_id.mention())
            .inline_field("Static ID", entry.static_id.clone())
            .field("Reason", entry.reason.clone())
            .field("Reported by", entry.reporter_id.mention())
            .footer(format!("User ID: {}", entry.user_id)),
    )
}

pub fn blacklist_removed(user: UserId, actor: UserId) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new("✅ Removed from blacklist")
            .color(COLOR_GREEN)
            .inline_field("User", user.mention())
            .inline_field("Removed by", actor.mention()),
    )
}

// =========================================================================
// Help
// =========================================================================

pub fn help(actions: &[Action]) -> Embed {
    let lines: Vec<String> = actions
        .iter()
        .map(|action| format!("`/{}` · {}", action, action.description()))
        .collect();
    Embed::new("Available commands")
        .color(COLOR_BLUE)
        .description(lines.join("\n"))
}
