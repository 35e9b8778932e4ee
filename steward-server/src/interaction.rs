//! Inbound HTTP interactions.
//!
//! The platform POSTs every slash command, button press and modal submission
//! to `/interactions`, signed with the application's Ed25519 key. Each request
//! is verified, tagged with a correlation id and mapped onto an
//! [`Orchestrator`] call. Replies are ephemeral messages or modals.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use steward_core::{ApplicationAnswers, ChannelId, GuildId, MessageId, MusterId, RoleId, UserId};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::command::{CommandOption, ComponentAction, ModalAction, SlashCommand};
use crate::orchestrator::{Actor, FormPost, Orchestrator, Reply, WorkflowError};
use crate::{AppState, CorrelationId};

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

// Interaction types.
const PING: u8 = 1;
const APPLICATION_COMMAND: u8 = 2;
const MESSAGE_COMPONENT: u8 = 3;
const MODAL_SUBMIT: u8 = 5;

// Interaction callback types.
const PONG: u8 = 1;
const CHANNEL_MESSAGE: u8 = 4;
const MODAL: u8 = 9;

const EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Present for interactions inside a guild.
    #[serde(default)]
    pub member: Option<Member>,
    /// Present for interactions in direct messages.
    #[serde(default)]
    pub user: Option<User>,
    /// The message a pressed button sits on.
    #[serde(default)]
    pub message: Option<InteractionMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub custom_id: Option<String>,
    /// Modal rows.
    #[serde(default)]
    pub components: Vec<ModalRow>,
}

#[derive(Debug, Deserialize)]
pub struct ModalRow {
    #[serde(default)]
    pub components: Vec<ModalField>,
}

#[derive(Debug, Deserialize)]
pub struct ModalField {
    pub custom_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct InteractionMessage {
    pub id: MessageId,
}

impl Interaction {
    /// The acting guild member, if this happened inside a guild.
    fn actor(&self) -> Option<Actor> {
        let guild = self.guild_id?;
        let member = self.member.as_ref()?;
        Some(Actor::with_roles(guild, member.user.id, member.roles.clone()))
    }

    fn data(&self) -> Result<&InteractionData, WorkflowError> {
        self.data
            .as_ref()
            .ok_or_else(|| WorkflowError::InvalidInput("The interaction carried no data.".into()))
    }

    fn target_message(&self) -> Result<MessageId, WorkflowError> {
        self.message
            .as_ref()
            .map(|message| message.id)
            .ok_or_else(|| WorkflowError::InvalidInput("The button is not on a message.".into()))
    }
}

impl InteractionData {
    /// Value of a modal text input; blank values count as absent.
    fn field(&self, custom_id: &str) -> Option<String> {
        self.components
            .iter()
            .flat_map(|row| row.components.iter())
            .find(|field| field.custom_id == custom_id)
            .and_then(|field| field.value.clone())
            .filter(|value| !value.trim().is_empty())
    }

    fn required_field(&self, custom_id: &str) -> Result<String, WorkflowError> {
        self.field(custom_id).ok_or_else(|| {
            WorkflowError::InvalidInput(format!("The `{}` field is required.", custom_id))
        })
    }
}

/// Check the Ed25519 signature over `timestamp || body`.
pub fn verify_signature(key: &VerifyingKey, timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify(&message, &signature).is_ok()
}

async fn verify_interaction_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)
    };
    let signature = header(SIGNATURE_HEADER)?;
    let timestamp = header(TIMESTAMP_HEADER)?;

    if !verify_signature(&state.public_key, timestamp, &bytes, signature) {
        warn!("Invalid interaction signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

pub async fn interaction_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, StatusCode> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let interaction: Interaction = serde_json::from_slice(&bytes).map_err(|e| {
        warn!("Malformed interaction: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let span = info_span!(
        "interaction",
        correlation_id = %correlation_id,
        kind = interaction.kind
    );
    let response = dispatch(&state.orchestrator, interaction)
        .instrument(span)
        .await;
    Ok(Json(response))
}

async fn dispatch(orchestrator: &Orchestrator, interaction: Interaction) -> Value {
    if interaction.kind == PING {
        return json!({ "type": PONG });
    }

    let Some(actor) = interaction.actor() else {
        return ephemeral("This only works inside a server.");
    };

    let result = match interaction.kind {
        APPLICATION_COMMAND => handle_command(orchestrator, &actor, &interaction).await,
        MESSAGE_COMPONENT => handle_component(orchestrator, &actor, &interaction).await,
        MODAL_SUBMIT => handle_modal(orchestrator, &actor, &interaction).await,
        other => Err(WorkflowError::InvalidInput(format!(
            "Unsupported interaction type {}.",
            other
        ))),
    };

    match result {
        Ok(reply) => reply_body(reply),
        Err(e) => {
            if let WorkflowError::Collaborator { service, detail } = &e {
                error!("Interaction failed at the {}: {}", service, detail);
            } else {
                info!("Interaction refused: {}", e);
            }
            ephemeral(&e.to_string())
        }
    }
}

async fn handle_command(
    orchestrator: &Orchestrator,
    actor: &Actor,
    interaction: &Interaction,
) -> Result<Reply, WorkflowError> {
    let data = interaction.data()?;
    let name = data
        .name
        .as_deref()
        .ok_or_else(|| WorkflowError::InvalidInput("The command has no name.".into()))?;
    let command = SlashCommand::parse(name, &data.options)?;
    let channel = interaction
        .channel_id
        .ok_or_else(|| WorkflowError::InvalidInput("The command has no channel.".into()))?;
    orchestrator.run_command(actor, channel, command).await
}

async fn handle_component(
    orchestrator: &Orchestrator,
    actor: &Actor,
    interaction: &Interaction,
) -> Result<Reply, WorkflowError> {
    let data = interaction.data()?;
    let action: ComponentAction = data.custom_id.as_deref().unwrap_or_default().parse()?;
    info!("{} pressed by {}", action, actor.user);

    match action {
        ComponentAction::Apply => Ok(orchestrator.application_form()),
        ComponentAction::Approve => {
            orchestrator
                .approve(actor, interaction.target_message()?)
                .await
        }
        ComponentAction::Deny => {
            orchestrator
                .begin_deny(actor, interaction.target_message()?)
                .await
        }
        ComponentAction::JoinMuster => {
            let id = MusterId::new(actor.guild, interaction.target_message()?);
            orchestrator.join_muster(id, actor.user).await
        }
        ComponentAction::LeaveMuster => {
            let id = MusterId::new(actor.guild, interaction.target_message()?);
            orchestrator.leave_muster(id, actor.user).await
        }
    }
}

async fn handle_modal(
    orchestrator: &Orchestrator,
    actor: &Actor,
    interaction: &Interaction,
) -> Result<Reply, WorkflowError> {
    let data = interaction.data()?;
    let action: ModalAction = data.custom_id.as_deref().unwrap_or_default().parse()?;
    info!("{} submitted by {}", action, actor.user);

    match action {
        ModalAction::ApplicationForm => {
            let answers = ApplicationAnswers {
                name: data.required_field("name")?,
                age: data.required_field("age")?,
                previous_families: data.required_field("families")?,
                favorite_activity: data.required_field("favorite")?,
                expectations: data.required_field("expectations")?,
            };
            orchestrator.submit_application(actor, answers).await
        }
        ModalAction::FormSetup(channel) => {
            let form = FormPost {
                title: data.required_field("title")?,
                description: data.field("description").unwrap_or_default(),
                image_url: data.field("image"),
                color: data.field("color"),
            };
            orchestrator.post_form(actor, channel, form).await
        }
        ModalAction::DenyReason(message) => {
            let reason = data.required_field("reason")?;
            orchestrator.deny(actor, message, reason).await
        }
    }
}

fn ephemeral(content: &str) -> Value {
    json!({
        "type": CHANNEL_MESSAGE,
        "data": { "content": content, "flags": EPHEMERAL },
    })
}

fn reply_body(reply: Reply) -> Value {
    match reply {
        Reply::Message(message) => {
            let mut data = serde_json::to_value(&message).unwrap_or_else(|_| json!({}));
            if let Some(object) = data.as_object_mut() {
                object.insert("flags".to_string(), json!(EPHEMERAL));
            }
            json!({ "type": CHANNEL_MESSAGE, "data": data })
        }
        Reply::Modal(modal) => json!({ "type": MODAL, "data": modal }),
    }
}

pub fn interaction_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/interactions", post(interaction_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_interaction_signature,
        ))
}
