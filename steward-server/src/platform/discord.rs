use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use steward_core::{ChannelId, GuildId, MessageId, RoleId, UserId};
use tracing::{debug, error, info, warn};

use super::{OutgoingMessage, Platform, PlatformError};

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST client authenticated as the bot user.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    token: String,
    application_id: u64,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MemberResponse {
    roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl DiscordClient {
    pub fn new(token: String, application_id: u64) -> Self {
        Self::with_base_url(token, application_id, API_BASE.to_string())
    }

    pub fn with_base_url(token: String, application_id: u64, base_url: String) -> Self {
        Self {
            client: Client::new(),
            token,
            application_id,
            base_url,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bot {}", self.token))
            .header(
                "User-Agent",
                concat!("DiscordBot (steward, ", env!("CARGO_PKG_VERSION"), ")"),
            )
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request.send().await.map_err(|e| {
            error!("Discord {} request failed: {}", operation, e);
            PlatformError::Http(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify(status, &body);
        warn!("Discord {} returned {}: {}", operation, status, body);
        Err(err)
    }

    async fn created_id(operation: &str, response: Response) -> Result<u64, PlatformError> {
        let created: IdResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Http(format!("{}: invalid response: {}", operation, e)))?;
        created
            .id
            .parse()
            .map_err(|_| PlatformError::Http(format!("{}: invalid id {:?}", operation, created.id)))
    }
}

/// Map an unsuccessful HTTP status onto the platform error taxonomy.
pub fn classify(status: StatusCode, body: &str) -> PlatformError {
    match status {
        StatusCode::FORBIDDEN => PlatformError::Forbidden(body.to_string()),
        StatusCode::NOT_FOUND => PlatformError::NotFound(body.to_string()),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after: serde_json::from_str::<RateLimitBody>(body)
                .ok()
                .and_then(|b| b.retry_after),
        },
        other => PlatformError::Http(format!("{}: {}", other, body)),
    }
}

/// Audit-log reasons travel in a header, which only carries visible ASCII.
fn audit_reason(reason: &str) -> String {
    reason
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(512)
        .collect()
}

#[async_trait]
impl Platform for DiscordClient {
    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError> {
        debug!("Fetching roles of {} in guild {}", user, guild);
        let response = self
            .send(
                "get member",
                self.request(Method::GET, &format!("/guilds/{}/members/{}", guild, user)),
            )
            .await?;
        let member: MemberResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Http(format!("get member: invalid response: {}", e)))?;
        Ok(member.roles)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let response = self
            .send(
                "send message",
                self.request(Method::POST, &format!("/channels/{}/messages", channel))
                    .json(message),
            )
            .await?;
        let id = Self::created_id("send message", response).await?;
        info!("Sent message {} to channel {}", id, channel);
        Ok(MessageId(id))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.send(
            "edit message",
            self.request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", channel, message_id),
            )
            .json(message),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> Result<(), PlatformError> {
        self.send(
            "delete message",
            self.request(
                Method::DELETE,
                &format!("/channels/{}/messages/{}", channel, message_id),
            ),
        )
        .await?;
        info!("Deleted message {} in channel {}", message_id, channel);
        Ok(())
    }

    async fn message_exists(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> Result<bool, PlatformError> {
        let result = self
            .send(
                "get message",
                self.request(
                    Method::GET,
                    &format!("/channels/{}/messages/{}", channel, message_id),
                ),
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn send_direct_message(
        &self,
        user: UserId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let response = self
            .send(
                "open dm",
                self.request(Method::POST, "/users/@me/channels")
                    .json(&json!({ "recipient_id": user.to_string() })),
            )
            .await?;
        let channel = ChannelId(Self::created_id("open dm", response).await?);
        self.send_message(channel, message).await?;
        Ok(())
    }

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.send(
            "add role",
            self.request(
                Method::PUT,
                &format!("/guilds/{}/members/{}/roles/{}", guild, user, role),
            ),
        )
        .await?;
        info!("Granted role {} to {} in guild {}", role, user, guild);
        Ok(())
    }

    async fn ban(&self, guild: GuildId, user: UserId, reason: &str) -> Result<(), PlatformError> {
        self.send(
            "ban",
            self.request(Method::PUT, &format!("/guilds/{}/bans/{}", guild, user))
                .header("X-Audit-Log-Reason", audit_reason(reason))
                .json(&json!({})),
        )
        .await?;
        info!("Banned {} from guild {}", user, guild);
        Ok(())
    }

    async fn register_commands(&self, catalog: &serde_json::Value) -> Result<usize, PlatformError> {
        let response = self
            .send(
                "register commands",
                self.request(
                    Method::PUT,
                    &format!("/applications/{}/commands", self.application_id),
                )
                .json(catalog),
            )
            .await?;
        let registered: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            PlatformError::Http(format!("register commands: invalid response: {}", e))
        })?;
        info!("Registered {} application commands", registered.len());
        Ok(registered.len())
    }
}
