//! Typed wrapper over the `/Ratings` REST endpoints.
//!
//! Maps HTTP statuses onto [`SyncError`] once so the sync components only
//! deal with decoded values.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::common::{
    BanEntry, BanRequest, BanStatus, ChatMessage, Draft, MessagesSnapshot, Moderator,
    NotificationEvent, OnlineUser, Role,
};
use crate::error::{SyncError, SyncResult};

#[derive(Clone)]
pub struct RatingsApi {
    transport: Arc<dyn Transport>,
}

impl RatingsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    // ========== Notifications ==========

    pub async fn notifications_since(
        &self,
        since: DateTime<Utc>,
    ) -> SyncResult<Vec<NotificationEvent>> {
        let request = ApiRequest::get("Notifications")
            .query("since", since.to_rfc3339_opts(SecondsFormat::Millis, true));
        self.fetch_json(request).await
    }

    pub async fn send_test_notification(&self) -> SyncResult<()> {
        self.fetch_unit(ApiRequest::post("Notifications/Test")).await
    }

    // ========== Chat ==========

    pub async fn heartbeat(&self, is_admin_hint: bool) -> SyncResult<Role> {
        let request = ApiRequest::post("Chat/Heartbeat").json(json!({ "isAdmin": is_admin_hint }));
        self.fetch_json(request).await
    }

    pub async fn messages(&self, limit: u32) -> SyncResult<MessagesSnapshot> {
        let request = ApiRequest::get("Chat/Messages").query("limit", limit.to_string());
        self.fetch_json(request).await
    }

    pub async fn post_message(&self, draft: &Draft) -> SyncResult<ChatMessage> {
        let request = ApiRequest::post("Chat/Messages").json(json!({
            "content": draft.content,
            "gifUrl": draft.gif_url,
        }));
        self.fetch_json(request).await
    }

    pub async fn delete_message(&self, message_id: &str) -> SyncResult<()> {
        self.fetch_unit(ApiRequest::delete(format!("Chat/Messages/{message_id}")))
            .await
    }

    pub async fn clear_messages(&self) -> SyncResult<()> {
        self.fetch_unit(ApiRequest::delete("Chat/Messages/Clear")).await
    }

    pub async fn online_users(&self) -> SyncResult<Vec<OnlineUser>> {
        self.fetch_json(ApiRequest::get("Chat/Users/Online")).await
    }

    pub async fn typing(&self, is_typing: bool) -> SyncResult<()> {
        let request = ApiRequest::post("Chat/Typing").json(json!({ "isTyping": is_typing }));
        self.fetch_unit(request).await
    }

    // ========== Moderation ==========

    pub async fn ban_status(&self) -> SyncResult<BanStatus> {
        self.fetch_json(ApiRequest::get("Chat/BanStatus")).await
    }

    pub async fn ban(&self, ban: &BanRequest) -> SyncResult<()> {
        let request = ApiRequest::post("Chat/Ban").json(serde_json::to_value(ban)?);
        self.fetch_unit(request).await
    }

    pub async fn unban(&self, user_id: &str) -> SyncResult<()> {
        self.fetch_unit(ApiRequest::delete("Chat/Ban").query("userId", user_id))
            .await
    }

    pub async fn bans(&self) -> SyncResult<Vec<BanEntry>> {
        self.fetch_json(ApiRequest::get("Chat/Ban/List")).await
    }

    pub async fn add_moderator(&self, user_id: &str, user_name: &str) -> SyncResult<()> {
        let request = ApiRequest::post("Chat/Moderators")
            .json(json!({ "userId": user_id, "userName": user_name }));
        self.fetch_unit(request).await
    }

    pub async fn remove_moderator(&self, user_id: &str) -> SyncResult<()> {
        self.fetch_unit(ApiRequest::delete(format!("Chat/Moderators/{user_id}")))
            .await
    }

    pub async fn moderators(&self) -> SyncResult<Vec<Moderator>> {
        self.fetch_json(ApiRequest::get("Chat/Moderators")).await
    }

    // ========== Plumbing ==========

    async fn fetch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> SyncResult<T> {
        let response = self.send(request).await?;
        serde_json::from_str(&response.body).map_err(SyncError::from)
    }

    async fn fetch_unit(&self, request: ApiRequest) -> SyncResult<()> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let response = self.transport.execute(request).await?;
        check_status(response)
    }
}

fn check_status(response: ApiResponse) -> SyncResult<ApiResponse> {
    match response.status {
        200..=299 => Ok(response),
        401 => Err(SyncError::AuthExpired),
        403 => Err(SyncError::Forbidden),
        429 => Err(SyncError::RateLimited),
        status => Err(SyncError::Http { status }),
    }
}
