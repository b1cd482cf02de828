use chrono::{DateTime, Utc};
use reputebot_core::{
    ConfigError, CoreError, FeedPage, Notification, PlatformApiError, Post, PostRef, Profile,
    ReplyRef,
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

const POST_COLLECTION: &str = "app.bsky.feed.post";
const REPOST_REASON: &str = "app.bsky.feed.defs#reasonRepost";

/// The platform operations the bot needs. Every call goes through the request queue.
pub trait PlatformApi: Send + Sync {
    fn list_notifications(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Notification>, CoreError>> + Send;

    fn fetch_profile(&self, actor: &str)
        -> impl Future<Output = Result<Profile, CoreError>> + Send;

    /// One page of an author's feed, newest first.
    fn fetch_author_feed(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> impl Future<Output = Result<FeedPage, CoreError>> + Send;

    fn post_reply(
        &self,
        reply_to: &ReplyRef,
        text: &str,
    ) -> impl Future<Output = Result<PostRef, CoreError>> + Send;

    fn mark_seen(&self, seen_at: DateTime<Utc>)
        -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Running count of session upkeep calls: logins, refreshes and requests
    /// replayed after a refresh. The queue charges them to the rate budget.
    fn session_calls(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBasic {
    did: String,
    handle: String,
    display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDetailed {
    did: String,
    handle: String,
    display_name: Option<String>,
    posts_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(default)]
    text: String,
    created_at: Option<String>,
    reply: Option<ReplyRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationView {
    uri: String,
    cid: String,
    author: ProfileBasic,
    reason: String,
    #[serde(default)]
    record: PostRecord,
    indexed_at: String,
}

#[derive(Debug, Deserialize)]
struct ListNotificationsResponse {
    notifications: Vec<NotificationView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: ProfileBasic,
    #[serde(default)]
    record: PostRecord,
    indexed_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedReason {
    #[serde(rename = "$type")]
    kind: String,
    indexed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
    reason: Option<FeedReason>,
}

#[derive(Debug, Deserialize)]
struct AuthorFeedResponse {
    feed: Vec<FeedViewPost>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

impl NotificationView {
    fn into_notification(self) -> Option<Notification> {
        let indexed_at = parse_timestamp(&self.indexed_at)?;
        Some(Notification {
            uri: self.uri,
            cid: self.cid,
            reason: self.reason,
            author_handle: self.author.handle,
            author_did: self.author.did,
            indexed_at,
            reply: self.record.reply,
        })
    }
}

impl FeedViewPost {
    fn into_post(self) -> Option<Post> {
        let is_repost = self
            .reason
            .as_ref()
            .map(|reason| reason.kind == REPOST_REASON)
            .unwrap_or(false);

        // A repost is timed by when it was reposted, not when the original was written.
        let timestamp = self
            .reason
            .as_ref()
            .and_then(|reason| reason.indexed_at.as_deref())
            .and_then(parse_timestamp)
            .or_else(|| {
                self.post
                    .record
                    .created_at
                    .as_deref()
                    .and_then(parse_timestamp)
            })
            .or_else(|| parse_timestamp(&self.post.indexed_at))?;

        let is_original = !is_repost && self.post.record.reply.is_none();

        Some(Post {
            id: self.post.uri,
            author_handle: self.post.author.handle,
            text: self.post.record.text,
            timestamp,
            is_original,
        })
    }
}

/// Thin XRPC client for a Bluesky PDS.
#[derive(Debug)]
pub struct BlueskyClient {
    http_client: Client,
    service_url: String,
    identifier: String,
    password: String,
    session: RwLock<Option<Session>>,
    session_calls: AtomicU64,
}

impl BlueskyClient {
    pub fn new(
        service_url: &str,
        identifier: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let parsed = Url::parse(service_url).map_err(|e| ConfigError::InvalidValue {
            field: "bluesky.service_url".to_string(),
            value: format!("{service_url} ({e})"),
        })?;

        let http_client = Client::builder()
            .user_agent(concat!("reputebot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            service_url: parsed.as_str().trim_end_matches('/').to_string(),
            identifier,
            password,
            session: RwLock::new(None),
            session_calls: AtomicU64::new(0),
        })
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, nsid)
    }

    /// Opens a session with the configured handle and app password.
    pub async fn login(&self) -> Result<(), CoreError> {
        let body = CreateSessionRequest {
            identifier: &self.identifier,
            password: &self.password,
        };

        self.session_calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http_client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = read_error_body(response).await;
            let reason = body
                .message
                .or(body.error)
                .unwrap_or_else(|| status.to_string());
            error!("Login failed for {}: {}", self.identifier, reason);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    PlatformApiError::RateLimitExceeded { retry_after: None }.into()
                }
                s if s.is_server_error() => PlatformApiError::ServerError {
                    status_code: s.as_u16(),
                }
                .into(),
                _ => PlatformApiError::AuthenticationFailed { reason }.into(),
            });
        }

        let session: Session = parse_json(response, "createSession").await?;
        info!("Logged in as {} ({})", session.handle, session.did);
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<(), CoreError> {
        let refresh_jwt = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(session) => session.refresh_jwt.clone(),
                None => return self.login().await,
            }
        };

        debug!("Refreshing session");
        self.session_calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http_client
            .post(self.xrpc_url("com.atproto.server.refreshSession"))
            .bearer_auth(refresh_jwt)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            warn!(
                "Session refresh failed with status {}, logging in again",
                response.status()
            );
            return self.login().await;
        }

        let session: Session = parse_json(response, "refreshSession").await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn current_session(&self) -> Result<Session, CoreError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }
        self.login().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or(CoreError::Platform(PlatformApiError::InvalidToken))
    }

    /// Sends an authenticated XRPC call, refreshing the session once if the token has expired.
    async fn make_request(
        &self,
        method: Method,
        nsid: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        resource: &str,
    ) -> Result<Response, CoreError> {
        let mut refreshed = false;

        loop {
            let session = self.current_session().await?;
            let mut request_builder = self
                .http_client
                .request(method.clone(), self.xrpc_url(nsid))
                .bearer_auth(&session.access_jwt);

            if !query.is_empty() {
                request_builder = request_builder.query(query);
            }
            if let Some(body) = body {
                request_builder = request_builder.json(body);
            }

            debug!("XRPC {} {}", method, nsid);
            let response = request_builder
                .send()
                .await
                .map_err(map_transport_error)?;

            if response.status().is_success() {
                return Ok(response);
            }

            let error = map_error_response(response, nsid, resource).await;
            match error {
                PlatformApiError::InvalidToken if !refreshed => {
                    warn!("Access token rejected on {}, refreshing session", nsid);
                    self.refresh_session().await?;
                    self.session_calls.fetch_add(1, Ordering::Relaxed);
                    refreshed = true;
                }
                other => return Err(other.into()),
            }
        }
    }
}

impl PlatformApi for BlueskyClient {
    async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>, CoreError> {
        let response = self
            .make_request(
                Method::GET,
                "app.bsky.notification.listNotifications",
                &[("limit", limit.to_string())],
                None,
                "notifications",
            )
            .await?;

        let listing: ListNotificationsResponse =
            parse_json(response, "listNotifications").await?;
        let total = listing.notifications.len();
        let notifications: Vec<Notification> = listing
            .notifications
            .into_iter()
            .filter_map(NotificationView::into_notification)
            .collect();

        if notifications.len() < total {
            warn!(
                "Dropped {} notifications with unreadable timestamps",
                total - notifications.len()
            );
        }
        debug!("Retrieved {} notifications", notifications.len());
        Ok(notifications)
    }

    async fn fetch_profile(&self, actor: &str) -> Result<Profile, CoreError> {
        let response = self
            .make_request(
                Method::GET,
                "app.bsky.actor.getProfile",
                &[("actor", actor.to_string())],
                None,
                actor,
            )
            .await?;

        let profile: ProfileDetailed = parse_json(response, "getProfile").await?;
        debug!("Retrieved profile for {}", profile.handle);
        Ok(Profile {
            did: profile.did,
            handle: profile.handle,
            display_name: profile.display_name,
            posts_count: profile.posts_count,
        })
    }

    async fn fetch_author_feed(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<FeedPage, CoreError> {
        let mut query = vec![("actor", actor.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .make_request(Method::GET, "app.bsky.feed.getAuthorFeed", &query, None, actor)
            .await?;

        let feed: AuthorFeedResponse = parse_json(response, "getAuthorFeed").await?;
        let posts: Vec<Post> = feed
            .feed
            .into_iter()
            .filter_map(FeedViewPost::into_post)
            .collect();

        debug!("Retrieved {} posts for {}", posts.len(), actor);
        Ok(FeedPage {
            posts,
            cursor: feed.cursor,
        })
    }

    async fn post_reply(&self, reply_to: &ReplyRef, text: &str) -> Result<PostRef, CoreError> {
        let session = self.current_session().await?;
        let body = json!({
            "repo": session.did,
            "collection": POST_COLLECTION,
            "record": {
                "$type": POST_COLLECTION,
                "text": text,
                "createdAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "reply": reply_to,
            }
        });

        let response = self
            .make_request(
                Method::POST,
                "com.atproto.repo.createRecord",
                &[],
                Some(&body),
                &reply_to.parent.uri,
            )
            .await?;

        let created: PostRef = parse_json(response, "createRecord").await?;
        info!("Posted reply {} to {}", created.uri, reply_to.parent.uri);
        Ok(created)
    }

    async fn mark_seen(&self, seen_at: DateTime<Utc>) -> Result<(), CoreError> {
        let body = json!({
            "seenAt": seen_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        self.make_request(
            Method::POST,
            "app.bsky.notification.updateSeen",
            &[],
            Some(&body),
            "notifications",
        )
        .await?;
        debug!("Marked notifications seen up to {}", seen_at);
        Ok(())
    }

    fn session_calls(&self) -> u64 {
        self.session_calls.load(Ordering::Relaxed)
    }
}

fn map_transport_error(e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        CoreError::Platform(PlatformApiError::RequestTimeout)
    } else {
        error!("Network error: {}", e);
        CoreError::Network(e)
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, CoreError> {
    response.json::<T>().await.map_err(|e| {
        error!("Failed to parse {} response: {}", what, e);
        CoreError::Platform(PlatformApiError::InvalidResponse {
            details: format!("Failed to parse {what} response"),
        })
    })
}

async fn read_error_body(response: Response) -> XrpcErrorBody {
    response.json::<XrpcErrorBody>().await.unwrap_or_default()
}

/// Seconds until the budget resets, from `ratelimit-reset` (epoch seconds) or `retry-after`.
fn retry_after_hint(response: &Response) -> Option<u64> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
    };

    if let Some(reset_at) = header("ratelimit-reset") {
        let now = Utc::now().timestamp();
        return Some((reset_at - now).max(0) as u64);
    }
    header("retry-after").map(|secs| secs.max(0) as u64)
}

async fn map_error_response(response: Response, nsid: &str, resource: &str) -> PlatformApiError {
    let status = response.status();
    let retry_after = retry_after_hint(&response);
    let body = read_error_body(response).await;
    let error_name = body.error.as_deref().unwrap_or_default();
    let message = body.message.clone().unwrap_or_default();

    warn!(
        "XRPC {} failed with {}: {} {}",
        nsid, status, error_name, message
    );

    match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformApiError::RateLimitExceeded { retry_after },
        StatusCode::UNAUTHORIZED => PlatformApiError::InvalidToken,
        _ if matches!(error_name, "ExpiredToken" | "InvalidToken") => {
            PlatformApiError::InvalidToken
        }
        StatusCode::FORBIDDEN => PlatformApiError::Forbidden {
            resource: resource.to_string(),
        },
        _ if matches!(error_name, "BlockedActor" | "BlockedByActor") => {
            PlatformApiError::Forbidden {
                resource: resource.to_string(),
            }
        }
        StatusCode::NOT_FOUND => not_found(nsid, resource),
        _ if error_name.ends_with("NotFound")
            || error_name == "AccountDeactivated"
            || error_name == "AccountTakedown"
            || message.to_lowercase().contains("not found") =>
        {
            not_found(nsid, resource)
        }
        StatusCode::NOT_IMPLEMENTED => PlatformApiError::EndpointUnavailable {
            endpoint: nsid.to_string(),
        },
        s if s.is_server_error() => PlatformApiError::ServerError {
            status_code: s.as_u16(),
        },
        _ => PlatformApiError::BadRequest {
            details: if message.is_empty() {
                format!("{status} {error_name}")
            } else {
                message
            },
        },
    }
}

fn not_found(nsid: &str, resource: &str) -> PlatformApiError {
    if nsid.starts_with("app.bsky.actor") || nsid == "app.bsky.feed.getAuthorFeed" {
        PlatformApiError::ActorNotFound {
            actor: resource.to_string(),
        }
    } else {
        PlatformApiError::PostNotFound {
            uri: resource.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_bad_service_url() {
        let result = BlueskyClient::new(
            "not a url",
            "bot.bsky.social".to_string(),
            "app-password".to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_unreachable_server_is_a_network_error() {
        let client = BlueskyClient::new(
            "http://127.0.0.1:1",
            "bot.bsky.social".to_string(),
            "app-password".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = tokio_test::block_on(client.fetch_profile("alice.bsky.social"));
        match result {
            Err(e) => assert!(!e.is_auth_failure()),
            Ok(profile) => panic!("unexpected profile {profile:?}"),
        }
    }

    #[test]
    fn test_xrpc_url_has_no_double_slash() {
        let client = BlueskyClient::new(
            "https://bsky.social/",
            "bot.bsky.social".to_string(),
            "app-password".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.xrpc_url("app.bsky.actor.getProfile"),
            "https://bsky.social/xrpc/app.bsky.actor.getProfile"
        );
    }

    #[test]
    fn test_repost_is_not_original() {
        let item: FeedViewPost = serde_json::from_value(json!({
            "post": {
                "uri": "at://did:plc:orig/app.bsky.feed.post/1",
                "cid": "bafy1",
                "author": { "did": "did:plc:orig", "handle": "orig.bsky.social" },
                "record": { "text": "hello", "createdAt": "2026-01-01T00:00:00.000Z" },
                "indexedAt": "2026-01-01T00:00:01.000Z"
            },
            "reason": {
                "$type": "app.bsky.feed.defs#reasonRepost",
                "by": { "did": "did:plc:me", "handle": "me.bsky.social" },
                "indexedAt": "2026-02-01T00:00:00.000Z"
            }
        }))
        .unwrap();

        let post = item.into_post().unwrap();
        assert!(!post.is_original);
        assert_eq!(post.timestamp, parse_timestamp("2026-02-01T00:00:00Z").unwrap());
    }

    #[test]
    fn test_reply_is_not_original() {
        let item: FeedViewPost = serde_json::from_value(json!({
            "post": {
                "uri": "at://did:plc:me/app.bsky.feed.post/2",
                "cid": "bafy2",
                "author": { "did": "did:plc:me", "handle": "me.bsky.social" },
                "record": {
                    "text": "agreed",
                    "createdAt": "2026-01-01T00:00:00.000Z",
                    "reply": {
                        "root": { "uri": "at://did:plc:x/app.bsky.feed.post/r", "cid": "r" },
                        "parent": { "uri": "at://did:plc:x/app.bsky.feed.post/p", "cid": "p" }
                    }
                },
                "indexedAt": "2026-01-01T00:00:01.000Z"
            }
        }))
        .unwrap();

        let post = item.into_post().unwrap();
        assert!(!post.is_original);
        assert_eq!(post.text, "agreed");
    }
}
