use crate::auth::{Authenticator, GmailAuthenticator, SCOPES};
use crate::models::{ThreadMessage, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use google_gmail1::Gmail;
use google_gmail1::api::UserThreadGetCall;
use hyper::client::HttpConnector;
use hyper::client::connect::Connection;
use hyper_rustls::HttpsConnector;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use yup_oauth2::ApplicationSecret;

/// Source of the messages posted to a request thread.
#[async_trait]
pub trait ThreadMessaging: Send + Sync {
    /// Messages of `thread_id` strictly newer than `since_message_id`, oldest first.
    /// `is_user_reply` marks messages sent from the user's own mailbox.
    async fn check_for_replies(
        &self,
        user: &User,
        thread_id: &str,
        since_message_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>>;
}

/// The newest message of a poll. The collaborator's order is authoritative;
/// local clocks are never consulted.
pub fn latest_message(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages.last()
}

/// Keeps the messages after the cursor. When the cursor is missing, or no longer
/// part of the thread, everything after the opening request message is new.
pub fn messages_after(messages: Vec<ThreadMessage>, since_message_id: Option<&str>) -> Vec<ThreadMessage> {
    let skip = since_message_id
        .and_then(|id| messages.iter().position(|m| m.id == id))
        .map_or(1, |pos| pos + 1);
    messages.into_iter().skip(skip).collect()
}

/// "Jane Doe <jane@example.com>" -> ("jane@example.com", Some("Jane Doe"))
pub fn split_sender(header: &str) -> (String, Option<String>) {
    let header = header.trim();
    match (header.rfind('<'), header.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let address = header[open + 1..close].trim().to_string();
            let name = header[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (address, name)
        }
        _ => (header.to_string(), None),
    }
}

type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

/// Reads threads through the Gmail API, one authorized hub per mailbox.
pub struct GmailThreadService {
    secret: ApplicationSecret,
    hubs: Mutex<HashMap<String, GmailHub>>,
}

impl GmailThreadService {
    pub fn new(secret: ApplicationSecret) -> Self {
        Self {
            secret,
            hubs: Mutex::new(HashMap::new()),
        }
    }

    async fn hub_for(&self, user: &User) -> Result<GmailHub> {
        let mut hubs = self.hubs.lock().await;
        if let Some(hub) = hubs.get(&user.email) {
            return Ok(hub.clone());
        }

        let auth: GmailAuthenticator = Authenticator::authenticate(self.secret.clone(), &user.email).await?;
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native roots")?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);
        hubs.insert(user.email.clone(), hub.clone());
        Ok(hub)
    }
}

#[async_trait]
impl ThreadMessaging for GmailThreadService {
    async fn check_for_replies(
        &self,
        user: &User,
        thread_id: &str,
        since_message_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>> {
        let hub = self.hub_for(user).await?;
        let (_, thread) = thread_request(&hub, thread_id)
            .doit()
            .await
            .context(format!("Failed to get thread {}", thread_id))?;

        let messages: Vec<ThreadMessage> = thread
            .messages
            .unwrap_or_default()
            .iter()
            .map(|msg| to_thread_message(msg, &user.email))
            .collect();

        let fresh = messages_after(messages, since_message_id);
        tracing::debug!(
            thread_id,
            since = since_message_id.unwrap_or("-"),
            fresh = fresh.len(),
            "fetched thread"
        );
        Ok(fresh)
    }
}

/// `users.threads.get` for the authorized mailbox. Without an explicit scope the
/// API client asks for the add-on-only scope, which a normal token never carries.
fn thread_request<'a, S>(hub: &'a Gmail<S>, thread_id: &str) -> UserThreadGetCall<'a, S>
where
    S: hyper::service::Service<hyper::Uri> + Clone + Send + Sync + 'static,
    S::Response: Connection + AsyncRead + AsyncWrite + Send + Unpin + 'static,
    S::Future: Send + Unpin + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    hub.users()
        .threads_get("me", thread_id)
        .format("full")
        .add_scopes(SCOPES)
}

fn to_thread_message(msg: &google_gmail1::api::Message, user_email: &str) -> ThreadMessage {
    let mut from = None;
    if let Some(payload) = &msg.payload {
        if let Some(headers) = &payload.headers {
            for header in headers {
                if header.name.as_deref() == Some("From") {
                    from = header.value.clone();
                }
            }
        }
    }

    let (from_email, from_name) = split_sender(from.as_deref().unwrap_or_default());
    let body = msg
        .payload
        .as_ref()
        .and_then(|p| extract_text_body(p, "text/plain"))
        .or_else(|| msg.snippet.clone());
    let received_at = msg
        .internal_date
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    ThreadMessage {
        id: msg.id.clone().unwrap_or_default(),
        is_user_reply: from_email.eq_ignore_ascii_case(user_email),
        from_email,
        from_name,
        body,
        received_at,
    }
}

fn extract_text_body(part: &google_gmail1::api::MessagePart, mime_type: &str) -> Option<String> {
    if let Some(mime) = &part.mime_type {
        if mime == mime_type {
            if let Some(body) = &part.body {
                if let Some(data) = &body.data {
                    use base64::{Engine as _, engine::general_purpose};
                    let data_str = String::from_utf8_lossy(data);

                    let decoded = general_purpose::URL_SAFE_NO_PAD
                        .decode(data_str.trim())
                        .or_else(|_| general_purpose::URL_SAFE.decode(data_str.trim()))
                        .or_else(|_| general_purpose::STANDARD.decode(data_str.trim()));

                    return match decoded {
                        Ok(bytes) => String::from_utf8(bytes).ok(),
                        // Already raw content
                        Err(_) => String::from_utf8(data.clone()).ok(),
                    };
                }
            }
        }
    }

    let parts = part.parts.as_ref()?;
    let full_body: String = parts
        .iter()
        .filter_map(|p| extract_text_body(p, mime_type))
        .collect();
    (!full_body.is_empty()).then_some(full_body)
}
