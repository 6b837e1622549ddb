//! REST collaborators: history page fetch plus edit/delete calls.
//!
//! These are request/response contracts only; the outcomes of edits and
//! deletes come back over the socket as `message.updated` /
//! `message.deleted` frames and flow through the reconciler like any
//! other server event.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use sync_core::{EngineError, EngineErrorCategory, Message, classify_http_status};

use crate::auth::TokenProvider;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("invalid API base URL: {0}")]
    InvalidBase(#[source] url::ParseError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Servers have shipped the history page both as a bare array and wrapped
/// in an object; accept either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryPage {
    Bare(Vec<Message>),
    Wrapped { messages: Vec<Message> },
}

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// HTTP client for the chat REST API.
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl RestClient {
    pub fn new(base: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, RestError> {
        let base = Url::parse(base).map_err(RestError::InvalidBase)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            tokens,
        })
    }

    /// Fetch one server-sorted history page for a room, by canonical key.
    pub async fn fetch_history(
        &self,
        canonical_room: &str,
        limit: u16,
    ) -> Result<Vec<Message>, RestError> {
        let mut url = self.room_url(canonical_room, "messages")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        let response = self.check_status(response, "history_fetch_failed")?;

        let page: HistoryPage = response.json().await.map_err(|err| {
            EngineError::new(
                EngineErrorCategory::Serialization,
                "history_decode_failed",
                err.to_string(),
            )
        })?;
        Ok(match page {
            HistoryPage::Bare(messages) => messages,
            HistoryPage::Wrapped { messages } => messages,
        })
    }

    /// Submit a message edit. The confirmed edit arrives on the socket.
    pub async fn edit_message(
        &self,
        canonical_room: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), RestError> {
        let url = self.room_url(canonical_room, &format!("messages/{message_id}"))?;
        let response = self
            .authorized(self.http.patch(url))
            .json(&EditBody { content })
            .send()
            .await
            .map_err(transport_error)?;
        self.check_status(response, "message_edit_failed")?;
        Ok(())
    }

    /// Submit a message deletion. The tombstone arrives on the socket.
    pub async fn delete_message(
        &self,
        canonical_room: &str,
        message_id: &str,
        reason: Option<&str>,
    ) -> Result<(), RestError> {
        let url = self.room_url(canonical_room, &format!("messages/{message_id}"))?;
        let response = self
            .authorized(self.http.delete(url))
            .json(&DeleteBody { reason })
            .send()
            .await
            .map_err(transport_error)?;
        self.check_status(response, "message_delete_failed")?;
        Ok(())
    }

    fn room_url(&self, canonical_room: &str, tail: &str) -> Result<Url, RestError> {
        self.base
            .join(&format!("api/chat/rooms/{canonical_room}/{tail}"))
            .map_err(RestError::InvalidBase)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_status(
        &self,
        response: reqwest::Response,
        code: &str,
    ) -> Result<reqwest::Response, RestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.force_logout();
        }
        Err(EngineError::new(
            classify_http_status(status.as_u16()),
            code,
            format!("server returned {status}"),
        )
        .into())
    }
}

fn transport_error(err: reqwest::Error) -> RestError {
    EngineError::new(
        EngineErrorCategory::Network,
        "http_transport_failed",
        err.to_string(),
    )
    .into()
}
