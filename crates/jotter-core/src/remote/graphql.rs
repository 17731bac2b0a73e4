//! GraphQL-over-HTTP adapter for the hosted notes API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{NoteInput, RemoteApi, RemoteError, RemoteNote, RemoteResult};
use crate::auth::SessionProvider;
use crate::models::NoteId;
use crate::util::{error_snippet, has_http_scheme, non_blank};

const NOTE_FIELDS: &str = "id title content picture createdAt updatedAt version deleted";

#[derive(Clone)]
pub struct GraphQlRemote {
    endpoint: String,
    client: reqwest::Client,
    session: Arc<dyn SessionProvider>,
}

impl GraphQlRemote {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        session: Arc<dyn SessionProvider>,
    ) -> RemoteResult<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            endpoint,
            client: reqwest::Client::builder().timeout(timeout).build()?,
            session,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &str,
    ) -> RemoteResult<T> {
        let token = self.session.current().ok_or(RemoteError::Unauthorized)?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|error| RemoteError::Transient(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let payload = response.json::<GraphQlResponse>().await?;
        if let Some(error) = payload.errors.into_iter().next() {
            return Err(error.into_remote_error());
        }

        let value = payload
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .filter(|value| !value.is_null())
            .ok_or_else(|| RemoteError::Rejected(format!("response did not include '{field}'")))?;

        serde_json::from_value(value)
            .map_err(|error| RemoteError::Rejected(format!("invalid '{field}' payload: {error}")))
    }
}

#[async_trait]
impl RemoteApi for GraphQlRemote {
    /// Follows `nextToken` until the connection is exhausted; a partial
    /// listing would look like remote deletions to the caller.
    async fn list_notes(&self) -> RemoteResult<Vec<RemoteNote>> {
        let query = format!(
            "query ListNotes($nextToken: String) {{ listNotes(nextToken: $nextToken) {{ items {{ {NOTE_FIELDS} }} nextToken }} }}"
        );

        let mut notes = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page: NoteConnection = self
                .execute(&query, json!({ "nextToken": next_token }), "listNotes")
                .await?;
            notes.extend(page.items);

            match page.next_token {
                None => return Ok(notes),
                Some(token) if next_token.as_deref() == Some(token.as_str()) => {
                    return Err(RemoteError::Rejected(
                        "listNotes returned the same nextToken twice".to_string(),
                    ));
                }
                Some(token) => next_token = Some(token),
            }
        }
    }

    async fn create_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote> {
        let query = format!(
            "mutation CreateNote($input: CreateNoteInput!) {{ createNote(input: $input) {{ {NOTE_FIELDS} }} }}"
        );
        self.execute(&query, json!({ "input": input }), "createNote")
            .await
    }

    async fn update_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote> {
        let query = format!(
            "mutation UpdateNote($input: UpdateNoteInput!) {{ updateNote(input: $input) {{ {NOTE_FIELDS} }} }}"
        );
        self.execute(&query, json!({ "input": input }), "updateNote")
            .await
    }

    async fn delete_note(&self, id: &NoteId) -> RemoteResult<()> {
        let query = "mutation DeleteNote($input: DeleteNoteInput!) { deleteNote(input: $input) { id } }";
        let _: Value = self
            .execute(query, json!({ "input": { "id": id } }), "deleteNote")
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    current: Option<RemoteNote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteConnection {
    #[serde(default)]
    items: Vec<RemoteNote>,
    #[serde(default)]
    next_token: Option<String>,
}

impl GraphQlError {
    fn into_remote_error(self) -> RemoteError {
        let (code, current) = self
            .extensions
            .map_or((None, None), |extensions| (extensions.code, extensions.current));

        match code.as_deref() {
            Some("CONFLICT") => current.map_or_else(
                || RemoteError::Rejected(format!("conflict without current note: {}", self.message)),
                |note| RemoteError::Conflict(Box::new(note)),
            ),
            Some("NOT_FOUND") => RemoteError::NotFound,
            Some("UNAUTHENTICATED") => RemoteError::Unauthorized,
            _ => RemoteError::Rejected(error_snippet(&self.message)),
        }
    }
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", error_snippet(body), status.as_u16())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(detail)
        }
        status if status.is_server_error() => RemoteError::Transient(detail),
        _ => RemoteError::Rejected(detail),
    }
}

fn normalize_endpoint(raw: String) -> RemoteResult<String> {
    let endpoint = non_blank(Some(raw))
        .ok_or_else(|| RemoteError::Rejected("endpoint must not be empty".to_string()))?;
    if has_http_scheme(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Rejected(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
