//! GraphQL schema contract: operation documents, request variables and
//! response/subscription decoding. No transport lives here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChatError;
use crate::message::Message;

pub const GET_MESSAGES: &str = r#"query GetMessages($first: Int, $after: MessagesCursor) {
  messages(first: $first, after: $after) {
    edges {
      node { id text status updatedAt sender }
      cursor
    }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
  }
}"#;

pub const SEND_MESSAGE: &str = r#"mutation SendMessage($text: String!) {
  sendMessage(text: $text) { id text status updatedAt sender }
}"#;

pub const MESSAGE_ADDED_SUBSCRIPTION: &str = r#"subscription OnMessageAdded {
  messageAdded { id text status updatedAt sender }
}"#;

pub const MESSAGE_UPDATED_SUBSCRIPTION: &str = r#"subscription OnMessageUpdated {
  messageUpdated { id text status updatedAt sender }
}"#;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub has_previous_page: bool,
    #[serde(default)]
    pub start_cursor: Option<String>,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdge {
    pub node: Message,
    pub cursor: String,
}

/// One page of history (`MessagePage` in the schema).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageConnection {
    pub edges: Vec<MessageEdge>,
    pub page_info: PageInfo,
}

impl MessageConnection {
    pub fn into_messages(self) -> Vec<Message> {
        self.edges.into_iter().map(|e| e.node).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub first: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl PageRequest {
    pub fn variables(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn send_message_variables(text: &str) -> Value {
    serde_json::json!({ "text": text })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionStream {
    MessageAdded,
    MessageUpdated,
}

impl SubscriptionStream {
    pub fn field(self) -> &'static str {
        match self {
            SubscriptionStream::MessageAdded => "messageAdded",
            SubscriptionStream::MessageUpdated => "messageUpdated",
        }
    }

    pub fn document(self) -> &'static str {
        match self {
            SubscriptionStream::MessageAdded => MESSAGE_ADDED_SUBSCRIPTION,
            SubscriptionStream::MessageUpdated => MESSAGE_UPDATED_SUBSCRIPTION,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

fn decode_field<T: DeserializeOwned>(body: &str, field: &'static str) -> Result<T, ChatError> {
    let resp: GraphQlResponse = serde_json::from_str(body)?;
    if !resp.errors.is_empty() {
        return Err(ChatError::GraphQl(
            resp.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    let value = resp
        .data
        .and_then(|mut d| d.get_mut(field).map(Value::take))
        .filter(|v| !v.is_null())
        .ok_or(ChatError::MissingData(field))?;
    Ok(serde_json::from_value(value)?)
}

/// Decodes a `GetMessages` response body.
pub fn decode_messages_response(body: &str) -> Result<MessageConnection, ChatError> {
    decode_field(body, "messages")
}

/// Decodes a `SendMessage` response body.
pub fn decode_send_response(body: &str) -> Result<Message, ChatError> {
    decode_field(body, "sendMessage")
}

/// Decodes one subscription payload. Accepts either the GraphQL envelope
/// (`{"data":{"messageAdded":{..}}}`) or the bare message object.
pub fn decode_subscription_payload(
    stream: SubscriptionStream,
    payload: &str,
) -> Result<Message, ChatError> {
    let malformed = |reason: String| ChatError::MalformedEvent {
        stream: stream.field(),
        reason,
    };
    let value: Value = serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;
    let is_envelope = value.get("data").is_some() || value.get("errors").is_some();
    let node = if is_envelope {
        let resp: GraphQlResponse =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
        if !resp.errors.is_empty() {
            let messages: Vec<String> = resp.errors.into_iter().map(|e| e.message).collect();
            return Err(malformed(messages.join("; ")));
        }
        resp.data
            .and_then(|mut d| d.get_mut(stream.field()).map(Value::take))
            .filter(|v| !v.is_null())
            .ok_or_else(|| malformed(format!("missing `{}`", stream.field())))?
    } else {
        value
    };
    serde_json::from_value(node).map_err(|e| malformed(e.to_string()))
}
