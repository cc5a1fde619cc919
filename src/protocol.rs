//! Message catalog exchanged with clients and content agents.
//!
//! Requests are a closed, tagged set; the host dispatches on the variant with an
//! exhaustive match. All wire names are camelCase.

use crate::model::AvailabilityReport;
use crate::types::ContextId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client and agent requests handled by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Extract the page and suggest questions; defaults to the active context
    GetPageContent {
        #[serde(default)]
        context_id: Option<ContextId>,
    },
    #[serde(rename = "promptAPI")]
    PromptApi {
        prompt: String,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    CancelSession {
        session_id: String,
    },
    #[serde(rename = "checkAPIAvailability")]
    CheckApiAvailability,
    /// Sent by a content agent once it is loaded in a context
    ContentScriptReady {
        context_id: ContextId,
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
    },
    ContextActivated {
        context_id: ContextId,
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
    },
    ContextNavigated {
        context_id: ContextId,
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    ContextClosed {
        context_id: ContextId,
    },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetPageContent { .. } => "getPageContent",
            Request::PromptApi { .. } => "promptAPI",
            Request::CancelSession { .. } => "cancelSession",
            Request::CheckApiAvailability => "checkAPIAvailability",
            Request::ContentScriptReady { .. } => "contentScriptReady",
            Request::ContextActivated { .. } => "contextActivated",
            Request::ContextNavigated { .. } => "contextNavigated",
            Request::ContextClosed { .. } => "contextClosed",
        }
    }
}

/// Request with an optional caller-chosen correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: Request,
}

/// Response paired with the id of the request it answers.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub response: Response,
}

/// Responses to requests that expect one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    PageContent(PageContentResponse),
    Prompt(PromptResponse),
    Cancel(CancelResponse),
    Availability(AvailabilityReport),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContentResponse {
    pub content: String,
    pub title: String,
    pub url: String,
    pub suggestions: Vec<String>,
    pub ai_generated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Messages pushed to clients without a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushMessage {
    DownloadProgress {
        progress: u8,
    },
    StreamingResponse {
        session_id: String,
        chunk: String,
        full_response: String,
    },
}

/// Content agent answer to a `ping`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub alive: bool,
    pub ready: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Content agent answer to `extractContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
