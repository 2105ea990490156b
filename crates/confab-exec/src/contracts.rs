use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub turn_id: u64,
    pub prompt: String,
    pub module: Option<String>,
    pub output_options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyFileKind {
    Pdf,
    Excel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyAttachment {
    Chart {
        title: String,
        categories: Vec<String>,
        values: Vec<u64>,
    },
    Code {
        language: String,
        source: String,
    },
    File {
        name: String,
        size: String,
        kind: ReplyFileKind,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<ReplyAttachment>,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOutcome {
    pub payload: ReplyPayload,
    pub logs: Vec<String>,
    pub source: &'static str,
}
