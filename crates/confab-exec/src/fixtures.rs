use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::contracts::ReplyAttachment;
use crate::contracts::ReplyOutcome;
use crate::contracts::ReplyPayload;
use crate::contracts::ReplyRequest;
use crate::source::ReplySource;
use crate::source::SimulatedReplySource;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read reply fixtures {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid reply fixtures: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fixture {index} has an empty match pattern")]
    EmptyPattern { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyFixture {
    #[serde(rename = "match")]
    pub pattern: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<ReplyAttachment>,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

impl ReplyFixture {
    fn matches(&self, prompt_lower: &str) -> bool {
        prompt_lower.contains(&self.pattern.to_lowercase())
    }

    fn payload(&self) -> ReplyPayload {
        ReplyPayload {
            content: self.content.clone(),
            attachments: self.attachments.clone(),
            follow_ups: self.follow_ups.clone(),
        }
    }
}

/// Canned replies keyed by prompt substring. The first case-insensitive
/// match wins; anything unmatched gets the simulated reply.
#[derive(Debug, Clone, Default)]
pub struct FixtureReplySource {
    fixtures: Vec<ReplyFixture>,
    fallback: SimulatedReplySource,
}

impl FixtureReplySource {
    pub fn new(fixtures: Vec<ReplyFixture>) -> Result<Self, FixtureError> {
        if let Some(index) = fixtures
            .iter()
            .position(|fixture| fixture.pattern.trim().is_empty())
        {
            return Err(FixtureError::EmptyPattern { index });
        }
        Ok(Self {
            fixtures,
            fallback: SimulatedReplySource,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, FixtureError> {
        let fixtures: Vec<ReplyFixture> = serde_json::from_str(raw)?;
        Self::new(fixtures)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_json_str(&raw)?;
        tracing::debug!(path = %path.display(), count = source.len(), "loaded reply fixtures");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

impl ReplySource for FixtureReplySource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn reply(&self, request: &ReplyRequest) -> ReplyOutcome {
        let prompt = request.prompt.to_lowercase();
        match self
            .fixtures
            .iter()
            .position(|fixture| fixture.matches(&prompt))
        {
            Some(index) => ReplyOutcome {
                payload: self.fixtures[index].payload(),
                logs: vec![format!(
                    "fixture {index} matched '{}'",
                    self.fixtures[index].pattern
                )],
                source: self.name(),
            },
            None => {
                tracing::debug!(turn = request.turn_id, "no fixture matched, using simulated reply");
                let mut outcome = self.fallback.reply(request);
                outcome.logs.insert(0, "no fixture matched".to_string());
                outcome
            }
        }
    }
}
