use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;

use super::state::Stage;
use super::state::StageStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationModule {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
}

pub const MODULES: [IntegrationModule; 4] = [
    IntegrationModule {
        id: "project-alpha",
        name: "Project Alpha",
        kind: "Project",
    },
    IntegrationModule {
        id: "knowledge-base",
        name: "Knowledge Base",
        kind: "Knowledge",
    },
    IntegrationModule {
        id: "rules-engine",
        name: "Rules Engine",
        kind: "Rules",
    },
    IntegrationModule {
        id: "mcp-server-1",
        name: "Production API",
        kind: "MCP",
    },
];

const DEFAULT_SUGGESTIONS: [&str; 4] = [
    "Analyze Q3 sales data by region",
    "Generate Python code for data processing",
    "Create a financial report with charts",
    "Summarize project metrics",
];

const PROJECT_ALPHA_SUGGESTIONS: [&str; 4] = [
    "Show me the latest updates in Project Alpha",
    "What are the pending tasks?",
    "Generate a project status report",
    "Who are the team members?",
];

const KNOWLEDGE_BASE_SUGGESTIONS: [&str; 4] = [
    "Search for documentation about APIs",
    "What are the best practices for security?",
    "Find tutorials on database optimization",
    "Summarize the onboarding guide",
];

const RULES_ENGINE_SUGGESTIONS: [&str; 4] = [
    "What rules are currently active?",
    "Explain the validation rules",
    "Show me the approval workflow",
    "Which rules apply to new users?",
];

const MCP_SERVER_SUGGESTIONS: [&str; 4] = [
    "Test the database connection",
    "List all available API endpoints",
    "Show me the authentication flow",
    "What tools are available?",
];

pub fn find_module(id: &str) -> Option<&'static IntegrationModule> {
    MODULES.iter().find(|module| module.id == id)
}

pub fn module_index(id: &str) -> Option<usize> {
    MODULES.iter().position(|module| module.id == id)
}

/// Suggestion pills for the selected module. Unknown modules fall back to
/// the default set.
pub fn suggestions_for(module: Option<&str>) -> &'static [&'static str] {
    match module {
        Some("project-alpha") => &PROJECT_ALPHA_SUGGESTIONS,
        Some("knowledge-base") => &KNOWLEDGE_BASE_SUGGESTIONS,
        Some("rules-engine") => &RULES_ENGINE_SUGGESTIONS,
        Some("mcp-server-1") => &MCP_SERVER_SUGGESTIONS,
        _ => &DEFAULT_SUGGESTIONS,
    }
}

pub fn composer_placeholder(module: Option<&str>) -> String {
    match module.and_then(find_module) {
        Some(module) => format!("Ask about {}...", module.name),
        None => "Ask Office Agent anything...".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDetail {
    pub stage_id: String,
    pub label: String,
    pub status: StageStatus,
    pub details: String,
    pub logs: Vec<String>,
}

pub fn stage_detail(stage: &Stage, now: DateTime<Utc>) -> StageDetail {
    let ts = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let last = if stage.status == StageStatus::Complete {
        "Step completed successfully"
    } else {
        "Step in progress..."
    };
    let logs = [
        format!("Step initiated: {}", stage.label),
        "Allocating resources...".to_string(),
        "Connecting to database...".to_string(),
        "Executing query...".to_string(),
        last.to_string(),
    ]
    .into_iter()
    .map(|line| format!("[{ts}] {line}"))
    .collect();

    StageDetail {
        stage_id: stage.id.clone(),
        label: stage.label.clone(),
        status: stage.status,
        details: format!(
            "Processing {}. This step involves analyzing the request and preparing necessary resources.",
            stage.label.to_lowercase()
        ),
        logs,
    }
}
