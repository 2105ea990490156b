use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::progression::ProgressPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordering matters: a stage only ever moves to a status that compares
/// greater than or equal to its current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Complete,
}

impl StageStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub id: String,
    pub label: String,
    pub status: StageStatus,
}

impl Stage {
    /// Returns true when the status moved forward.
    pub fn advance_to(&mut self, status: StageStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Streaming,
    Complete,
    Interrupted,
}

impl TurnPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Excel,
}

impl FileKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF Document",
            Self::Excel => "Excel Spreadsheet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
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
        size_label: String,
        kind: FileKind,
    },
}

impl Attachment {
    pub fn label(&self) -> String {
        match self {
            Self::Chart { title, .. } => format!("chart: {title}"),
            Self::Code { language, .. } => format!("{language} code"),
            Self::File {
                name, size_label, ..
            } => format!("{name} ({size_label})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub follow_ups: Vec<String>,
    pub stages: Vec<Stage>,
    pub phase: TurnPhase,
    pub checkpoint: ProgressPoint,
}

impl AssistantReply {
    pub fn is_streaming(&self) -> bool {
        self.phase == TurnPhase::Streaming
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TurnPhase::Complete
    }

    pub fn completed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.status == StageStatus::Complete)
            .count()
    }

    /// Applies a status snapshot stage by stage. Stages never regress, so an
    /// older snapshot applied late is a no-op.
    pub fn apply_snapshot(&mut self, snapshot: &[StageStatus]) -> bool {
        let mut changed = false;
        for (stage, status) in self.stages.iter_mut().zip(snapshot) {
            changed |= stage.advance_to(*status);
        }
        changed
    }

    pub fn statuses(&self) -> Vec<StageStatus> {
        self.stages.iter().map(|stage| stage.status).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOption {
    Visualizations,
    Code,
    Analysis,
}

pub const OUTPUT_OPTIONS: [OutputOption; 3] = [
    OutputOption::Visualizations,
    OutputOption::Code,
    OutputOption::Analysis,
];

impl OutputOption {
    pub fn id(self) -> &'static str {
        match self {
            Self::Visualizations => "visualizations",
            Self::Code => "code",
            Self::Analysis => "analysis",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Visualizations => "Include Charts",
            Self::Code => "Generate Code",
            Self::Analysis => "Deep Analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: TurnId,
    pub user_text: String,
    pub module: Option<String>,
    pub output_options: Vec<OutputOption>,
    pub reply: AssistantReply,
    pub rating: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub turns: Vec<Turn>,
    pub streaming: Option<TurnId>,
    pub next_turn_id: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            turns: Vec::new(),
            streaming: None,
            next_turn_id: 1,
        }
    }
}

impl Conversation {
    pub fn turn(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn turn_mut(&mut self, id: TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|turn| turn.id == id)
    }

    pub fn streaming_turn(&self) -> Option<&Turn> {
        self.streaming.and_then(|id| self.turn(id))
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn allocate_id(&mut self) -> TurnId {
        let id = TurnId(self.next_turn_id);
        self.next_turn_id += 1;
        id
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.streaming = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellTab {
    Chat,
    Activity,
}

impl ShellTab {
    pub fn next(self) -> Self {
        match self {
            Self::Chat => Self::Activity,
            Self::Activity => Self::Chat,
        }
    }

    pub fn prev(self) -> Self {
        self.next()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Activity => "Activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOverlay {
    None,
    Help,
    ModulePicker {
        selected: usize,
        tentative: Option<&'static str>,
    },
    OutputOptions {
        selected: usize,
    },
    StageDetail {
        turn_id: TurnId,
        stage_index: usize,
    },
    FilePreview {
        active: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiTheme {
    Classic,
    Dusk,
    Paper,
}

impl UiTheme {
    pub fn label(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Dusk => "dusk",
            Self::Paper => "paper",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Classic => Self::Dusk,
            Self::Dusk => Self::Paper,
            Self::Paper => Self::Classic,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "classic" => Some(Self::Classic),
            "dusk" => Some(Self::Dusk),
            "paper" => Some(Self::Paper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    App,
    Runtime,
    User,
}

impl LogSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Runtime => "runtime",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub ts_ms: Option<u64>,
    pub source: LogSource,
    pub context: Option<String>,
    pub message: String,
    pub turn_id: Option<TurnId>,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            level,
            ts_ms: None,
            source,
            context: None,
            message: message.into(),
            turn_id: None,
        }
    }

    pub fn with_turn(mut self, turn_id: TurnId) -> Self {
        self.turn_id = Some(turn_id);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Bounded activity log. Sequence numbers restart at 1 after `clear`.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn append(&mut self, mut entry: LogEntry) {
        if self.cap == 0 {
            return;
        }
        entry.seq = self.next_seq;
        self.next_seq += 1;
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.next_seq = 1;
    }

    /// Gives every entry appended without a timestamp the time `ts_ms`.
    /// Unstamped entries only ever sit at the tail.
    pub fn stamp_missing(&mut self, ts_ms: u64) -> usize {
        let mut stamped = 0;
        for entry in self.buf.iter_mut().rev() {
            if entry.ts_ms.is_some() {
                break;
            }
            entry.ts_ms = Some(ts_ms);
            stamped += 1;
        }
        stamped
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn for_turn(&self, turn_id: TurnId) -> impl Iterator<Item = &LogEntry> {
        self.buf
            .iter()
            .filter(move |entry| entry.turn_id == Some(turn_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub progress_delay: Duration,
    pub completion_delay: Duration,
}

impl Default for StageTiming {
    fn default() -> Self {
        Self {
            progress_delay: Duration::from_millis(1_500),
            completion_delay: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub id: String,
    pub name: String,
    pub kind: FileKind,
    pub size_label: String,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub number: u64,
    pub title: Arc<str>,
}

#[derive(Debug, Clone)]
pub struct ShellRouting {
    pub tab: ShellTab,
}

#[derive(Debug, Clone)]
pub struct ShellInteraction {
    pub overlay: ShellOverlay,
    pub input: String,
    pub input_history: Vec<String>,
    pub history_index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ShellSelection {
    pub module: Option<&'static str>,
    pub output_options: BTreeSet<OutputOption>,
    pub hidden_stage_panels: BTreeSet<TurnId>,
    pub open_files: Vec<OpenFile>,
    pub opened_file_count: u64,
}

#[derive(Debug, Clone)]
pub struct ShellCustomization {
    pub theme: UiTheme,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    pub session: SessionInfo,
    pub routing: ShellRouting,
    pub conversation: Conversation,
    pub interaction: ShellInteraction,
    pub selection: ShellSelection,
    pub customization: ShellCustomization,
    pub timing: StageTiming,
    pub logs: LogBuffer,
}

pub const LOG_CAPACITY: usize = 2_000;

impl ChatState {
    pub fn new(timing: StageTiming, theme: UiTheme) -> Self {
        Self {
            session: SessionInfo {
                number: 1,
                title: session_title(1),
            },
            routing: ShellRouting {
                tab: ShellTab::Chat,
            },
            conversation: Conversation::default(),
            interaction: ShellInteraction {
                overlay: ShellOverlay::None,
                input: String::new(),
                input_history: Vec::new(),
                history_index: None,
            },
            selection: ShellSelection::default(),
            customization: ShellCustomization { theme },
            timing,
            logs: LogBuffer::new(LOG_CAPACITY),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.conversation.streaming.is_some()
    }

    pub fn stage_panel_hidden(&self, turn_id: TurnId) -> bool {
        self.selection.hidden_stage_panels.contains(&turn_id)
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(StageTiming::default(), UiTheme::Classic)
    }
}

pub fn session_title(number: u64) -> Arc<str> {
    format!("Session {number}").into()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn stage(status: StageStatus) -> Stage {
        Stage {
            id: "1".to_string(),
            label: "Request received and parsed successfully".to_string(),
            status,
        }
    }

    #[test]
    fn stage_never_moves_backwards() {
        let mut stage = stage(StageStatus::Processing);
        assert!(!stage.advance_to(StageStatus::Pending));
        assert_eq!(stage.status, StageStatus::Processing);
        assert!(stage.advance_to(StageStatus::Complete));
        assert!(!stage.advance_to(StageStatus::Complete));
    }

    #[test]
    fn attachments_serialize_with_type_tag() {
        let value = serde_json::to_value(Attachment::File {
            name: "Q3_Raw_Data.xlsx".to_string(),
            size_label: "856 KB".to_string(),
            kind: FileKind::Excel,
        })
        .expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "type": "file",
                "name": "Q3_Raw_Data.xlsx",
                "size_label": "856 KB",
                "kind": "excel",
            })
        );
    }

    #[test]
    fn conversation_ids_survive_clear() {
        let mut conversation = Conversation::default();
        assert_eq!(conversation.allocate_id(), TurnId(1));
        conversation.clear();
        assert_eq!(conversation.allocate_id(), TurnId(2));
    }

    #[test]
    fn theme_parse_is_case_insensitive() {
        assert_eq!(UiTheme::parse(" Dusk "), Some(UiTheme::Dusk));
        assert_eq!(UiTheme::parse("neon"), None);
        assert_eq!(UiTheme::Paper.next(), UiTheme::Classic);
    }
}
