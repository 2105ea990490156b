use super::state::Attachment;
use super::state::LogEntry;
use super::state::OutputOption;
use super::state::ShellTab;
use super::state::TurnId;

#[derive(Debug, Clone)]
pub enum ShellAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone)]
pub enum UserAction {
    ToggleHelp,
    CloseOverlay,
    NextTab,
    PrevTab,
    SelectTab(ShellTab),
    CycleTheme,

    InputChar(char),
    InputBackspace,
    InputPaste(String),
    HistoryUp,
    HistoryDown,
    Submit,
    SubmitSuggestion(usize),
    SubmitFollowUp {
        turn_id: TurnId,
        index: usize,
    },
    StopTurn,

    ToggleStagePanel {
        turn_id: TurnId,
    },
    InspectStage {
        turn_id: TurnId,
        stage_index: usize,
    },

    OpenModulePicker,
    OpenOutputOptions,
    OverlayMoveUp,
    OverlayMoveDown,
    OverlayToggle,
    OverlaySubmit,
    ResetModule,
    ToggleOutputOption(OutputOption),

    OpenAttachment {
        turn_id: TurnId,
        index: usize,
    },
    CopyAttachment {
        turn_id: TurnId,
        index: usize,
    },
    NextFileTab,
    PrevFileTab,
    CloseFileTab(usize),
    CloseFilePreview,

    RateTurn {
        turn_id: TurnId,
        stars: u8,
    },

    NewSession,
    ClearConversation,
}

/// Final content for a streaming turn, produced by whatever stands in for
/// the chat backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedReply {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub follow_ups: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RuntimeAction {
    AdvanceStages { turn_id: TurnId },
    CompleteTurn { turn_id: TurnId, reply: CompletedReply },
    AppendLog(LogEntry),
}
