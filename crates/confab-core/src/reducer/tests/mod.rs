use pretty_assertions::assert_eq;

pub(super) use super::check_submission;
pub(super) use super::reduce;
pub(super) use crate::actions::CompletedReply;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::ShellAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::error::SubmitRejection;
pub(super) use crate::progression::ProgressPoint;
pub(super) use crate::reducer::ConsoleEffect;
pub(super) use crate::scheduler::ScheduledStep;
pub(super) use crate::state::Attachment;
pub(super) use crate::state::ChatState;
pub(super) use crate::state::FileKind;
pub(super) use crate::state::LogBuffer;
pub(super) use crate::state::LogEntry;
pub(super) use crate::state::LogLevel;
pub(super) use crate::state::LogSource;
pub(super) use crate::state::OutputOption;
pub(super) use crate::state::ShellOverlay;
pub(super) use crate::state::ShellTab;
pub(super) use crate::state::StageStatus;
pub(super) use crate::state::StageTiming;
pub(super) use crate::state::TurnId;
pub(super) use crate::state::TurnPhase;
pub(super) use crate::state::UiTheme;

mod attachments;
mod invariants;

fn state() -> ChatState {
    ChatState::new(StageTiming::default(), UiTheme::Classic)
}

fn user(state: &mut ChatState, action: UserAction) -> Vec<ConsoleEffect> {
    reduce(state, ShellAction::User(action))
}

fn runtime(state: &mut ChatState, action: RuntimeAction) -> Vec<ConsoleEffect> {
    reduce(state, ShellAction::Runtime(action))
}

fn type_text(state: &mut ChatState, text: &str) {
    for ch in text.chars() {
        user(state, UserAction::InputChar(ch));
    }
}

/// Types `text` and submits it, returning the id of the new turn.
fn submit(state: &mut ChatState, text: &str) -> TurnId {
    type_text(state, text);
    let effects = user(state, UserAction::Submit);
    let turn_id = state
        .conversation
        .streaming
        .expect("submission should start a turn");
    assert_eq!(
        effects,
        vec![
            ConsoleEffect::Schedule {
                turn_id,
                step: ScheduledStep::Progress,
                delay: state.timing.progress_delay,
            },
            ConsoleEffect::RequestFrame,
        ]
    );
    turn_id
}

fn advance(state: &mut ChatState, turn_id: TurnId) -> Vec<ConsoleEffect> {
    runtime(state, RuntimeAction::AdvanceStages { turn_id })
}

fn complete(state: &mut ChatState, turn_id: TurnId, reply: CompletedReply) -> Vec<ConsoleEffect> {
    runtime(state, RuntimeAction::CompleteTurn { turn_id, reply })
}

fn statuses(state: &ChatState, turn_id: TurnId) -> Vec<StageStatus> {
    state
        .conversation
        .turn(turn_id)
        .expect("turn exists")
        .reply
        .statuses()
}

fn file(name: &str, kind: FileKind) -> Attachment {
    Attachment::File {
        name: name.to_string(),
        size_label: "1.2 MB".to_string(),
        kind,
    }
}

fn sample_reply() -> CompletedReply {
    CompletedReply {
        text: "Here is your breakdown.".to_string(),
        attachments: vec![
            file("Q3_Sales_Summary.pdf", FileKind::Pdf),
            Attachment::Code {
                language: "python".to_string(),
                source: "import pandas as pd".to_string(),
            },
            file("Q3_Raw_Data.xlsx", FileKind::Excel),
        ],
        follow_ups: vec![
            "Show me the monthly breakdown".to_string(),
            "Compare with Q2 results".to_string(),
        ],
    }
}

/// Runs a full turn to completion with `sample_reply`.
fn completed_turn(state: &mut ChatState, text: &str) -> TurnId {
    let turn_id = submit(state, text);
    advance(state, turn_id);
    complete(state, turn_id, sample_reply());
    turn_id
}

fn messages(state: &ChatState) -> Vec<String> {
    state.logs.iter().map(|entry| entry.message.clone()).collect()
}
