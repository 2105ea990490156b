use std::time::Duration;

use super::actions::CompletedReply;
use super::actions::RuntimeAction;
use super::actions::ShellAction;
use super::actions::UserAction;
use super::catalog::module_index;
use super::catalog::suggestions_for;
use super::catalog::MODULES;
use super::error::SubmitRejection;
use super::progression::stage_plan;
use super::progression::ProgressPoint;
use super::progression::StagePlanId;
use super::scheduler::ScheduledStep;
use super::state::AssistantReply;
use super::state::Attachment;
use super::state::ChatState;
use super::state::LogEntry;
use super::state::LogLevel;
use super::state::LogSource;
use super::state::OpenFile;
use super::state::ShellOverlay;
use super::state::session_title;
use super::state::Turn;
use super::state::TurnId;
use super::state::TurnPhase;
use super::state::OUTPUT_OPTIONS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEffect {
    RequestFrame,
    Schedule {
        turn_id: TurnId,
        step: ScheduledStep,
        delay: Duration,
    },
    CancelTurnTasks {
        turn_id: TurnId,
    },
    CancelAllTasks,
    CopyToClipboard(String),
}

pub fn reduce(state: &mut ChatState, action: ShellAction) -> Vec<ConsoleEffect> {
    match action {
        ShellAction::User(user) => reduce_user(state, user),
        ShellAction::Runtime(runtime) => reduce_runtime(state, runtime),
    }
}

/// Submission gate: empty text and double submission are both rejected.
pub fn check_submission(state: &ChatState, text: &str) -> Result<(), SubmitRejection> {
    if text.trim().is_empty() {
        return Err(SubmitRejection::Empty);
    }
    if let Some(turn_id) = state.conversation.streaming {
        return Err(SubmitRejection::TurnInFlight(turn_id));
    }
    Ok(())
}

fn reduce_user(state: &mut ChatState, action: UserAction) -> Vec<ConsoleEffect> {
    match action {
        UserAction::ToggleHelp => {
            state.interaction.overlay = match state.interaction.overlay {
                ShellOverlay::Help => ShellOverlay::None,
                _ => ShellOverlay::Help,
            };
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::CloseOverlay => {
            if state.interaction.overlay == ShellOverlay::None {
                return Vec::new();
            }
            state.interaction.overlay = ShellOverlay::None;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::NextTab => {
            state.routing.tab = state.routing.tab.next();
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::PrevTab => {
            state.routing.tab = state.routing.tab.prev();
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::SelectTab(tab) => {
            state.routing.tab = tab;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::CycleTheme => {
            state.customization.theme = state.customization.theme.next();
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::InputChar(ch) => {
            state.interaction.input.push(ch);
            state.interaction.history_index = None;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::InputBackspace => {
            state.interaction.input.pop();
            state.interaction.history_index = None;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::InputPaste(text) => {
            state.interaction.input.push_str(&text);
            state.interaction.history_index = None;
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::HistoryUp => {
            let history = &state.interaction.input_history;
            if history.is_empty() {
                return Vec::new();
            }
            let idx = match state.interaction.history_index {
                Some(idx) => idx.saturating_sub(1),
                None => history.len() - 1,
            };
            state.interaction.input = history[idx].clone();
            state.interaction.history_index = Some(idx);
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::HistoryDown => {
            let Some(idx) = state.interaction.history_index else {
                return Vec::new();
            };
            if idx + 1 < state.interaction.input_history.len() {
                state.interaction.input = state.interaction.input_history[idx + 1].clone();
                state.interaction.history_index = Some(idx + 1);
            } else {
                state.interaction.input.clear();
                state.interaction.history_index = None;
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::Submit => {
            let text = state.interaction.input.clone();
            match begin_turn(state, &text) {
                Ok(turn_id) => {
                    clear_composer(state);
                    state.interaction.input_history.push(text);
                    submitted_effects(state, turn_id)
                }
                Err(rejection) => reject_submission(state, rejection),
            }
        }
        UserAction::SubmitSuggestion(index) => {
            let suggestions = suggestions_for(state.selection.module);
            let Some(text) = suggestions.get(index) else {
                return Vec::new();
            };
            match begin_turn(state, text) {
                Ok(turn_id) => {
                    clear_composer(state);
                    submitted_effects(state, turn_id)
                }
                Err(rejection) => reject_submission(state, rejection),
            }
        }
        UserAction::SubmitFollowUp { turn_id, index } => {
            let Some(text) = state
                .conversation
                .turn(turn_id)
                .and_then(|turn| turn.reply.follow_ups.get(index))
                .cloned()
            else {
                return Vec::new();
            };
            match begin_turn(state, &text) {
                Ok(new_turn) => {
                    clear_composer(state);
                    submitted_effects(state, new_turn)
                }
                Err(rejection) => reject_submission(state, rejection),
            }
        }
        UserAction::StopTurn => {
            let Some(turn_id) = state.conversation.streaming.take() else {
                return Vec::new();
            };
            if let Some(turn) = state.conversation.turn_mut(turn_id) {
                turn.reply.phase = TurnPhase::Interrupted;
            }
            append_log(
                state,
                LogEntry::new(LogLevel::Warn, LogSource::User, "turn stopped before completion")
                    .with_turn(turn_id),
            );
            tracing::info!(turn = turn_id.0, "turn interrupted");
            vec![
                ConsoleEffect::CancelTurnTasks { turn_id },
                ConsoleEffect::RequestFrame,
            ]
        }
        UserAction::ToggleStagePanel { turn_id } => {
            if state.conversation.turn(turn_id).is_none() {
                return Vec::new();
            }
            let hidden = &mut state.selection.hidden_stage_panels;
            if !hidden.remove(&turn_id) {
                hidden.insert(turn_id);
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::InspectStage {
            turn_id,
            stage_index,
        } => {
            let exists = state
                .conversation
                .turn(turn_id)
                .is_some_and(|turn| stage_index < turn.reply.stages.len());
            if !exists {
                return Vec::new();
            }
            state.interaction.overlay = ShellOverlay::StageDetail {
                turn_id,
                stage_index,
            };
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::OpenModulePicker => {
            let tentative = state.selection.module;
            state.interaction.overlay = ShellOverlay::ModulePicker {
                selected: tentative.and_then(module_index).unwrap_or(0),
                tentative,
            };
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::OpenOutputOptions => {
            state.interaction.overlay = ShellOverlay::OutputOptions { selected: 0 };
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::OverlayMoveUp => move_overlay_cursor(state, false),
        UserAction::OverlayMoveDown => move_overlay_cursor(state, true),
        UserAction::OverlayToggle => match state.interaction.overlay.clone() {
            ShellOverlay::ModulePicker { selected, .. } => {
                state.interaction.overlay = ShellOverlay::ModulePicker {
                    selected,
                    tentative: MODULES.get(selected).map(|module| module.id),
                };
                vec![ConsoleEffect::RequestFrame]
            }
            ShellOverlay::OutputOptions { selected } => match OUTPUT_OPTIONS.get(selected) {
                Some(option) => reduce_user(state, UserAction::ToggleOutputOption(*option)),
                None => Vec::new(),
            },
            _ => Vec::new(),
        },
        UserAction::OverlaySubmit => match state.interaction.overlay.clone() {
            ShellOverlay::ModulePicker { tentative, .. } => {
                state.selection.module = tentative;
                state.interaction.overlay = ShellOverlay::None;
                let message = match tentative {
                    Some(id) => format!("module selected: {id}"),
                    None => "module selection cleared".to_string(),
                };
                append_log(state, LogEntry::new(LogLevel::Info, LogSource::User, message));
                vec![ConsoleEffect::RequestFrame]
            }
            ShellOverlay::OutputOptions { .. } => {
                state.interaction.overlay = ShellOverlay::None;
                vec![ConsoleEffect::RequestFrame]
            }
            _ => Vec::new(),
        },
        UserAction::ResetModule => {
            state.selection.module = None;
            if matches!(state.interaction.overlay, ShellOverlay::ModulePicker { .. }) {
                state.interaction.overlay = ShellOverlay::None;
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::ToggleOutputOption(option) => {
            let options = &mut state.selection.output_options;
            if !options.remove(&option) {
                options.insert(option);
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::OpenAttachment { turn_id, index } => {
            let Some(Attachment::File {
                name,
                size_label,
                kind,
            }) = attachment(state, turn_id, index).cloned()
            else {
                return Vec::new();
            };
            let active = match state
                .selection
                .open_files
                .iter()
                .position(|file| file.name == name)
            {
                Some(existing) => existing,
                None => {
                    state.selection.opened_file_count += 1;
                    state.selection.open_files.push(OpenFile {
                        id: format!("{}-{}", name, state.selection.opened_file_count),
                        name,
                        kind,
                        size_label,
                    });
                    state.selection.open_files.len() - 1
                }
            };
            state.interaction.overlay = ShellOverlay::FilePreview { active };
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::CopyAttachment { turn_id, index } => {
            let Some(Attachment::Code { source, .. }) = attachment(state, turn_id, index).cloned()
            else {
                return Vec::new();
            };
            append_log(
                state,
                LogEntry::new(LogLevel::Info, LogSource::User, "code copied to clipboard")
                    .with_turn(turn_id),
            );
            vec![
                ConsoleEffect::CopyToClipboard(source),
                ConsoleEffect::RequestFrame,
            ]
        }
        UserAction::NextFileTab => cycle_file_tab(state, true),
        UserAction::PrevFileTab => cycle_file_tab(state, false),
        UserAction::CloseFileTab(index) => {
            if index >= state.selection.open_files.len() {
                return Vec::new();
            }
            state.selection.open_files.remove(index);
            let remaining = state.selection.open_files.len();
            if remaining == 0 {
                if matches!(state.interaction.overlay, ShellOverlay::FilePreview { .. }) {
                    state.interaction.overlay = ShellOverlay::None;
                }
            } else if let ShellOverlay::FilePreview { active } = &mut state.interaction.overlay {
                if *active == index {
                    *active = 0;
                } else if *active > index {
                    *active -= 1;
                }
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::CloseFilePreview => {
            state.selection.open_files.clear();
            if matches!(state.interaction.overlay, ShellOverlay::FilePreview { .. }) {
                state.interaction.overlay = ShellOverlay::None;
            }
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::RateTurn { turn_id, stars } => {
            if !(1..=5).contains(&stars) {
                return Vec::new();
            }
            let Some(turn) = state.conversation.turn_mut(turn_id) else {
                return Vec::new();
            };
            if !turn.reply.is_complete() {
                return Vec::new();
            }
            turn.rating = Some(stars);
            append_log(
                state,
                LogEntry::new(LogLevel::Info, LogSource::User, format!("rated {stars}/5"))
                    .with_turn(turn_id),
            );
            vec![ConsoleEffect::RequestFrame]
        }
        UserAction::NewSession => {
            reset_conversation(state);
            state.session.number += 1;
            state.session.title = session_title(state.session.number);
            state.interaction.input.clear();
            state.interaction.history_index = None;
            state.logs.clear();
            append_log(
                state,
                LogEntry::new(
                    LogLevel::Info,
                    LogSource::App,
                    format!("started {}", state.session.title),
                ),
            );
            tracing::info!(session = state.session.number, "new session");
            vec![ConsoleEffect::CancelAllTasks, ConsoleEffect::RequestFrame]
        }
        UserAction::ClearConversation => {
            reset_conversation(state);
            append_log(
                state,
                LogEntry::new(LogLevel::Info, LogSource::User, "conversation cleared"),
            );
            vec![ConsoleEffect::CancelAllTasks, ConsoleEffect::RequestFrame]
        }
    }
}

fn reduce_runtime(state: &mut ChatState, action: RuntimeAction) -> Vec<ConsoleEffect> {
    match action {
        RuntimeAction::AdvanceStages { turn_id } => {
            if state.conversation.streaming != Some(turn_id) {
                return ignore_stale(state, turn_id, ScheduledStep::Progress);
            }
            let plan = stage_plan(StagePlanId::Analysis);
            let Some(turn) = state.conversation.turn_mut(turn_id) else {
                return ignore_stale(state, turn_id, ScheduledStep::Progress);
            };
            if turn.reply.checkpoint != ProgressPoint::Submitted {
                return ignore_stale(state, turn_id, ScheduledStep::Progress);
            }
            turn.reply.apply_snapshot(&plan.snapshot(ProgressPoint::Partial));
            turn.reply.checkpoint = ProgressPoint::Partial;
            let completed = turn.reply.completed_stages();
            let total = turn.reply.stages.len();
            append_log(
                state,
                LogEntry::new(
                    LogLevel::Info,
                    LogSource::Runtime,
                    format!("stages {completed}/{total} complete"),
                )
                .with_turn(turn_id)
                .with_context("progress"),
            );
            tracing::debug!(turn = turn_id.0, completed, total, "stages advanced");
            vec![
                ConsoleEffect::Schedule {
                    turn_id,
                    step: ScheduledStep::Completion,
                    delay: state.timing.completion_delay,
                },
                ConsoleEffect::RequestFrame,
            ]
        }
        RuntimeAction::CompleteTurn { turn_id, reply } => {
            if state.conversation.streaming != Some(turn_id) {
                return ignore_stale(state, turn_id, ScheduledStep::Completion);
            }
            let Some(turn) = state.conversation.turn_mut(turn_id) else {
                return ignore_stale(state, turn_id, ScheduledStep::Completion);
            };
            finish_reply(&mut turn.reply, reply);
            state.conversation.streaming = None;
            append_log(
                state,
                LogEntry::new(LogLevel::Info, LogSource::Runtime, "reply complete")
                    .with_turn(turn_id)
                    .with_context("completion"),
            );
            tracing::info!(turn = turn_id.0, "turn complete");
            vec![ConsoleEffect::RequestFrame]
        }
        RuntimeAction::AppendLog(entry) => {
            append_log(state, entry);
            Vec::new()
        }
    }
}

fn begin_turn(state: &mut ChatState, text: &str) -> Result<TurnId, SubmitRejection> {
    check_submission(state, text)?;

    let plan = stage_plan(StagePlanId::Analysis);
    let turn_id = state.conversation.allocate_id();
    let turn = Turn {
        id: turn_id,
        user_text: text.to_string(),
        module: state.selection.module.map(str::to_string),
        output_options: state.selection.output_options.iter().copied().collect(),
        reply: AssistantReply {
            text: String::new(),
            attachments: Vec::new(),
            follow_ups: Vec::new(),
            stages: plan.instantiate(),
            phase: TurnPhase::Streaming,
            checkpoint: ProgressPoint::Submitted,
        },
        rating: None,
    };
    state.conversation.turns.push(turn);
    state.conversation.streaming = Some(turn_id);
    state.selection.hidden_stage_panels.remove(&turn_id);
    append_log(
        state,
        LogEntry::new(LogLevel::Info, LogSource::User, format!("submitted: {text}"))
            .with_turn(turn_id),
    );
    tracing::info!(turn = turn_id.0, "turn submitted");
    Ok(turn_id)
}

/// Every accepted send empties the composer, whatever triggered it.
fn clear_composer(state: &mut ChatState) {
    state.interaction.input.clear();
    state.interaction.history_index = None;
}

fn submitted_effects(state: &ChatState, turn_id: TurnId) -> Vec<ConsoleEffect> {
    vec![
        ConsoleEffect::Schedule {
            turn_id,
            step: ScheduledStep::Progress,
            delay: state.timing.progress_delay,
        },
        ConsoleEffect::RequestFrame,
    ]
}

fn reject_submission(state: &mut ChatState, rejection: SubmitRejection) -> Vec<ConsoleEffect> {
    append_log(
        state,
        LogEntry::new(
            LogLevel::Debug,
            LogSource::User,
            format!("submission ignored: {rejection}"),
        ),
    );
    tracing::debug!(%rejection, "submission ignored");
    vec![ConsoleEffect::RequestFrame]
}

fn finish_reply(reply: &mut AssistantReply, content: CompletedReply) {
    let plan = stage_plan(StagePlanId::Analysis);
    reply.apply_snapshot(&plan.snapshot(ProgressPoint::Finished));
    reply.checkpoint = ProgressPoint::Finished;
    reply.text = content.text;
    reply.attachments = content.attachments;
    reply.follow_ups = content.follow_ups;
    reply.phase = TurnPhase::Complete;
}

fn ignore_stale(state: &mut ChatState, turn_id: TurnId, step: ScheduledStep) -> Vec<ConsoleEffect> {
    append_log(
        state,
        LogEntry::new(
            LogLevel::Debug,
            LogSource::Runtime,
            format!("stale {} event ignored", step.label()),
        )
        .with_turn(turn_id),
    );
    tracing::debug!(turn = turn_id.0, step = step.label(), "stale stage event");
    Vec::new()
}

fn reset_conversation(state: &mut ChatState) {
    state.conversation.clear();
    state.selection.hidden_stage_panels.clear();
    state.selection.open_files.clear();
    state.interaction.overlay = ShellOverlay::None;
}

fn move_overlay_cursor(state: &mut ChatState, down: bool) -> Vec<ConsoleEffect> {
    let stage_count = match &state.interaction.overlay {
        ShellOverlay::StageDetail { turn_id, .. } => state
            .conversation
            .turn(*turn_id)
            .map_or(0, |turn| turn.reply.stages.len()),
        _ => 0,
    };
    let (cursor, len) = match &mut state.interaction.overlay {
        ShellOverlay::ModulePicker { selected, .. } => (selected, MODULES.len()),
        ShellOverlay::OutputOptions { selected } => (selected, OUTPUT_OPTIONS.len()),
        ShellOverlay::StageDetail { stage_index, .. } => (stage_index, stage_count),
        _ => return Vec::new(),
    };
    if len == 0 {
        return Vec::new();
    }
    *cursor = if down {
        (*cursor + 1) % len
    } else if *cursor == 0 {
        len - 1
    } else {
        *cursor - 1
    };
    vec![ConsoleEffect::RequestFrame]
}

fn cycle_file_tab(state: &mut ChatState, forward: bool) -> Vec<ConsoleEffect> {
    let len = state.selection.open_files.len();
    let ShellOverlay::FilePreview { active } = &mut state.interaction.overlay else {
        return Vec::new();
    };
    if len == 0 {
        return Vec::new();
    }
    *active = if forward {
        (*active + 1) % len
    } else if *active == 0 {
        len - 1
    } else {
        *active - 1
    };
    vec![ConsoleEffect::RequestFrame]
}

fn attachment(state: &ChatState, turn_id: TurnId, index: usize) -> Option<&Attachment> {
    state
        .conversation
        .turn(turn_id)
        .and_then(|turn| turn.reply.attachments.get(index))
}

fn append_log(state: &mut ChatState, entry: LogEntry) {
    state.logs.append(entry);
}

#[cfg(test)]
mod tests;
