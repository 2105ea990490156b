use std::time::Instant;

use chrono::Utc;
use confab_core::actions::CompletedReply;
use confab_core::actions::RuntimeAction;
use confab_core::actions::ShellAction;
use confab_core::reducer::reduce;
use confab_core::reducer::ConsoleEffect;
use confab_core::scheduler::ScheduledStep;
use confab_core::scheduler::ScheduledTask;
use confab_core::scheduler::TurnScheduler;
use confab_core::state::Attachment;
use confab_core::state::ChatState;
use confab_core::state::FileKind;
use confab_core::state::LogEntry;
use confab_core::state::LogLevel;
use confab_core::state::LogSource;
use confab_core::state::TurnId;
use confab_exec::contracts::ReplyAttachment;
use confab_exec::contracts::ReplyFileKind;
use confab_exec::contracts::ReplyPayload;
use confab_exec::contracts::ReplyRequest;
use confab_exec::source::ReplySource;

/// Effects the host still has to act on after scheduling is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEffect {
    Redraw,
    CopyToClipboard(String),
}

/// Owns the chat state, the stage scheduler and the reply source. Every
/// mutation goes through `dispatch` so scheduling effects are applied in one
/// place.
pub struct Console<S> {
    state: ChatState,
    scheduler: TurnScheduler,
    source: S,
}

impl<S: ReplySource> Console<S> {
    pub fn new(state: ChatState, source: S) -> Self {
        Self {
            state,
            scheduler: TurnScheduler::new(),
            source,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    /// Reduces `action`, then stamps whatever the reducer logged with the
    /// wall-clock time. The reducer itself never reads a clock.
    pub fn dispatch(&mut self, action: ShellAction, now: Instant) -> Vec<HostEffect> {
        let effects = reduce(&mut self.state, action);
        self.state.logs.stamp_missing(wall_clock_ms());
        self.apply_effects(effects, now)
    }

    /// Fires every task due at `now`, in deadline order. Tasks chained by a
    /// firing task are only picked up if they are already due.
    pub fn tick(&mut self, now: Instant) -> Vec<HostEffect> {
        let mut host = Vec::new();
        while let Some(task) = self.scheduler.pop_due(now) {
            host.extend(self.fire(task, now));
        }
        host
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Drops every pending task. Called when the host exits.
    pub fn shutdown(&mut self) {
        let dropped = self.scheduler.cancel_all();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped pending stage tasks on exit");
        }
    }

    fn fire(&mut self, task: ScheduledTask, now: Instant) -> Vec<HostEffect> {
        tracing::trace!(turn = task.turn_id.0, step = task.step.label(), "stage task fired");
        match task.step {
            ScheduledStep::Progress => self.dispatch(
                ShellAction::Runtime(RuntimeAction::AdvanceStages {
                    turn_id: task.turn_id,
                }),
                now,
            ),
            ScheduledStep::Completion => {
                let Some(request) = self.reply_request(task.turn_id) else {
                    return Vec::new();
                };
                let outcome = self.source.reply(&request);
                for line in outcome.logs {
                    self.dispatch(
                        ShellAction::Runtime(RuntimeAction::AppendLog(
                            LogEntry::new(LogLevel::Debug, LogSource::Runtime, line)
                                .with_turn(task.turn_id)
                                .with_context(outcome.source),
                        )),
                        now,
                    );
                }
                self.dispatch(
                    ShellAction::Runtime(RuntimeAction::CompleteTurn {
                        turn_id: task.turn_id,
                        reply: completed_reply(outcome.payload),
                    }),
                    now,
                )
            }
        }
    }

    fn reply_request(&self, turn_id: TurnId) -> Option<ReplyRequest> {
        let turn = self.state.conversation.turn(turn_id)?;
        Some(ReplyRequest {
            turn_id: turn_id.0,
            prompt: turn.user_text.clone(),
            module: turn.module.clone(),
            output_options: turn
                .output_options
                .iter()
                .map(|option| option.id().to_string())
                .collect(),
        })
    }

    fn apply_effects(&mut self, effects: Vec<ConsoleEffect>, now: Instant) -> Vec<HostEffect> {
        let mut host = Vec::new();
        for effect in effects {
            match effect {
                ConsoleEffect::RequestFrame => {
                    if !host.contains(&HostEffect::Redraw) {
                        host.push(HostEffect::Redraw);
                    }
                }
                ConsoleEffect::Schedule {
                    turn_id,
                    step,
                    delay,
                } => {
                    self.scheduler.schedule(turn_id, step, now + delay);
                }
                ConsoleEffect::CancelTurnTasks { turn_id } => {
                    self.scheduler.cancel_turn(turn_id);
                }
                ConsoleEffect::CancelAllTasks => {
                    self.scheduler.cancel_all();
                }
                ConsoleEffect::CopyToClipboard(text) => host.push(HostEffect::CopyToClipboard(text)),
            }
        }
        host
    }
}

pub fn completed_reply(payload: ReplyPayload) -> CompletedReply {
    CompletedReply {
        text: payload.content,
        attachments: payload
            .attachments
            .into_iter()
            .map(|attachment| match attachment {
                ReplyAttachment::Chart {
                    title,
                    categories,
                    values,
                } => Attachment::Chart {
                    title,
                    categories,
                    values,
                },
                ReplyAttachment::Code { language, source } => Attachment::Code { language, source },
                ReplyAttachment::File { name, size, kind } => Attachment::File {
                    name,
                    size_label: size,
                    kind: match kind {
                        ReplyFileKind::Pdf => FileKind::Pdf,
                        ReplyFileKind::Excel => FileKind::Excel,
                    },
                },
            })
            .collect(),
        follow_ups: payload.follow_ups,
    }
}

pub fn wall_clock_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}
