use super::*;
use pretty_assertions::assert_eq;

#[test]
fn stage_statuses_never_regress_across_turn_lifecycle() {
    let mut state = state();
    let turn_id = submit(&mut state, "go");
    let mut previous = statuses(&state, turn_id);

    let steps: Vec<Box<dyn Fn(&mut ChatState)>> = vec![
        Box::new(move |state| {
            advance(state, turn_id);
        }),
        Box::new(move |state| {
            advance(state, turn_id);
        }),
        Box::new(move |state| {
            complete(state, turn_id, CompletedReply::default());
        }),
        Box::new(move |state| {
            advance(state, turn_id);
        }),
    ];
    for step in steps {
        step(&mut state);
        let current = statuses(&state, turn_id);
        for (old, new) in previous.iter().zip(&current) {
            assert!(new >= old, "{:?} regressed to {:?}", old, new);
        }
        previous = current;
    }
}

#[test]
fn at_most_one_turn_streams_at_a_time() {
    let mut state = state();
    submit(&mut state, "first");
    for text in ["second", "third"] {
        type_text(&mut state, text);
        user(&mut state, UserAction::Submit);
        state.interaction.input.clear();
    }

    let streaming = state
        .conversation
        .turns
        .iter()
        .filter(|turn| turn.reply.is_streaming())
        .count();
    assert_eq!(streaming, 1);
}

#[test]
fn clear_mid_turn_cancels_tasks_and_drops_late_events() {
    let mut state = state();
    let turn_id = submit(&mut state, "go");

    let effects = user(&mut state, UserAction::ClearConversation);
    assert_eq!(
        effects,
        vec![ConsoleEffect::CancelAllTasks, ConsoleEffect::RequestFrame]
    );
    assert!(state.conversation.is_empty());
    assert!(!state.is_streaming());

    assert!(advance(&mut state, turn_id).is_empty());
    assert!(complete(&mut state, turn_id, sample_reply()).is_empty());
    assert!(state.conversation.is_empty());
}

#[test]
fn turn_ids_keep_increasing_after_clear() {
    let mut state = state();
    let first = completed_turn(&mut state, "a");
    user(&mut state, UserAction::ClearConversation);
    let second = submit(&mut state, "b");

    assert!(second > first);
}

#[test]
fn new_session_resets_conversation_logs_and_input() {
    let mut state = state();
    completed_turn(&mut state, "a");
    submit(&mut state, "b");
    type_text(&mut state, "draft");

    let effects = user(&mut state, UserAction::NewSession);
    assert_eq!(
        effects,
        vec![ConsoleEffect::CancelAllTasks, ConsoleEffect::RequestFrame]
    );
    assert!(state.conversation.is_empty());
    assert!(state.interaction.input.is_empty());
    assert_eq!(state.session.number, 2);
    assert_eq!(&*state.session.title, "Session 2");
    assert_eq!(messages(&state), vec!["started Session 2".to_string()]);
    assert_eq!(state.logs.iter().next().map(|entry| entry.seq), Some(1));
}

#[test]
fn rating_requires_completed_turn_and_valid_stars() {
    let mut state = state();
    let done = completed_turn(&mut state, "a");
    let streaming = submit(&mut state, "b");

    assert!(user(&mut state, UserAction::RateTurn { turn_id: done, stars: 0 }).is_empty());
    assert!(user(&mut state, UserAction::RateTurn { turn_id: done, stars: 6 }).is_empty());
    assert!(user(
        &mut state,
        UserAction::RateTurn {
            turn_id: streaming,
            stars: 4
        }
    )
    .is_empty());

    user(&mut state, UserAction::RateTurn { turn_id: done, stars: 4 });
    assert_eq!(
        state.conversation.turn(done).and_then(|turn| turn.rating),
        Some(4)
    );
    assert_eq!(
        state.conversation.turn(streaming).and_then(|turn| turn.rating),
        None
    );
}

#[test]
fn tab_navigation_wraps() {
    let mut state = state();
    user(&mut state, UserAction::NextTab);
    assert_eq!(state.routing.tab, ShellTab::Activity);
    user(&mut state, UserAction::NextTab);
    assert_eq!(state.routing.tab, ShellTab::Chat);
    user(&mut state, UserAction::PrevTab);
    assert_eq!(state.routing.tab, ShellTab::Activity);
    user(&mut state, UserAction::SelectTab(ShellTab::Chat));
    assert_eq!(state.routing.tab, ShellTab::Chat);
}

#[test]
fn theme_cycles_through_all_variants() {
    let mut state = state();
    let mut seen = Vec::new();
    for _ in 0..3 {
        user(&mut state, UserAction::CycleTheme);
        seen.push(state.customization.theme);
    }
    assert_eq!(seen, vec![UiTheme::Dusk, UiTheme::Paper, UiTheme::Classic]);
}
