use super::*;
use pretty_assertions::assert_eq;

fn open(state: &mut ChatState, turn_id: TurnId, index: usize) -> Vec<ConsoleEffect> {
    user(state, UserAction::OpenAttachment { turn_id, index })
}

fn open_names(state: &ChatState) -> Vec<String> {
    state
        .selection
        .open_files
        .iter()
        .map(|file| file.name.clone())
        .collect()
}

#[test]
fn opening_file_attachment_adds_tab_and_shows_preview() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");

    let effects = open(&mut state, turn_id, 0);
    assert!(matches!(effects.as_slice(), [ConsoleEffect::RequestFrame]));
    assert_eq!(open_names(&state), vec!["Q3_Sales_Summary.pdf".to_string()]);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 0 }
    );
    assert_eq!(state.selection.open_files[0].kind, FileKind::Pdf);
}

#[test]
fn reopening_same_file_focuses_existing_tab() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");
    open(&mut state, turn_id, 0);
    open(&mut state, turn_id, 2);
    open(&mut state, turn_id, 0);

    assert_eq!(state.selection.open_files.len(), 2);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 0 }
    );
}

#[test]
fn non_file_attachment_does_not_open_preview() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");

    assert!(open(&mut state, turn_id, 1).is_empty());
    assert!(open(&mut state, turn_id, 7).is_empty());
    assert!(state.selection.open_files.is_empty());
}

#[test]
fn copying_code_attachment_emits_clipboard_effect() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");

    let effects = user(&mut state, UserAction::CopyAttachment { turn_id, index: 1 });
    assert_eq!(
        effects,
        vec![
            ConsoleEffect::CopyToClipboard("import pandas as pd".to_string()),
            ConsoleEffect::RequestFrame,
        ]
    );
    assert!(user(&mut state, UserAction::CopyAttachment { turn_id, index: 0 }).is_empty());
}

#[test]
fn closing_active_tab_activates_first_remaining() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");
    open(&mut state, turn_id, 0);
    open(&mut state, turn_id, 2);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 1 }
    );

    user(&mut state, UserAction::CloseFileTab(1));
    assert_eq!(open_names(&state), vec!["Q3_Sales_Summary.pdf".to_string()]);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 0 }
    );

    user(&mut state, UserAction::CloseFileTab(0));
    assert!(state.selection.open_files.is_empty());
    assert_eq!(state.interaction.overlay, ShellOverlay::None);
}

#[test]
fn file_tabs_cycle_and_preview_closes_all() {
    let mut state = state();
    let turn_id = completed_turn(&mut state, "go");
    open(&mut state, turn_id, 0);
    open(&mut state, turn_id, 2);

    user(&mut state, UserAction::NextFileTab);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 0 }
    );
    user(&mut state, UserAction::PrevFileTab);
    assert_eq!(
        state.interaction.overlay,
        ShellOverlay::FilePreview { active: 1 }
    );

    user(&mut state, UserAction::CloseFilePreview);
    assert!(state.selection.open_files.is_empty());
    assert_eq!(state.interaction.overlay, ShellOverlay::None);
}
