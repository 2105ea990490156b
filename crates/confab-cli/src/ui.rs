use std::io;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::Terminal;

use confab_core::actions::{ShellAction, UserAction};
use confab_core::catalog::{composer_placeholder, find_module, stage_detail, suggestions_for, MODULES};
use confab_core::state::{
    Attachment, ChatState, LogLevel, ShellOverlay, ShellTab, Stage, StageStatus, Turn,
    TurnPhase, UiTheme, OUTPUT_OPTIONS,
};
use confab_exec::source::ReplySource;

use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::runtime::{Console, HostEffect};

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();

fn get_syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn get_theme_set() -> &'static ThemeSet {
    THEME_SET.get_or_init(ThemeSet::load_defaults)
}

const IDLE_POLL: Duration = Duration::from_millis(250);
const STREAMING_POLL: Duration = Duration::from_millis(80);
const CHART_WIDTH: u64 = 28;

struct TuiGuard;

impl Drop for TuiGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            io::stdout(),
            DisableBracketedPaste,
            LeaveAlternateScreen,
            crossterm::cursor::Show
        );
    }
}

pub fn run<S: ReplySource>(mut console: Console<S>) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        crossterm::cursor::Hide
    )?;
    let _guard = TuiGuard;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut console);
    console.shutdown();
    result.map_err(|e| e.into())
}

enum KeyHandlerResult {
    Continue(Vec<UserAction>),
    Exit,
}

/// How long to wait for input: never past the next stage deadline, and
/// short enough while streaming to keep the spinner moving.
fn poll_timeout(next_deadline: Option<Instant>, streaming: bool, now: Instant) -> Duration {
    let cap = if streaming { STREAMING_POLL } else { IDLE_POLL };
    match next_deadline {
        Some(deadline) => deadline.saturating_duration_since(now).min(cap),
        None => cap,
    }
}

fn run_app<B: Backend, S: ReplySource>(
    terminal: &mut Terminal<B>,
    console: &mut Console<S>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, console.state()))?;

        let timeout = poll_timeout(
            console.next_deadline(),
            console.state().is_streaming(),
            Instant::now(),
        );
        let mut effects = Vec::new();
        if event::poll(timeout)? {
            let actions = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match handle_key_event(key, console.state()) {
                        KeyHandlerResult::Continue(actions) => actions,
                        KeyHandlerResult::Exit => return Ok(()),
                    }
                }
                Event::Paste(text) if console.state().interaction.overlay == ShellOverlay::None => {
                    vec![UserAction::InputPaste(text.replace(['\r', '\n'], " "))]
                }
                _ => Vec::new(),
            };
            for action in actions {
                effects.extend(console.dispatch(ShellAction::User(action), Instant::now()));
            }
        }
        effects.extend(console.tick(Instant::now()));

        for effect in effects {
            match effect {
                HostEffect::Redraw => {}
                HostEffect::CopyToClipboard(text) => match arboard::Clipboard::new() {
                    Ok(mut clipboard) => {
                        if let Err(err) = clipboard.set_text(text) {
                            tracing::warn!(%err, "clipboard write failed");
                        }
                    }
                    Err(err) => tracing::warn!(%err, "clipboard unavailable"),
                },
            }
        }
    }
}

fn handle_help_keys(key: KeyEvent) -> KeyHandlerResult {
    let actions = match key.code {
        KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q') => vec![UserAction::CloseOverlay],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_module_picker_keys(key: KeyEvent) -> KeyHandlerResult {
    let actions = match key.code {
        KeyCode::Esc => vec![UserAction::CloseOverlay],
        KeyCode::Up => vec![UserAction::OverlayMoveUp],
        KeyCode::Down => vec![UserAction::OverlayMoveDown],
        KeyCode::Char(' ') => vec![UserAction::OverlayToggle],
        KeyCode::Enter => vec![UserAction::OverlaySubmit],
        KeyCode::Char('r') => vec![UserAction::ResetModule],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_output_options_keys(key: KeyEvent) -> KeyHandlerResult {
    let actions = match key.code {
        KeyCode::Esc => vec![UserAction::CloseOverlay],
        KeyCode::Up => vec![UserAction::OverlayMoveUp],
        KeyCode::Down => vec![UserAction::OverlayMoveDown],
        KeyCode::Char(' ') => vec![UserAction::OverlayToggle],
        KeyCode::Enter => vec![UserAction::OverlaySubmit],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_stage_detail_keys(key: KeyEvent) -> KeyHandlerResult {
    let actions = match key.code {
        KeyCode::Esc | KeyCode::Enter => vec![UserAction::CloseOverlay],
        KeyCode::Up => vec![UserAction::OverlayMoveUp],
        KeyCode::Down => vec![UserAction::OverlayMoveDown],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_file_preview_keys(key: KeyEvent, active: usize) -> KeyHandlerResult {
    let actions = match key.code {
        KeyCode::Esc => vec![UserAction::CloseOverlay],
        KeyCode::Left => vec![UserAction::PrevFileTab],
        KeyCode::Right | KeyCode::Tab => vec![UserAction::NextFileTab],
        KeyCode::Char('x') | KeyCode::Delete => vec![UserAction::CloseFileTab(active)],
        KeyCode::Char('X') => vec![UserAction::CloseFilePreview],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_global_keys(key: KeyEvent, state: &ChatState) -> KeyHandlerResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let last = state.conversation.last_turn();

    let actions = match key.code {
        KeyCode::Char('q') if ctrl => return KeyHandlerResult::Exit,
        KeyCode::Char('n') if ctrl => vec![UserAction::NewSession],
        KeyCode::Char('l') if ctrl => vec![UserAction::ClearConversation],
        KeyCode::Char('p') if ctrl => last
            .map(|turn| UserAction::ToggleStagePanel { turn_id: turn.id })
            .into_iter()
            .collect(),
        KeyCode::Char('d') if ctrl => last.map(inspect_action).into_iter().collect(),
        KeyCode::Char('f') if ctrl => last
            .and_then(|turn| next_file_action(state, turn))
            .into_iter()
            .collect(),
        KeyCode::Char('y') if ctrl => last.and_then(copy_action).into_iter().collect(),
        KeyCode::Char('r') if ctrl => last.and_then(rate_action).into_iter().collect(),
        KeyCode::Char(c @ '1'..='4') if alt => {
            vec![UserAction::SubmitSuggestion(c as usize - '1' as usize)]
        }
        KeyCode::Char(c) if !ctrl && !alt => vec![UserAction::InputChar(c)],
        KeyCode::F(1) => vec![UserAction::ToggleHelp],
        KeyCode::F(2) => vec![UserAction::OpenModulePicker],
        KeyCode::F(3) => vec![UserAction::OpenOutputOptions],
        KeyCode::F(4) => vec![UserAction::CycleTheme],
        KeyCode::F(n @ 5..=7) => last
            .filter(|turn| turn.reply.is_complete())
            .map(|turn| UserAction::SubmitFollowUp {
                turn_id: turn.id,
                index: usize::from(n - 5),
            })
            .into_iter()
            .collect(),
        KeyCode::Esc if state.is_streaming() => vec![UserAction::StopTurn],
        KeyCode::Enter => vec![UserAction::Submit],
        KeyCode::Backspace => vec![UserAction::InputBackspace],
        KeyCode::Up => vec![UserAction::HistoryUp],
        KeyCode::Down => vec![UserAction::HistoryDown],
        KeyCode::Tab => vec![UserAction::NextTab],
        KeyCode::BackTab => vec![UserAction::PrevTab],
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(actions)
}

fn handle_key_event(key: KeyEvent, state: &ChatState) -> KeyHandlerResult {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return KeyHandlerResult::Exit;
    }

    match &state.interaction.overlay {
        ShellOverlay::None => handle_global_keys(key, state),
        ShellOverlay::Help => handle_help_keys(key),
        ShellOverlay::ModulePicker { .. } => handle_module_picker_keys(key),
        ShellOverlay::OutputOptions { .. } => handle_output_options_keys(key),
        ShellOverlay::StageDetail { .. } => handle_stage_detail_keys(key),
        ShellOverlay::FilePreview { active } => handle_file_preview_keys(key, *active),
    }
}

/// Inspects the stage currently processing, or the first one.
fn inspect_action(turn: &Turn) -> UserAction {
    let stage_index = turn
        .reply
        .stages
        .iter()
        .position(|stage| stage.status == StageStatus::Processing)
        .unwrap_or(0);
    UserAction::InspectStage {
        turn_id: turn.id,
        stage_index,
    }
}

/// Opens the first file attachment without a tab yet, else the first file.
fn next_file_action(state: &ChatState, turn: &Turn) -> Option<UserAction> {
    let files: Vec<(usize, &str)> = turn
        .reply
        .attachments
        .iter()
        .enumerate()
        .filter_map(|(index, attachment)| match attachment {
            Attachment::File { name, .. } => Some((index, name.as_str())),
            _ => None,
        })
        .collect();
    let unopened = files.iter().find(|(_, name)| {
        !state
            .selection
            .open_files
            .iter()
            .any(|file| file.name == *name)
    });
    unopened.or(files.first()).map(|(index, _)| UserAction::OpenAttachment {
        turn_id: turn.id,
        index: *index,
    })
}

fn copy_action(turn: &Turn) -> Option<UserAction> {
    turn.reply
        .attachments
        .iter()
        .position(|attachment| matches!(attachment, Attachment::Code { .. }))
        .map(|index| UserAction::CopyAttachment {
            turn_id: turn.id,
            index,
        })
}

/// Cycles the rating 1..=5 on repeated presses.
fn rate_action(turn: &Turn) -> Option<UserAction> {
    if !turn.reply.is_complete() {
        return None;
    }
    let stars = turn.rating.map_or(1, |stars| stars % 5 + 1);
    Some(UserAction::RateTurn {
        turn_id: turn.id,
        stars,
    })
}

#[derive(Clone, Copy)]
struct UiPalette {
    accent: Color,
    accent_alt: Color,
    success: Color,
    warning: Color,
    danger: Color,
    muted: Color,
    text: Color,
    border: Color,
    panel_bg: Color,
    selected_bg: Color,
}

fn palette_for(theme: UiTheme) -> UiPalette {
    match theme {
        UiTheme::Classic => UiPalette {
            accent: Color::Cyan,
            accent_alt: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
            muted: Color::DarkGray,
            text: Color::White,
            border: Color::Gray,
            panel_bg: Color::Black,
            selected_bg: Color::DarkGray,
        },
        UiTheme::Dusk => UiPalette {
            accent: Color::LightMagenta,
            accent_alt: Color::LightBlue,
            success: Color::LightGreen,
            warning: Color::LightYellow,
            danger: Color::LightRed,
            muted: Color::Gray,
            text: Color::White,
            border: Color::Magenta,
            panel_bg: Color::Rgb(20, 16, 32),
            selected_bg: Color::Rgb(58, 40, 82),
        },
        UiTheme::Paper => UiPalette {
            accent: Color::Blue,
            accent_alt: Color::Magenta,
            success: Color::Green,
            warning: Color::Rgb(170, 110, 0),
            danger: Color::Red,
            muted: Color::Rgb(110, 110, 110),
            text: Color::Black,
            border: Color::Rgb(150, 150, 150),
            panel_bg: Color::Rgb(250, 248, 240),
            selected_bg: Color::Rgb(225, 222, 210),
        },
    }
}

fn syntect_theme_name(theme: UiTheme) -> &'static str {
    match theme {
        UiTheme::Classic => "base16-ocean.dark",
        UiTheme::Dusk => "base16-mocha.dark",
        UiTheme::Paper => "InspiredGitHub",
    }
}

fn get_spinner() -> &'static str {
    const FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
    let millis = Utc::now().timestamp_subsec_millis() as usize;
    FRAMES[(millis / 125) % FRAMES.len()]
}

fn stage_icon(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Complete => "✓",
        StageStatus::Processing => get_spinner(),
        StageStatus::Pending => "○",
    }
}

fn status_color(status: StageStatus, palette: UiPalette) -> Color {
    match status {
        StageStatus::Complete => palette.success,
        StageStatus::Processing => palette.accent,
        StageStatus::Pending => palette.muted,
    }
}

fn highlight_code(source: &str, language: &str, theme: UiTheme, palette: UiPalette) -> Vec<Line<'static>> {
    let syntax_set = get_syntax_set();
    let syntax = syntax_set
        .find_syntax_by_token(language)
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());
    let plain = |line: &str| {
        Line::from(vec![
            Span::raw("    "),
            Span::styled(
                line.trim_end_matches('\n').to_string(),
                Style::default().fg(palette.accent_alt),
            ),
        ])
    };
    let Some(theme) = get_theme_set().themes.get(syntect_theme_name(theme)) else {
        return source.lines().map(plain).collect();
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    LinesWithEndings::from(source)
        .map(|line| match highlighter.highlight_line(line, syntax_set) {
            Ok(ranges) => {
                let mut spans = vec![Span::raw("    ")];
                spans.extend(ranges.into_iter().map(|(style, text)| {
                    Span::styled(
                        text.trim_end_matches('\n').to_string(),
                        Style::default().fg(Color::Rgb(
                            style.foreground.r,
                            style.foreground.g,
                            style.foreground.b,
                        )),
                    )
                }));
                Line::from(spans)
            }
            Err(_) => plain(line),
        })
        .collect()
}

fn chart_lines(
    title: &str,
    categories: &[String],
    values: &[u64],
    palette: UiPalette,
) -> Vec<Line<'static>> {
    let max = values.iter().copied().max().unwrap_or(0).max(1);
    let mut lines = vec![Line::from(Span::styled(
        format!("  ▤ {title}"),
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
    ))];
    for (category, value) in categories.iter().zip(values) {
        let width = (value * CHART_WIDTH / max) as usize;
        lines.push(Line::from(vec![
            Span::styled(format!("    {category:<8} "), Style::default().fg(palette.muted)),
            Span::styled("█".repeat(width), Style::default().fg(palette.accent_alt)),
            Span::styled(format!(" {value}"), Style::default().fg(palette.text)),
        ]));
    }
    lines
}

fn attachment_lines(
    turn: &Turn,
    theme: UiTheme,
    palette: UiPalette,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for attachment in &turn.reply.attachments {
        match attachment {
            Attachment::Chart {
                title,
                categories,
                values,
            } => lines.extend(chart_lines(title, categories, values, palette)),
            Attachment::Code { language, source } => {
                lines.push(Line::from(Span::styled(
                    format!("  ⌘ {language} code (Ctrl+Y to copy)"),
                    Style::default().fg(palette.muted),
                )));
                lines.extend(highlight_code(source, language, theme, palette));
            }
            Attachment::File {
                name,
                size_label,
                kind,
            } => lines.push(Line::from(vec![
                Span::styled("  ▣ ", Style::default().fg(palette.warning)),
                Span::styled(name.clone(), Style::default().fg(palette.text)),
                Span::styled(
                    format!("  {} · {size_label}", kind.label()),
                    Style::default().fg(palette.muted),
                ),
            ])),
        }
    }
    lines
}

fn stage_panel_lines(state: &ChatState, turn: &Turn, palette: UiPalette) -> Vec<Line<'static>> {
    let total = turn.reply.stages.len();
    let done = turn.reply.completed_stages();
    let mut lines = vec![Line::from(vec![
        Span::styled("  Processing ", Style::default().fg(palette.muted)),
        Span::styled(
            format!("{done}/{total}"),
            Style::default().fg(if done == total {
                palette.success
            } else {
                palette.accent
            }),
        ),
        Span::styled(
            if state.stage_panel_hidden(turn.id) {
                "  (Ctrl+P show)"
            } else {
                "  (Ctrl+P hide)"
            },
            Style::default().fg(palette.muted),
        ),
    ])];
    if state.stage_panel_hidden(turn.id) {
        return lines;
    }
    for stage in &turn.reply.stages {
        let color = status_color(stage.status, palette);
        lines.push(Line::from(vec![
            Span::styled(format!("    {} ", stage_icon(stage.status)), Style::default().fg(color)),
            Span::styled(
                stage.label.clone(),
                Style::default().fg(if stage.status == StageStatus::Pending {
                    palette.muted
                } else {
                    palette.text
                }),
            ),
        ]));
    }
    lines
}

fn build_chat_lines(state: &ChatState, palette: UiPalette) -> Vec<Line<'static>> {
    let theme = state.customization.theme;
    let mut lines = Vec::new();

    if state.conversation.is_empty() {
        lines.push(Line::from(Span::styled(
            "How can I help you today?",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
        for (index, suggestion) in suggestions_for(state.selection.module).iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  Alt+{} ", index + 1),
                    Style::default().fg(palette.accent_alt),
                ),
                Span::styled(suggestion.to_string(), Style::default().fg(palette.text)),
            ]));
        }
        return lines;
    }

    for turn in &state.conversation.turns {
        lines.push(Line::from(vec![
            Span::styled(
                "You ",
                Style::default()
                    .fg(palette.accent_alt)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(turn.user_text.clone(), Style::default().fg(palette.text)),
        ]));
        if let Some(module) = turn.module.as_deref().and_then(find_module) {
            lines.push(Line::from(Span::styled(
                format!("    via {}", module.name),
                Style::default().fg(palette.muted),
            )));
        }

        lines.push(Line::from(Span::styled(
            "Agent",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )));
        lines.extend(stage_panel_lines(state, turn, palette));

        match turn.reply.phase {
            TurnPhase::Streaming => {}
            TurnPhase::Interrupted => lines.push(Line::from(Span::styled(
                "  Stopped before the reply was ready.",
                Style::default().fg(palette.warning),
            ))),
            TurnPhase::Complete => {
                for text_line in turn.reply.text.lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {text_line}"),
                        Style::default().fg(palette.text),
                    )));
                }
                lines.extend(attachment_lines(turn, theme, palette));
                for (index, follow_up) in turn.reply.follow_ups.iter().enumerate().take(3) {
                    lines.push(Line::from(vec![
                        Span::styled(
                            format!("  F{} ", index + 5),
                            Style::default().fg(palette.accent_alt),
                        ),
                        Span::styled(follow_up.clone(), Style::default().fg(palette.muted)),
                    ]));
                }
                let stars = turn.rating.unwrap_or(0) as usize;
                lines.push(Line::from(Span::styled(
                    format!("  {}{}", "★".repeat(stars), "☆".repeat(5 - stars)),
                    Style::default().fg(palette.warning),
                )));
            }
        }
        lines.push(Line::from(""));
    }
    lines
}

fn build_activity_lines(state: &ChatState, palette: UiPalette) -> Vec<Line<'static>> {
    state
        .logs
        .iter()
        .map(|entry| {
            let ts = entry
                .ts_ms
                .and_then(|ms| i64::try_from(ms).ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|time| time.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--:--:--".to_string());
            let level_color = match entry.level {
                LogLevel::Error => palette.danger,
                LogLevel::Warn => palette.warning,
                LogLevel::Info => palette.success,
                LogLevel::Debug | LogLevel::Trace => palette.muted,
            };
            let mut spans = vec![
                Span::styled(format!("{:>4} ", entry.seq), Style::default().fg(palette.muted)),
                Span::styled(format!("{ts} "), Style::default().fg(palette.muted)),
                Span::styled(
                    format!("{:<5} ", entry.level.label()),
                    Style::default().fg(level_color),
                ),
                Span::styled(
                    format!("{:<7} ", entry.source.label()),
                    Style::default().fg(palette.accent_alt),
                ),
            ];
            if let Some(turn_id) = entry.turn_id {
                spans.push(Span::styled(
                    format!("[turn {turn_id}] "),
                    Style::default().fg(palette.accent),
                ));
            }
            if let Some(context) = &entry.context {
                spans.push(Span::styled(
                    format!("{context}: "),
                    Style::default().fg(palette.muted),
                ));
            }
            spans.push(Span::styled(
                entry.message.clone(),
                Style::default().fg(palette.text),
            ));
            Line::from(spans)
        })
        .collect()
}

/// Rows the lines take once wrapped to `width`.
fn wrapped_height(lines: &[Line<'_>], width: u16) -> usize {
    let width = usize::from(width.max(1));
    lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum()
}

fn ui(f: &mut ratatui::Frame, state: &ChatState) {
    let palette = palette_for(state.customization.theme);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Composer
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    f.render_widget(
        Block::default().style(Style::default().bg(palette.panel_bg)),
        f.area(),
    );

    let module = state
        .selection
        .module
        .and_then(find_module)
        .map_or("General", |module| module.name);
    let activity = if state.is_streaming() {
        format!("{} working", get_spinner())
    } else {
        "idle".to_string()
    };
    let header_text = format!(
        "Office Agent | {} | Module:{} | Theme:{} | {}",
        state.session.title,
        module,
        state.customization.theme.label(),
        activity
    );
    let header = Paragraph::new(header_text)
        .style(Style::default().fg(palette.accent))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border)),
        );
    f.render_widget(header, chunks[0]);

    let tabs = [ShellTab::Chat, ShellTab::Activity];
    let selected = tabs
        .iter()
        .position(|tab| *tab == state.routing.tab)
        .unwrap_or(0);
    let titles: Vec<Line<'static>> = tabs.iter().map(|tab| Line::from(tab.label())).collect();
    let tabs_widget = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(palette.muted))
        .highlight_style(
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border)),
        );
    f.render_widget(tabs_widget, chunks[1]);

    let (title, lines) = match state.routing.tab {
        ShellTab::Chat => ("Chat", build_chat_lines(state, palette)),
        ShellTab::Activity => ("Activity", build_activity_lines(state, palette)),
    };
    let content_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title(title);
    let inner = content_block.inner(chunks[2]);
    let overflow = wrapped_height(&lines, inner.width).saturating_sub(usize::from(inner.height));
    let scroll = u16::try_from(overflow).unwrap_or(u16::MAX);
    let content = Paragraph::new(lines)
        .block(content_block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(content, chunks[2]);

    render_composer(f, chunks[3], state, palette);
    render_footer(f, chunks[4], state, palette);
    render_overlay(f, state, palette);
}

fn render_composer(f: &mut ratatui::Frame, area: Rect, state: &ChatState, palette: UiPalette) {
    let input = &state.interaction.input;
    let line = if input.is_empty() {
        Line::from(Span::styled(
            composer_placeholder(state.selection.module),
            Style::default().fg(palette.muted),
        ))
    } else {
        Line::from(vec![
            Span::styled(input.clone(), Style::default().fg(palette.text)),
            Span::styled("▏", Style::default().fg(palette.accent)),
        ])
    };
    let options: Vec<&str> = state
        .selection
        .output_options
        .iter()
        .map(|option| option.label())
        .collect();
    let title = if options.is_empty() {
        "Message".to_string()
    } else {
        format!("Message [{}]", options.join(", "))
    };
    let composer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if state.is_streaming() {
                palette.muted
            } else {
                palette.accent
            }))
            .title(title),
    );
    f.render_widget(composer, area);
}

fn render_footer(f: &mut ratatui::Frame, area: Rect, state: &ChatState, palette: UiPalette) {
    let key = |text: &'static str| Span::styled(text, Style::default().fg(palette.accent));
    let label = |text: &'static str| Span::styled(text, Style::default().fg(palette.muted));
    let mut spans = vec![
        key("Enter"),
        label(" send "),
        key("F1"),
        label(" help "),
        key("F2"),
        label(" module "),
        key("F3"),
        label(" options "),
        key("Tab"),
        label(" view "),
    ];
    if state.is_streaming() {
        spans.push(Span::styled("Esc", Style::default().fg(palette.warning)));
        spans.push(label(" stop "));
    }
    spans.push(Span::styled("Ctrl+Q", Style::default().fg(palette.warning)));
    spans.push(label(" quit"));
    f.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        area,
    );
}

fn overlay_block(title: &str, palette: UiPalette) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .style(Style::default().bg(palette.panel_bg))
        .title(title.to_string())
}

fn render_overlay(f: &mut ratatui::Frame, state: &ChatState, palette: UiPalette) {
    match &state.interaction.overlay {
        ShellOverlay::None => {}
        ShellOverlay::Help => render_help(f, palette),
        ShellOverlay::ModulePicker {
            selected,
            tentative,
        } => render_module_picker(f, *selected, *tentative, palette),
        ShellOverlay::OutputOptions { selected } => render_output_options(f, state, *selected, palette),
        ShellOverlay::StageDetail {
            turn_id,
            stage_index,
        } => {
            let stage = state
                .conversation
                .turn(*turn_id)
                .and_then(|turn| turn.reply.stages.get(*stage_index));
            if let Some(stage) = stage {
                render_stage_detail(f, stage, palette);
            }
        }
        ShellOverlay::FilePreview { active } => render_file_preview(f, state, *active, palette),
    }
}

fn render_help(f: &mut ratatui::Frame, palette: UiPalette) {
    let rows = [
        ("Enter", "send message"),
        ("Esc", "stop the reply in progress"),
        ("Up/Down", "message history"),
        ("Alt+1..4", "send a suggestion"),
        ("F5..F7", "send a follow-up"),
        ("F2 / F3", "module picker / output options"),
        ("F4", "cycle theme"),
        ("Ctrl+P", "show or hide stage panel"),
        ("Ctrl+D", "inspect current stage"),
        ("Ctrl+F", "preview a file attachment"),
        ("Ctrl+Y", "copy code attachment"),
        ("Ctrl+R", "rate last reply"),
        ("Ctrl+L", "clear conversation"),
        ("Ctrl+N", "new session"),
        ("Tab", "switch Chat / Activity"),
        ("Ctrl+Q", "quit"),
    ];
    let lines: Vec<Line<'static>> = rows
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!("{keys:<10}"), Style::default().fg(palette.accent)),
                Span::styled(what.to_string(), Style::default().fg(palette.text)),
            ])
        })
        .collect();
    let area = centered_rect(50, 70, f.area());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(overlay_block("Keys", palette)),
        area,
    );
}

fn render_module_picker(
    f: &mut ratatui::Frame,
    selected: usize,
    tentative: Option<&'static str>,
    palette: UiPalette,
) {
    let items: Vec<ListItem> = MODULES
        .iter()
        .map(|module| {
            let mark = if tentative == Some(module.id) { "●" } else { "○" };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{mark} "), Style::default().fg(palette.accent)),
                Span::styled(module.name, Style::default().fg(palette.text)),
                Span::styled(format!("  {}", module.kind), Style::default().fg(palette.muted)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(overlay_block(
            "Select module (Space choose, Enter apply, r reset)",
            palette,
        ))
        .highlight_style(Style::default().bg(palette.selected_bg));
    let mut list_state = ListState::default();
    list_state.select(Some(selected));
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_output_options(
    f: &mut ratatui::Frame,
    state: &ChatState,
    selected: usize,
    palette: UiPalette,
) {
    let items: Vec<ListItem> = OUTPUT_OPTIONS
        .iter()
        .map(|option| {
            let checked = state.selection.output_options.contains(option);
            ListItem::new(Line::from(vec![
                Span::styled(
                    if checked { "[x] " } else { "[ ] " },
                    Style::default().fg(palette.accent),
                ),
                Span::styled(option.label(), Style::default().fg(palette.text)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(overlay_block("Output options (Space toggle, Enter done)", palette))
        .highlight_style(Style::default().bg(palette.selected_bg));
    let mut list_state = ListState::default();
    list_state.select(Some(selected));
    let area = centered_rect(45, 30, f.area());
    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_stage_detail(
    f: &mut ratatui::Frame,
    stage: &Stage,
    palette: UiPalette,
) {
    let detail = stage_detail(stage, Utc::now());
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{} ", stage_icon(detail.status)),
                Style::default().fg(status_color(detail.status, palette)),
            ),
            Span::styled(
                detail.label.clone(),
                Style::default()
                    .fg(palette.text)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(
            format!("Status: {}", detail.status.label()),
            Style::default().fg(status_color(detail.status, palette)),
        )),
        Line::from(""),
        Line::from(Span::styled(detail.details.clone(), Style::default().fg(palette.text))),
        Line::from(""),
    ];
    lines.extend(detail.logs.iter().map(|log| {
        Line::from(Span::styled(log.clone(), Style::default().fg(palette.muted)))
    }));
    let area = centered_rect(70, 50, f.area());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(overlay_block(
                &format!("Stage {} (Up/Down browse)", detail.stage_id),
                palette,
            )),
        area,
    );
}

fn render_file_preview(f: &mut ratatui::Frame, state: &ChatState, active: usize, palette: UiPalette) {
    let area = centered_rect(70, 60, f.area());
    f.render_widget(Clear, area);
    let block = overlay_block("File preview (←/→ switch, x close tab, X close all)", palette);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    let titles: Vec<Line<'static>> = state
        .selection
        .open_files
        .iter()
        .map(|file| Line::from(file.name.clone()))
        .collect();
    f.render_widget(
        Tabs::new(titles)
            .select(active)
            .style(Style::default().fg(palette.muted))
            .highlight_style(Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)),
        chunks[0],
    );

    let body = match state.selection.open_files.get(active) {
        Some(file) => vec![
            Line::from(Span::styled(
                file.name.clone(),
                Style::default()
                    .fg(palette.text)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("{} · {}", file.kind.label(), file.size_label),
                Style::default().fg(palette.muted),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Preview Coming Soon",
                Style::default().fg(palette.accent),
            )),
            Line::from(Span::styled(
                "Full document preview will be available in the next update.",
                Style::default().fg(palette.muted),
            )),
        ],
        None => vec![Line::from(Span::styled(
            "No file selected",
            Style::default().fg(palette.muted),
        ))],
    };
    f.render_widget(
        Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        chunks[1],
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use confab_core::actions::CompletedReply;
    use confab_core::actions::RuntimeAction;
    use confab_core::reducer::reduce;
    use confab_core::state::FileKind;
    use pretty_assertions::assert_eq;
    use ratatui::backend::TestBackend;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn actions(result: KeyHandlerResult) -> Vec<String> {
        match result {
            KeyHandlerResult::Continue(actions) => {
                actions.iter().map(|action| format!("{action:?}")).collect()
            }
            KeyHandlerResult::Exit => vec!["exit".to_string()],
        }
    }

    fn completed_state() -> ChatState {
        let mut state = ChatState::default();
        for ch in "report".chars() {
            reduce(&mut state, ShellAction::User(UserAction::InputChar(ch)));
        }
        reduce(&mut state, ShellAction::User(UserAction::Submit));
        let turn_id = state.conversation.streaming.expect("streaming");
        reduce(
            &mut state,
            ShellAction::Runtime(RuntimeAction::CompleteTurn {
                turn_id,
                reply: CompletedReply {
                    text: "done".to_string(),
                    attachments: vec![
                        Attachment::File {
                            name: "a.pdf".to_string(),
                            size_label: "1 KB".to_string(),
                            kind: FileKind::Pdf,
                        },
                        Attachment::Code {
                            language: "python".to_string(),
                            source: "print(1)\n".to_string(),
                        },
                        Attachment::File {
                            name: "b.xlsx".to_string(),
                            size_label: "2 KB".to_string(),
                            kind: FileKind::Excel,
                        },
                    ],
                    follow_ups: vec!["more".to_string()],
                },
            }),
        );
        state
    }

    #[test]
    fn poll_timeout_never_sleeps_past_deadline() {
        let now = Instant::now();
        assert_eq!(poll_timeout(None, false, now), IDLE_POLL);
        assert_eq!(poll_timeout(None, true, now), STREAMING_POLL);
        assert_eq!(
            poll_timeout(Some(now + Duration::from_millis(30)), true, now),
            Duration::from_millis(30)
        );
        assert_eq!(poll_timeout(Some(now), false, now), Duration::ZERO);
    }

    #[test]
    fn escape_stops_only_while_streaming() {
        let mut state = ChatState::default();
        let esc = key(KeyCode::Esc, KeyModifiers::NONE);
        assert!(actions(handle_key_event(esc, &state)).is_empty());

        reduce(&mut state, ShellAction::User(UserAction::InputChar('x')));
        reduce(&mut state, ShellAction::User(UserAction::Submit));
        assert_eq!(actions(handle_key_event(esc, &state)), vec!["StopTurn"]);
    }

    #[test]
    fn overlay_routes_keys_to_its_handler() {
        let mut state = ChatState::default();
        state.interaction.overlay = ShellOverlay::FilePreview { active: 1 };
        assert_eq!(
            actions(handle_key_event(
                key(KeyCode::Char('x'), KeyModifiers::NONE),
                &state
            )),
            vec!["CloseFileTab(1)"]
        );

        state.interaction.overlay = ShellOverlay::None;
        assert_eq!(
            actions(handle_key_event(
                key(KeyCode::Char('x'), KeyModifiers::NONE),
                &state
            )),
            vec!["InputChar('x')"]
        );
        assert_eq!(
            actions(handle_key_event(
                key(KeyCode::Char('c'), KeyModifiers::CONTROL),
                &state
            )),
            vec!["exit"]
        );
    }

    #[test]
    fn file_shortcut_opens_unopened_files_first() {
        let mut state = completed_state();
        let turn = state.conversation.last_turn().expect("turn").clone();
        assert!(matches!(
            next_file_action(&state, &turn),
            Some(UserAction::OpenAttachment { index: 0, .. })
        ));

        reduce(
            &mut state,
            ShellAction::User(UserAction::OpenAttachment {
                turn_id: turn.id,
                index: 0,
            }),
        );
        assert!(matches!(
            next_file_action(&state, &turn),
            Some(UserAction::OpenAttachment { index: 2, .. })
        ));
        assert!(matches!(
            copy_action(&turn),
            Some(UserAction::CopyAttachment { index: 1, .. })
        ));
    }

    #[test]
    fn rating_shortcut_cycles_stars() {
        let mut turn = completed_state()
            .conversation
            .last_turn()
            .expect("turn")
            .clone();
        assert!(matches!(
            rate_action(&turn),
            Some(UserAction::RateTurn { stars: 1, .. })
        ));
        turn.rating = Some(5);
        assert!(matches!(
            rate_action(&turn),
            Some(UserAction::RateTurn { stars: 1, .. })
        ));
        turn.rating = Some(3);
        assert!(matches!(
            rate_action(&turn),
            Some(UserAction::RateTurn { stars: 4, .. })
        ));
    }

    #[test]
    fn renders_every_overlay_without_panicking() {
        let mut state = completed_state();
        let turn_id = state.conversation.last_turn().expect("turn").id;
        reduce(
            &mut state,
            ShellAction::User(UserAction::OpenAttachment { turn_id, index: 0 }),
        );
        let overlays = [
            ShellOverlay::None,
            ShellOverlay::Help,
            ShellOverlay::ModulePicker {
                selected: 1,
                tentative: Some("knowledge-base"),
            },
            ShellOverlay::OutputOptions { selected: 2 },
            ShellOverlay::StageDetail {
                turn_id,
                stage_index: 3,
            },
            ShellOverlay::FilePreview { active: 0 },
        ];
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).expect("terminal");
        for overlay in overlays {
            state.interaction.overlay = overlay;
            for theme in [UiTheme::Classic, UiTheme::Dusk, UiTheme::Paper] {
                state.customization.theme = theme;
                terminal.draw(|f| ui(f, &state)).expect("draw");
            }
        }
    }

    #[test]
    fn empty_chat_lists_suggestions() {
        let state = ChatState::default();
        let lines = build_chat_lines(&state, palette_for(UiTheme::Classic));
        let text: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
        assert!(text
            .iter()
            .any(|line| line.contains("Analyze Q3 sales data by region")));
    }

    #[test]
    fn wrapped_height_counts_wrapped_rows() {
        let lines = vec![Line::from("abcdef"), Line::from("")];
        assert_eq!(wrapped_height(&lines, 4), 3);
    }
}
