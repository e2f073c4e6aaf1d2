use color_eyre::eyre::Result;
use crossterm::{
    event::{Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use dice_sync::{
    autoplay::AutoplayPhase,
    types::{DiceOutcome, GameRecord, GameStatus, Seat},
    wins::ResultSource,
};
use ratatui::{prelude::*, widgets::*};
use std::{io::stdout, time::Duration};

pub enum UserEvent {
    Quit,
    Roll,
    Bank,
    EndGame,
    NewGame,
    Abandon,
    Dismiss,
    Refresh,
    Redraw,
}

/// Everything the screen shows, captured once per draw.
#[derive(Clone, Debug, Default)]
pub struct ViewSnapshot {
    pub game: Option<GameRecord>,
    pub last_roll: Option<DiceOutcome>,
    pub username: String,
    pub my_wins: u32,
    /// Seats played by the autoplay opponent.
    pub autoplay_seat: Option<Seat>,
    pub autoplay_phase: AutoplayPhase,
    /// Name of the forfeiting player and time left on the banner.
    pub forfeiture: Option<(String, Duration)>,
    pub last_result: Option<ResultSource>,
    pub status: String,
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
    AbandonModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &ViewSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let mode = state.mode;
        term.draw(|f| ui(f, mode, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps a terminal event to an action, handling modal keys locally.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let Event::Key(k) = event else {
        return match event {
            Event::Resize(..) => Some(UserEvent::Redraw),
            _ => None,
        };
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    match state.mode {
        Mode::QuitModal | Mode::AbandonModal => {
            let confirmed = match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => true,
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
                _ => return None,
            };
            let mode = std::mem::take(&mut state.mode);
            return Some(match (mode, confirmed) {
                (Mode::QuitModal, true) => UserEvent::Quit,
                (Mode::AbandonModal, true) => UserEvent::Abandon,
                _ => UserEvent::Redraw,
            });
        }
        Mode::Normal => {}
    }
    Some(match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            UserEvent::Redraw
        }
        KeyCode::Char('a') => {
            state.mode = Mode::AbandonModal;
            UserEvent::Redraw
        }
        KeyCode::Char('r') => UserEvent::Roll,
        KeyCode::Char('h') | KeyCode::Char('b') => UserEvent::Bank,
        KeyCode::Char('e') => UserEvent::EndGame,
        KeyCode::Char('n') => UserEvent::NewGame,
        KeyCode::Char(' ') | KeyCode::Enter => UserEvent::Dismiss,
        KeyCode::Char('f') => UserEvent::Refresh,
        _ => return None,
    })
}

fn ui(f: &mut Frame, mode: Mode, snap: &ViewSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_players(f, chunks[1], snap);
    draw_dice(f, chunks[2], snap);
    draw_bottom(f, chunks[3], chunks[4], snap);

    match mode {
        Mode::QuitModal => draw_confirm(f, "Confirm Quit", "Quit the game? (Y/N)"),
        Mode::AbandonModal => draw_confirm(
            f,
            "Confirm Abandon",
            "Delete this game for both players? (Y/N)",
        ),
        Mode::Normal => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, snap: &ViewSnapshot) {
    let text = match &snap.game {
        Some(game) => {
            let status = match game.status {
                GameStatus::Waiting => "waiting",
                GameStatus::Active => "in progress",
                GameStatus::Finished => "finished",
            };
            format!(
                "{} | game {} | first to {} | {} | wins: {}",
                snap.username, game.id, game.winning_score, status, snap.my_wins
            )
        }
        None => format!("{} | no game loaded | wins: {}", snap.username, snap.my_wins),
    };
    let widget = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Dice"));
    f.render_widget(widget, area);
}

fn draw_players(f: &mut Frame, area: Rect, snap: &ViewSnapshot) {
    let Some(game) = &snap.game else {
        f.render_widget(Block::default().borders(Borders::ALL).title("Players"), area);
        return;
    };
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    for (seat, column) in [Seat::One, Seat::Two].into_iter().zip(columns.iter()) {
        let player = game.player(seat);
        let on_turn = game.is_active() && game.current_seat() == seat;
        let winner = game.winner_id.as_deref() == Some(player.id.as_str());
        let mut title = player.username.clone();
        if snap.autoplay_seat == Some(seat) {
            title.push_str(" [autoplay]");
        }
        let mut lines = vec![
            Line::from(format!("Total: {}", game.total_score(seat))),
            Line::from(format!("Round: {}", game.round_score(seat))),
        ];
        if on_turn {
            let mut turn = String::from("▶ rolling");
            if snap.autoplay_seat == Some(seat) && snap.autoplay_phase != AutoplayPhase::Idle {
                turn.push_str(" (thinking…)");
            }
            lines.push(Line::from(turn));
        }
        if winner {
            lines.push(Line::from("★ winner").style(Style::default().fg(Color::Yellow)));
        }
        let style = if on_turn {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(style);
        f.render_widget(widget, *column);
    }
}

fn draw_dice(f: &mut Frame, area: Rect, snap: &ViewSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(dice) = snap.last_roll {
        let at = dice
            .captured_at()
            .map(|t| t.with_timezone(&chrono::Local).format("  at %H:%M:%S").to_string())
            .unwrap_or_default();
        lines.push(Line::from(format!(
            "{} {}  = {}{at}",
            die_face(dice.die1),
            die_face(dice.die2),
            dice.total()
        )));
    } else {
        lines.push(Line::from("-"));
    }
    if let Some((roller, remaining)) = &snap.forfeiture {
        lines.push(
            Line::from(format!(
                "DOUBLE SIX! {roller} loses the round ({:.1}s, space to continue)",
                remaining.as_secs_f32()
            ))
            .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        );
    }
    if let (Some(game), Some(source)) = (&snap.game, snap.last_result)
        && game.status == GameStatus::Finished
    {
        let verdict = match game.winner() {
            Some(winner) => format!("{} wins", winner.username),
            None => String::from("tie"),
        };
        let origin = match source {
            ResultSource::Server => "confirmed by server",
            ResultSource::LocalFallback => "decided locally",
        };
        lines.push(Line::from(format!("{verdict} ({origin})")));
    }
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Dice"));
    f.render_widget(widget, area);
}

fn die_face(value: u8) -> &'static str {
    match value {
        1 => "⚀",
        2 => "⚁",
        3 => "⚂",
        4 => "⚃",
        5 => "⚄",
        6 => "⚅",
        _ => "?",
    }
}

fn draw_bottom(f: &mut Frame, status_area: Rect, help_area: Rect, snap: &ViewSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = snap.errors.iter().map(|e| Line::from(e.clone())).collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, status_area);

    let help = Paragraph::new(
        "r roll | h bank | e end game | n new game | a abandon | space dismiss | f refresh | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, help_area);
}

fn draw_confirm(f: &mut Frame, title: &str, question: &str) {
    let area = centered_rect(40, 20, f.area());
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let p = Paragraph::new(question.to_string());
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
