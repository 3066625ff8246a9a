mod help;
mod state;
mod view;

use crate::engine::readiness::http_client;
use crate::engine::ProcessRegistry;
use crate::model::{LauncherConfig, UiEvent};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use state::{Links, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: LauncherConfig) -> Result<()> {
    let cfg = Arc::new(cfg);
    let client = http_client()?;
    // Leftovers from a crashed run are dealt with before the first frame.
    let controller_state = orchestrator::initial_state(&cfg, ProcessRegistry::default());

    // Unbounded channels avoid backpressure between the render loop and the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let links = Links::from_config(&cfg);
    let ui_handle = std::thread::spawn(move || run_threaded(links, event_rx, cmd_tx));

    orchestrator::run_controller(cfg, controller_state, client, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }
    Ok(())
}

fn key_command(k: KeyEvent) -> Option<UiCommand> {
    match (k.modifiers, k.code) {
        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            Some(UiCommand::Quit)
        }
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(UiCommand::CursorUp),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(UiCommand::CursorDown),
        (_, KeyCode::Enter | KeyCode::Char(' ')) => Some(UiCommand::ActivateCursor),
        (_, KeyCode::Char(c @ '1'..='6')) => Some(UiCommand::Activate(c as usize - '1' as usize)),
        _ => None,
    }
}

/// Mouse input is ignored while an action is loading.
fn mouse_command(m: MouseEvent, area: Rect, loading: bool) -> Option<UiCommand> {
    if loading {
        return None;
    }
    match m.kind {
        MouseEventKind::ScrollUp => Some(UiCommand::CursorUp),
        MouseEventKind::ScrollDown => Some(UiCommand::CursorDown),
        MouseEventKind::Up(MouseButton::Left) => Some(
            view::menu_index_at(area, m.column, m.row)
                .map_or(UiCommand::ActivateCursor, UiCommand::Activate),
        ),
        _ => None,
    }
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    links: Links,
    mut event_rx: UnboundedReceiver<UiEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(links);
    let mut area = Rect::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        let exited = loop {
            match event_rx.try_recv() {
                Ok(UiEvent::State(view)) => {
                    state.apply(*view);
                    dirty = true;
                }
                Ok(UiEvent::Exited) | Err(TryRecvError::Disconnected) => break true,
                Err(TryRecvError::Empty) => break false,
            }
        };
        if exited {
            break Ok(());
        }

        dirty |= state.tick(Instant::now());
        if dirty || last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| {
                    area = f.area();
                    view::draw(f.area(), f, &state)
                })
                .ok();
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let cmd = match event::read() {
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => key_command(k),
            Ok(Event::Mouse(m)) => mouse_command(m, area, state.is_loading()),
            _ => None,
        };
        match cmd {
            Some(UiCommand::Quit) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break Ok(());
            }
            Some(cmd) => {
                let _ = cmd_tx.send(cmd);
            }
            None => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableMouseCapture, LeaveAlternateScreen).ok();
    println!("Bye! 👋");
    res
}
