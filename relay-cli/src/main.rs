mod client;

use anyhow::Result;
use client::{ConnectionStatus, GatewayClient, StreamEvent};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use relay_shared::{ChatMessage, ChatState, GenerateRequest, MessageRole, Step};
use std::io;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:5000";

struct App {
    state: ChatState,
    input: String,
    // In characters, not bytes.
    cursor_position: usize,
    scroll_offset: usize,
    connection_status: ConnectionStatus,
    streaming: bool,
    model: Option<String>,
    gateway_url: String,
}

impl App {
    fn new(gateway_url: String, model: Option<String>) -> Self {
        Self {
            state: ChatState::default(),
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            connection_status: ConnectionStatus::Idle,
            streaming: false,
            model,
            gateway_url,
        }
    }

    /// Commits the typed line as a user turn and builds the request for the
    /// assistant turn.
    fn submit(&mut self) -> Option<GenerateRequest> {
        if self.streaming || self.input.trim().is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.input);
        self.cursor_position = 0;
        self.scroll_offset = 0;
        self.state.push_user(content);
        self.streaming = true;
        self.connection_status = ConnectionStatus::Streaming;

        Some(GenerateRequest {
            prompt: Some(self.state.render_prompt()),
            model: self.model.clone(),
            stream: true,
            ..Default::default()
        })
    }

    /// Applies one stream event. Returns `Step::End` once the conversation
    /// is over.
    fn apply(&mut self, event: StreamEvent) -> Step {
        match event {
            StreamEvent::Delta(delta) => {
                self.state.append_response(&delta);
                Step::AwaitUser
            }
            StreamEvent::Done => {
                self.streaming = false;
                self.connection_status = ConnectionStatus::Idle;
                self.state.finish_turn()
            }
            StreamEvent::Failed(message) => {
                warn!("Turn failed: {}", message);
                self.streaming = false;
                self.connection_status = ConnectionStatus::Error(message.clone());
                self.state.fail_turn(&message)
            }
        }
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    fn insert_char(&mut self, c: char) {
        let index = self.byte_index();
        self.input.insert(index, c);
        self.cursor_position += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let index = self.byte_index();
            self.input.remove(index);
        }
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to a file; writing to the terminal would corrupt the TUI.
    let log_file = std::fs::File::create("relay-cli.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }
    dotenv::dotenv().ok();

    let gateway_url =
        std::env::var("RELAY_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
    let model = std::env::var("RELAY_CLI_MODEL").ok().filter(|m| !m.is_empty());
    info!("Starting chat via {} (model: {:?})", gateway_url, model);

    let (client, mut events_rx) = GatewayClient::new(&gateway_url);
    let mut app = App::new(client.stream_url().to_string(), model);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(&mut terminal, &mut app, client, &mut events_rx, &mut ui_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    match res {
        Ok(()) => println!("Conversation ended."),
        Err(err) => println!("{err:?}"),
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    client: GatewayClient,
    events_rx: &mut mpsc::UnboundedReceiver<StreamEvent>,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            Some(event) = ui_rx.recv() => {
                match event {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Char('c')
                                if key.modifiers.contains(event::KeyModifiers::CONTROL) =>
                            {
                                return Ok(())
                            }
                            KeyCode::Char(c) => app.insert_char(c),
                            KeyCode::Backspace => app.delete_char(),
                            KeyCode::Left => app.move_cursor_left(),
                            KeyCode::Right => app.move_cursor_right(),
                            KeyCode::Up => app.scroll_up(1),
                            KeyCode::Down => app.scroll_down(1),
                            KeyCode::PageUp => app.scroll_up(10),
                            KeyCode::PageDown => app.scroll_down(10),
                            KeyCode::Enter => {
                                if let Some(request) = app.submit() {
                                    client.send_prompt(request);
                                }
                            }
                            _ => {}
                        }
                    }
                    Event::Mouse(mouse) => match mouse.kind {
                        event::MouseEventKind::ScrollUp => app.scroll_up(3),
                        event::MouseEventKind::ScrollDown => app.scroll_down(3),
                        _ => {}
                    },
                    _ => {}
                }
            }
            Some(event) = events_rx.recv() => {
                if app.apply(event) == Step::End {
                    info!("Exit word received, ending conversation");
                    terminal.draw(|f| ui(f, app))?;
                    return Ok(());
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(f.area());

    render_chat(f, app, chunks[0]);
    render_input(f, app, chunks[1]);
}

fn render_chat(f: &mut Frame, app: &App, area: Rect) {
    let mut all_lines: Vec<Line> = Vec::new();

    let (status_color, status_text) = match &app.connection_status {
        ConnectionStatus::Idle => (Color::Green, format!("● {}", app.gateway_url)),
        ConnectionStatus::Streaming => (Color::Yellow, "● Generating...".to_string()),
        ConnectionStatus::Error(e) => (Color::Red, format!("● Error: {}", e)),
    };
    all_lines.push(Line::from(Span::styled(
        status_text,
        Style::default().fg(status_color),
    )));
    all_lines.push(Line::from(""));

    let mut all_messages = app.state.history().to_vec();
    if app.streaming {
        let streaming = app.state.current_response();
        all_messages.push(ChatMessage::new(
            MessageRole::Assistant,
            if streaming.is_empty() {
                "●●●".to_string()
            } else {
                format!("{}▌", streaming)
            },
        ));
    }

    for msg in &all_messages {
        let (style, prefix) = match msg.role {
            MessageRole::System => (Style::default().fg(Color::Yellow), "System"),
            MessageRole::User => (Style::default().fg(Color::Cyan), "You"),
            MessageRole::Assistant => (Style::default().fg(Color::Green), "Assistant"),
        };

        all_lines.push(Line::from(Span::styled(
            format!("{}:", prefix),
            style.add_modifier(Modifier::BOLD),
        )));
        for line in msg.content.lines() {
            all_lines.push(Line::from(Span::styled(line.to_string(), style)));
        }
        all_lines.push(Line::from(""));
    }

    // Scroll offset counts lines up from the bottom.
    let total_lines = all_lines.len();
    let visible_height = area.height as usize;
    let max_scroll = total_lines.saturating_sub(visible_height);
    let start_line = max_scroll.saturating_sub(app.scroll_offset.min(max_scroll));
    let end_line = (start_line + visible_height).min(total_lines);
    let visible_lines: Vec<Line> = all_lines[start_line..end_line].to_vec();

    let chat = Paragraph::new(visible_lines)
        .block(Block::default().borders(Borders::NONE))
        .wrap(Wrap { trim: false });

    f.render_widget(chat, area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let (input_text, style) = if app.input.is_empty() {
        ("Type your message... ('goodbye' or 'exit' ends the chat)", Style::default().fg(Color::DarkGray))
    } else {
        (app.input.as_str(), Style::default())
    };

    let input = Paragraph::new(input_text)
        .style(style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Input (Ctrl-Q to quit, ↑↓ to scroll)")
                .border_style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(input, area);

    if !app.input.is_empty() {
        let cursor_x = area.x + app.cursor_position as u16 + 1;
        let cursor_y = area.y + 1;
        f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
    }
}
