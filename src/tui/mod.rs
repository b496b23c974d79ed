mod help;
mod product_form;
mod state;

use crate::api::TableCrmClient;
use crate::config::AppConfig;
use crate::model::{Action, CustomerChoice, NoticeLevel, ReferenceKind, Step, WizardEvent};
use crate::receipt;
use crate::session::Session;
use crate::wizard::{self, UiCommand, WizardController};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{GoodsPane, Screen, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: AppConfig) -> Result<()> {
    let client = TableCrmClient::new(&cfg.base_url, &cfg.user_agent, cfg.timeout)?;

    let mut session = Session::new(cfg.token_path.clone());
    // A token given on the command line goes through sign-in like a typed one.
    if cfg.token_override.is_none() {
        if let Err(e) = session.init() {
            tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable token file");
        }
    }
    let controller = WizardController::new(Arc::new(client), session);

    // Unbounded channels keep the UI thread from ever blocking on the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WizardEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    if let Some(token) = cfg.token_override.clone() {
        let _ = cmd_tx.send(UiCommand::Authenticate(token));
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let base_url = cfg.base_url.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(base_url, event_rx, cmd_tx));

    let res = wizard::run_controller(controller, cfg.debounce, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    base_url: String,
    mut event_rx: UnboundedReceiver<WizardEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState {
        base_url,
        ..Default::default()
    };

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = 'ui: loop {
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(TryRecvError::Empty) => break,
                // Controller is gone; nothing left to drive.
                Err(TryRecvError::Disconnected) => break 'ui Ok(()),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(cmd) = state.handle_key(k) {
                    let quit = matches!(cmd, UiCommand::Quit);
                    let _ = cmd_tx.send(cmd);
                    if quit {
                        break Ok(());
                    }
                }
                // Redraw right away so typing feels immediate.
                terminal.draw(|f| draw(f.area(), f, &state)).ok();
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let current = state.step();
    if state.screen == Screen::Product {
        product_form::draw_tabs(chunks[0], f, &state.product);
    } else {
        let titles: Vec<Line> = Step::ALL
            .iter()
            .map(|s| {
                let mark = if s.index() < current.index() { "✓ " } else { "" };
                Line::from(format!("{mark}{}. {}", s.index() + 1, s.label()))
            })
            .collect();
        let tabs = Tabs::new(titles)
            .select(current.index())
            .block(Block::default().borders(Borders::ALL).title("tablecrm-order"))
            .highlight_style(Style::default().fg(Color::Yellow));
        f.render_widget(tabs, chunks[0]);
    }

    if state.show_help {
        help::draw_help(chunks[1], f);
    } else if state.screen == Screen::Product {
        product_form::draw_product(chunks[1], f, &state.product);
    } else {
        match current {
            Step::Auth => draw_auth(chunks[1], f, state),
            Step::Client => draw_client(chunks[1], f, state),
            Step::Details => draw_details(chunks[1], f, state),
            Step::Goods => draw_goods(chunks[1], f, state),
            Step::Confirm => draw_confirm(chunks[1], f, state),
        }
    }

    draw_status(chunks[2], f, state);
}

fn label_style() -> Style {
    Style::default().fg(Color::Gray)
}

fn cursor() -> Span<'static> {
    Span::styled("▏", Style::default().fg(Color::Yellow))
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if focused {
        block.border_style(Style::default().fg(Color::Yellow))
    } else {
        block
    }
}

/// Show only the last four characters of a secret.
fn mask(secret: &str) -> String {
    let n = secret.chars().count();
    let shown: String = secret.chars().skip(n.saturating_sub(4)).collect();
    format!("{}{}", "•".repeat(n.saturating_sub(4)), shown)
}

fn draw_auth(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let lines = vec![
        Line::from("Paste your TableCRM access token and press Enter."),
        Line::from(""),
        Line::from(vec![
            Span::styled("Token: ", label_style()),
            Span::raw(mask(&state.token_input)),
            cursor(),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("API: {}", state.base_url),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Sign in"));
    f.render_widget(p, area);
}

fn draw_client(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let input = Paragraph::new(Line::from(vec![
        Span::raw(state.phone_input.clone()),
        cursor(),
    ]))
    .block(focused_block("Phone".into(), true));
    f.render_widget(input, chunks[0]);

    let lines = match state.snapshot.customer.as_ref() {
        Some(CustomerChoice::Customer(c)) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    c.name.clone(),
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(vec![
                    Span::styled("Id: ", label_style()),
                    Span::raw(c.id.to_string()),
                ]),
            ];
            if let Some(phone) = c.phone.as_deref() {
                lines.push(Line::from(vec![
                    Span::styled("Phone: ", label_style()),
                    Span::raw(phone.to_string()),
                ]));
            }
            lines.push(match c.loyalty_card_id {
                Some(card) => Line::from(Span::styled(
                    format!("Loyalty card {card}"),
                    Style::default().fg(Color::Cyan),
                )),
                None => Line::from(Span::styled("No loyalty card", label_style())),
            });
            lines.push(Line::from(""));
            lines.push(Line::from("Ctrl-N to continue, Ctrl-X to clear."));
            lines
        }
        Some(CustomerChoice::Skipped) => vec![Line::from("Continuing without a customer.")],
        None => vec![
            Line::from("Enter a phone number and press Enter to find the customer."),
            Line::from("Ctrl-S continues without one."),
        ],
    };
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Customer"));
    f.render_widget(p, chunks[1]);
}

fn draw_details(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    let loading = state.busy.contains(&Action::LoadReferences);
    for (i, kind) in ReferenceKind::ALL.into_iter().enumerate() {
        let selected = state.snapshot.selections.get(kind);
        let list = state.snapshot.references.get(kind);
        let items: Vec<ListItem> = if list.is_empty() {
            let msg = if loading { "loading…" } else { "(empty)" };
            vec![ListItem::new(Span::styled(msg, label_style()))]
        } else {
            list.iter()
                .map(|e| {
                    if Some(e.id) == selected {
                        ListItem::new(Span::styled(
                            format!("✓ {}", e.name),
                            Style::default().fg(Color::Green),
                        ))
                    } else {
                        ListItem::new(format!("  {}", e.name))
                    }
                })
                .collect()
        };
        let focused = i == state.details_focus;
        let widget = List::new(items)
            .block(focused_block(kind.label().to_string(), focused))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        let mut list_state = ListState::default();
        if focused && !list.is_empty() {
            list_state.select(Some(state.details_cursor[i]));
        }
        f.render_stateful_widget(widget, columns[i], &mut list_state);
    }
}

fn draw_goods(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(halves[0]);

    let on_catalog = state.goods_pane == GoodsPane::Catalog;
    let search_title = if state.busy.contains(&Action::Search) {
        "Search (searching…)".to_string()
    } else {
        "Search".to_string()
    };
    let mut input = vec![Span::raw(state.search_input.clone())];
    if on_catalog {
        input.push(cursor());
    }
    f.render_widget(
        Paragraph::new(Line::from(input)).block(focused_block(search_title, on_catalog)),
        left[0],
    );

    let snapshot = &state.snapshot;
    let items: Vec<ListItem> = snapshot
        .catalog
        .iter()
        .map(|item| {
            let price = item
                .price
                .map(receipt::format_amount)
                .unwrap_or_else(|| "-".into());
            let mut spans = vec![Span::raw(format!("{:<32} {:>10}", item.name, price))];
            if let Some(q) = snapshot.quantity_of(item.id) {
                spans.push(Span::styled(
                    format!("  ×{q}"),
                    Style::default().fg(Color::Cyan),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let catalog = List::new(items)
        .block(focused_block(
            format!("Catalog ({})", snapshot.catalog.len()),
            on_catalog,
        ))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut catalog_state = ListState::default();
    if !snapshot.catalog.is_empty() {
        catalog_state.select(Some(state.catalog_cursor));
    }
    f.render_stateful_widget(catalog, left[1], &mut catalog_state);

    let lines: Vec<ListItem> = snapshot
        .cart
        .iter()
        .map(|l| {
            ListItem::new(format!(
                "{}  {} × {} = {}",
                l.name,
                l.quantity,
                receipt::format_amount(l.unit_price),
                receipt::format_amount(l.amount())
            ))
        })
        .collect();
    let cart = List::new(lines)
        .block(focused_block(
            format!("Cart: {}", receipt::format_amount(snapshot.total)),
            !on_catalog,
        ))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut cart_state = ListState::default();
    if !on_catalog && !snapshot.cart.is_empty() {
        cart_state.select(Some(state.cart_cursor));
    }
    f.render_stateful_widget(cart, halves[1], &mut cart_state);
}

fn draw_confirm(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = receipt::order(&state.snapshot)
        .lines
        .into_iter()
        .map(Line::from)
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Magenta)),
        Span::raw(" create   "),
        Span::styled("f", Style::default().fg(Color::Magenta)),
        Span::raw(" create and post   "),
        Span::styled("Esc", Style::default().fg(Color::Magenta)),
        Span::raw(" back to goods"),
    ]));
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Review order"));
    f.render_widget(p, area);
}

fn hint(state: &UiState) -> &'static str {
    if state.screen == Screen::Product {
        return "Tab section · ↑/↓ field · Ctrl-A autofill · Ctrl-P publish · Esc orders";
    }
    match state.step() {
        Step::Auth => "Enter sign in · F1 help · Ctrl-C quit",
        Step::Client => "Enter look up · Ctrl-N continue · Ctrl-S skip · F1 help",
        Step::Details => "Tab switch list · Enter select · Ctrl-N goods · Esc back",
        Step::Goods => "Tab catalog/cart · Enter add · +/- qty · Ctrl-N review · Esc back",
        Step::Confirm => "Enter create · f create and post · Esc back",
    }
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = if let Some(action) = state.busy.iter().find(|a| **a != Action::Search) {
        Line::from(Span::styled(
            format!("{}…", action.label()),
            Style::default().fg(Color::Yellow),
        ))
    } else if let Some(n) = state.visible_notice() {
        let color = match n.level {
            NoticeLevel::Success => Color::Green,
            NoticeLevel::Info => Color::Cyan,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        Line::from(Span::styled(n.message.clone(), Style::default().fg(color)))
    } else {
        Line::from(Span::styled(hint(state), label_style()))
    };
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(mask(""), "");
        assert_eq!(mask("abc"), "abc");
        assert_eq!(mask("abcdefgh"), "••••efgh");
    }
}
