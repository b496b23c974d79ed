//! Product form screen: one section of fields per tab, a tag row for keywords
//! and the marketplace fee split underneath.

use crate::model::Notice;
use crate::product::{
    remove_tag, ProductDraft, ProductError, ProductField, ProductForm, ProductTab,
};
use crate::receipt;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Frame,
};

/// What a key press on the product screen asks of the UI.
#[derive(Debug)]
pub enum ProductInput {
    Handled,
    Notice(Notice),
    Publish(ProductDraft),
}

#[derive(Debug, Default)]
pub struct ProductScreen {
    pub form: ProductForm,
    field: usize,
    buffer: String,
    // Set when the buffer does not parse; the draft keeps its previous value.
    rejected: Option<String>,
    tag: usize,
}

impl ProductScreen {
    pub fn field(&self) -> ProductField {
        let fields = self.form.tab().fields();
        fields[self.field.min(fields.len() - 1)]
    }

    fn focus(&mut self, index: usize) {
        self.field = index.min(self.form.tab().fields().len() - 1);
        self.buffer = self.field().text(&self.form.draft);
        self.rejected = None;
        self.tag = 0;
    }

    fn switch_tab(&mut self, tab: ProductTab) {
        self.form.set_tab(tab);
        self.focus(0);
    }

    fn edit(&mut self) {
        self.rejected = self
            .field()
            .set_text(&mut self.form.draft, &self.buffer)
            .err()
            .map(|e| e.message);
    }

    /// The API accepted the draft: start a new one.
    pub fn published(&mut self) {
        self.form.reset();
        self.focus(0);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ProductInput {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match (ctrl, key.code) {
            (true, KeyCode::Char('a')) => {
                return match self.form.autofill() {
                    Ok(()) => {
                        self.focus(self.field);
                        ProductInput::Notice(Notice::info("Filled in from the name"))
                    }
                    Err(e) => ProductInput::Notice(Notice::warning(e.to_string())),
                };
            }
            (true, KeyCode::Char('p')) => return self.publish(),
            (_, KeyCode::Tab) => {
                self.form.next_tab();
                self.focus(0);
            }
            (_, KeyCode::BackTab) => {
                if let Some(prev) = self.form.tab().previous() {
                    self.switch_tab(prev);
                }
            }
            (_, KeyCode::Up) => self.focus(self.field.saturating_sub(1)),
            (_, KeyCode::Down) => self.focus(self.field + 1),
            _ if self.field() == ProductField::SeoKeywords => self.keyword_key(ctrl, key.code),
            (false, KeyCode::Char(c)) => {
                self.buffer.push(c);
                self.edit();
            }
            (_, KeyCode::Backspace) => {
                self.buffer.pop();
                self.edit();
            }
            _ => {}
        }
        ProductInput::Handled
    }

    fn keyword_key(&mut self, ctrl: bool, code: KeyCode) {
        let form = &mut self.form;
        let tags = &mut form.draft.seo_keywords;
        match (ctrl, code) {
            (false, KeyCode::Char(c)) => form.keywords.push(c, tags),
            (_, KeyCode::Backspace) => form.keywords.backspace(tags),
            (_, KeyCode::Enter) => form.keywords.commit(tags),
            (_, KeyCode::Left) => self.tag = self.tag.saturating_sub(1),
            (_, KeyCode::Right) => self.tag += 1,
            (_, KeyCode::Delete) => {
                if let Some(tag) = tags.get(self.tag).cloned() {
                    remove_tag(tags, &tag);
                }
            }
            _ => {}
        }
        self.tag = self.tag.min(tags.len().saturating_sub(1));
    }

    fn publish(&mut self) -> ProductInput {
        // Keyword text still in the input counts as entered.
        self.form.keywords.commit(&mut self.form.draft.seo_keywords);
        match self.form.prepare() {
            Ok(()) => ProductInput::Publish(self.form.draft.clone()),
            Err(ProductError::Invalid(errs)) => {
                let tab = self.form.tab();
                let index = errs
                    .fields()
                    .next()
                    .and_then(|f| tab.fields().iter().position(|x| *x == f))
                    .unwrap_or(0);
                self.focus(index);
                ProductInput::Notice(Notice::error(errs.to_string()))
            }
            Err(e) => ProductInput::Notice(Notice::error(e.to_string())),
        }
    }
}

pub fn draw_tabs(area: Rect, f: &mut Frame, screen: &ProductScreen) {
    let current = screen.form.tab();
    let titles: Vec<Line> = ProductTab::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| Line::from(format!("{}. {}", i + 1, t.label())))
        .collect();
    let selected = ProductTab::ALL
        .iter()
        .position(|t| *t == current)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title("New product"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, area);
}

pub fn draw_product(area: Rect, f: &mut Frame, screen: &ProductScreen) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(5)])
        .split(area);

    let draft = &screen.form.draft;
    let focused = screen.field();
    let label = Style::default().fg(Color::Gray);
    let caret = Span::styled("▏", Style::default().fg(Color::Yellow));

    let mut lines = Vec::new();
    for field in screen.form.tab().fields() {
        let is_focused = *field == focused;
        let marker = if is_focused { "› " } else { "  " };
        let mut spans = vec![Span::styled(
            format!("{marker}{:<20}", field.wire_name()),
            label,
        )];
        if *field == ProductField::SeoKeywords {
            for (i, tag) in draft.seo_keywords.iter().enumerate() {
                let style = if is_focused && i == screen.tag {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default().fg(Color::Cyan)
                };
                spans.push(Span::styled(format!("[{tag}]"), style));
                spans.push(Span::raw(" "));
            }
            if is_focused {
                spans.push(Span::raw(screen.form.keywords.buffer().to_string()));
                spans.push(caret.clone());
            }
        } else if is_focused {
            spans.push(Span::raw(screen.buffer.clone()));
            spans.push(caret.clone());
            if let Some(why) = screen.rejected.as_deref() {
                spans.push(Span::styled(
                    format!("  ({why})"),
                    Style::default().fg(Color::Red),
                ));
            }
        } else {
            spans.push(Span::raw(field.text(draft)));
        }
        lines.push(Line::from(spans));
    }
    let fields = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(screen.form.tab().label()));
    f.render_widget(fields, chunks[0]);

    let pricing = draft.pricing();
    let summary = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Price      ", label),
            Span::raw(receipt::format_amount(draft.marketplace_price)),
        ]),
        Line::from(vec![
            Span::styled("Commission ", label),
            Span::raw(receipt::format_amount(pricing.commission)),
        ]),
        Line::from(vec![
            Span::styled("Payout     ", label),
            Span::styled(
                receipt::format_amount(pricing.payout),
                Style::default().fg(Color::Green),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Marketplace"));
    f.render_widget(summary, chunks[1]);
}
