use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn keybind(key: &'static str, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Anywhere:"),
        keybind("Ctrl-C", "Quit"),
        keybind("F1", "Toggle this help"),
        keybind("Esc", "Back one step"),
        keybind("Ctrl-L", "Sign out and forget the token"),
        keybind("F2", "Switch between the order and a new product"),
        Line::from(""),
        Line::from("Token:"),
        keybind("Enter", "Check and save the token"),
        Line::from(""),
        Line::from("Client:"),
        keybind("Enter", "Look up by phone"),
        keybind("Ctrl-N", "Continue with the found customer"),
        keybind("Ctrl-S", "Continue without a customer"),
        keybind("Ctrl-X", "Clear the customer"),
        Line::from(""),
        Line::from("Details:"),
        keybind("Tab / ←→", "Switch list"),
        keybind("↑/↓", "Move"),
        keybind("Enter", "Select"),
        keybind("Ctrl-R", "Reload lists"),
        keybind("Ctrl-N", "Go to goods"),
        Line::from(""),
        Line::from("Goods:"),
        keybind("Tab", "Switch between catalog and cart"),
        keybind("type", "Search the catalog"),
        keybind("Enter", "Add the highlighted item"),
        keybind("+ / -", "Change quantity (cart)"),
        keybind("Del / x", "Remove line (cart)"),
        keybind("Ctrl-N", "Review the order"),
        Line::from(""),
        Line::from("Confirm:"),
        keybind("Enter / c", "Create the order"),
        keybind("f", "Create and post the order"),
        Line::from(""),
        Line::from("New product:"),
        keybind("Tab / S-Tab", "Next / previous section"),
        keybind("↑/↓", "Move between fields"),
        keybind(",  Enter", "Add keyword tags"),
        keybind("←→ Del", "Pick and remove a keyword"),
        keybind("Ctrl-A", "Fill descriptions and code from the name"),
        keybind("Ctrl-P", "Publish"),
        keybind("Esc", "Back to the order"),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
