//! Text summaries for non-interactive output and the confirm screen.

use crate::model::{
    CatalogItem, Customer, CustomerChoice, ReferenceKind, References, WizardSnapshot,
};
use crate::product::{ProductDraft, ProductTab, ValidationErrors};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn format_amount(v: f64) -> String {
    format!("{v:.2}")
}

pub(crate) fn customer_label(choice: Option<&CustomerChoice>) -> String {
    match choice {
        Some(CustomerChoice::Customer(c)) => customer_line(c),
        Some(CustomerChoice::Skipped) => "no customer".into(),
        None => "-".into(),
    }
}

fn customer_line(c: &Customer) -> String {
    let mut s = format!("{} (#{})", c.name, c.id);
    if let Some(phone) = c.phone.as_deref().filter(|p| !p.is_empty()) {
        s.push_str(&format!(", {phone}"));
    }
    if let Some(card) = c.loyalty_card_id {
        s.push_str(&format!(", loyalty card {card}"));
    }
    s
}

pub(crate) fn customers(found: &[Customer]) -> TextSummary {
    let lines = if found.is_empty() {
        vec!["No customer found".to_string()]
    } else {
        found.iter().map(customer_line).collect()
    };
    TextSummary { lines }
}

pub(crate) fn references(refs: &References) -> TextSummary {
    let mut lines = Vec::new();
    for kind in ReferenceKind::ALL {
        lines.push(format!("{}:", kind.label()));
        let list = refs.get(kind);
        if list.is_empty() {
            lines.push("  (none)".into());
        }
        for e in list {
            lines.push(format!("  {:>8}  {}", e.id, e.name));
        }
    }
    TextSummary { lines }
}

pub(crate) fn catalog(items: &[CatalogItem]) -> TextSummary {
    let lines = if items.is_empty() {
        vec!["No items".to_string()]
    } else {
        items
            .iter()
            .map(|i| {
                let price = i.price.map(format_amount).unwrap_or_else(|| "-".into());
                format!("{:>8}  {:<40} {:>12}", i.id, i.name, price)
            })
            .collect()
    };
    TextSummary { lines }
}

/// Order as it will be submitted: customer, the four selections and the goods.
pub(crate) fn order(snapshot: &WizardSnapshot) -> TextSummary {
    let mut lines = vec![format!(
        "Customer: {}",
        customer_label(snapshot.customer.as_ref())
    )];
    for kind in ReferenceKind::ALL {
        let value = snapshot
            .selections
            .get(kind)
            .map(|id| {
                snapshot
                    .references
                    .name_of(kind, id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{id}"))
            })
            .unwrap_or_else(|| "-".into());
        lines.push(format!("{}: {value}", kind.label()));
    }
    lines.push(String::new());
    for l in &snapshot.cart {
        lines.push(format!(
            "  {}  {} x {} = {}",
            l.name,
            l.quantity,
            format_amount(l.unit_price),
            format_amount(l.amount())
        ));
    }
    lines.push(format!("Total: {}", format_amount(snapshot.total)));
    TextSummary { lines }
}

pub(crate) fn product(draft: &ProductDraft) -> TextSummary {
    let pricing = draft.pricing();
    let mut lines = vec![
        format!("Name: {}", draft.name),
        format!("Code: {}", draft.code),
        format!(
            "Unit/category/global: {} / {} / {}",
            draft.unit, draft.category, draft.global_category_id
        ),
        format!(
            "Price: {}  commission {}% = {}  payout {}",
            format_amount(draft.marketplace_price),
            draft.chatting_percent,
            format_amount(pricing.commission),
            format_amount(pricing.payout)
        ),
        format!("Address: {}", draft.address),
    ];
    if !draft.seo_keywords.is_empty() {
        lines.push(format!("Keywords: {}", draft.seo_keywords.join(", ")));
    }
    TextSummary { lines }
}

/// Validation failures grouped under the form tab that owns each field.
pub(crate) fn product_errors(errs: &ValidationErrors) -> TextSummary {
    let mut lines = Vec::new();
    for tab in ProductTab::ALL {
        let mut on_tab = errs.on_tab(tab).peekable();
        if on_tab.peek().is_none() {
            continue;
        }
        lines.push(format!("{}:", tab.label()));
        lines.extend(on_tab.map(|e| format!("  {e}")));
    }
    TextSummary { lines }
}
