use super::product_form::{ProductInput, ProductScreen};
use crate::model::{Action, Notice, ReferenceKind, Step, WizardEvent, WizardSnapshot};
use crate::wizard::UiCommand;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// How long a notice stays in the status row.
const NOTICE_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoodsPane {
    #[default]
    Catalog,
    Cart,
}

/// Which screen has the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Order,
    Product,
}

/// View state owned by the UI thread. The wizard itself lives in the
/// controller task; `snapshot` is its latest published copy.
#[derive(Debug, Default)]
pub struct UiState {
    pub snapshot: WizardSnapshot,
    pub token_input: String,
    pub phone_input: String,
    pub search_input: String,
    pub details_focus: usize,
    pub details_cursor: [usize; 4],
    pub goods_pane: GoodsPane,
    pub catalog_cursor: usize,
    pub cart_cursor: usize,
    pub busy: BTreeSet<Action>,
    pub notice: Option<(Notice, Instant)>,
    pub show_help: bool,
    pub base_url: String,
    pub screen: Screen,
    pub product: ProductScreen,
}

impl UiState {
    pub fn step(&self) -> Step {
        self.snapshot.step
    }

    /// True while an action that the UI must not re-trigger is in flight.
    /// Catalog searches run in the background and never block input.
    pub fn is_blocked(&self) -> bool {
        self.busy.iter().any(|a| *a != Action::Search)
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some((notice, Instant::now()));
    }

    pub fn visible_notice(&self) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|(_, at)| at.elapsed() < NOTICE_TTL)
            .map(|(n, _)| n)
    }

    pub fn focused_kind(&self) -> ReferenceKind {
        ReferenceKind::ALL[self.details_focus % ReferenceKind::ALL.len()]
    }

    pub fn apply_event(&mut self, ev: WizardEvent) {
        match ev {
            WizardEvent::Snapshot(snapshot) => self.apply_snapshot(*snapshot),
            WizardEvent::Busy { action, busy } => {
                if busy {
                    self.busy.insert(action);
                } else {
                    self.busy.remove(&action);
                }
            }
            WizardEvent::Notice(n) => self.set_notice(n),
            WizardEvent::ProductPublished => self.product.published(),
        }
    }

    fn apply_snapshot(&mut self, snapshot: WizardSnapshot) {
        let prev_step = self.snapshot.step;
        self.snapshot = snapshot;

        if self.snapshot.step != prev_step {
            match self.snapshot.step {
                Step::Auth => {
                    self.token_input.clear();
                    self.phone_input.clear();
                }
                Step::Client if prev_step != Step::Details => self.phone_input.clear(),
                Step::Goods if prev_step == Step::Details => {
                    self.search_input.clear();
                    self.goods_pane = GoodsPane::Catalog;
                }
                _ => {}
            }
        }

        // Keep each list's cursor on its current selection.
        for (i, kind) in ReferenceKind::ALL.into_iter().enumerate() {
            let list = self.snapshot.references.get(kind);
            if let Some(id) = self.snapshot.selections.get(kind) {
                if let Some(pos) = list.iter().position(|e| e.id == id) {
                    self.details_cursor[i] = pos;
                }
            }
            self.details_cursor[i] = clamp(self.details_cursor[i], list.len());
        }
        self.catalog_cursor = clamp(self.catalog_cursor, self.snapshot.catalog.len());
        self.cart_cursor = clamp(self.cart_cursor, self.snapshot.cart.len());
    }

    /// Map a key press to a controller command, updating local input state.
    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match (ctrl, key.code) {
            (true, KeyCode::Char('c')) | (true, KeyCode::Char('q')) => {
                return Some(UiCommand::Quit)
            }
            (_, KeyCode::F(1)) => {
                self.show_help = !self.show_help;
                return None;
            }
            (_, KeyCode::Esc) if self.show_help => {
                self.show_help = false;
                return None;
            }
            (_, KeyCode::F(2)) => {
                self.screen = match self.screen {
                    Screen::Order => Screen::Product,
                    Screen::Product => Screen::Order,
                };
                return None;
            }
            (true, KeyCode::Char('l')) if self.step() != Step::Auth => {
                return Some(UiCommand::Logout)
            }
            (_, KeyCode::Esc) if self.screen == Screen::Product => {
                self.screen = Screen::Order;
                return None;
            }
            (_, KeyCode::Esc) => {
                return self.step().previous().map(|_| UiCommand::Back);
            }
            _ => {}
        }

        let cmd = match (self.screen, self.step()) {
            (Screen::Product, _) => self.product_key(key),
            (Screen::Order, Step::Auth) => self.auth_key(key),
            (Screen::Order, Step::Client) => self.client_key(ctrl, key),
            (Screen::Order, Step::Details) => self.details_key(ctrl, key),
            (Screen::Order, Step::Goods) => self.goods_key(ctrl, key),
            (Screen::Order, Step::Confirm) => self.confirm_key(key),
        }?;

        if self.is_blocked() && is_remote(&cmd) {
            let waiting = self.busy.iter().next().map(|a| a.label()).unwrap_or("busy");
            self.set_notice(Notice::info(format!("Please wait: {waiting}…")));
            return None;
        }
        Some(cmd)
    }

    fn product_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        match self.product.handle_key(key) {
            ProductInput::Handled => None,
            ProductInput::Notice(n) => {
                self.set_notice(n);
                None
            }
            ProductInput::Publish(draft) => Some(UiCommand::PublishProduct(Box::new(draft))),
        }
    }

    fn auth_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        match key.code {
            KeyCode::Char(c) => {
                self.token_input.push(c);
                None
            }
            KeyCode::Backspace => {
                self.token_input.pop();
                None
            }
            KeyCode::Enter => Some(UiCommand::Authenticate(self.token_input.clone())),
            _ => None,
        }
    }

    fn client_key(&mut self, ctrl: bool, key: KeyEvent) -> Option<UiCommand> {
        match (ctrl, key.code) {
            (true, KeyCode::Char('s')) => Some(UiCommand::SkipCustomer),
            (true, KeyCode::Char('n')) => Some(UiCommand::ContinueWithCustomer),
            (true, KeyCode::Char('x')) => {
                self.phone_input.clear();
                Some(UiCommand::ClearCustomer)
            }
            (false, KeyCode::Char(c)) if is_phone_char(c) => {
                self.phone_input.push(c);
                None
            }
            (_, KeyCode::Backspace) => {
                self.phone_input.pop();
                None
            }
            (_, KeyCode::Enter) => Some(UiCommand::LookupCustomer(self.phone_input.clone())),
            _ => None,
        }
    }

    fn details_key(&mut self, ctrl: bool, key: KeyEvent) -> Option<UiCommand> {
        let n = ReferenceKind::ALL.len();
        let kind = self.focused_kind();
        let len = self.snapshot.references.get(kind).len();
        let cursor = &mut self.details_cursor[self.details_focus % n];
        match (ctrl, key.code) {
            (true, KeyCode::Char('r')) => Some(UiCommand::ReloadReferences),
            (true, KeyCode::Char('n')) => Some(UiCommand::ProceedToGoods),
            (_, KeyCode::Tab) | (_, KeyCode::Right) => {
                self.details_focus = (self.details_focus + 1) % n;
                None
            }
            (_, KeyCode::BackTab) | (_, KeyCode::Left) => {
                self.details_focus = (self.details_focus + n - 1) % n;
                None
            }
            (_, KeyCode::Up) => {
                *cursor = cursor.saturating_sub(1);
                None
            }
            (_, KeyCode::Down) => {
                *cursor = clamp(*cursor + 1, len);
                None
            }
            (_, KeyCode::Enter) | (_, KeyCode::Char(' ')) => self
                .snapshot
                .references
                .get(kind)
                .get(*cursor)
                .map(|e| UiCommand::SelectReference { kind, id: e.id }),
            _ => None,
        }
    }

    fn goods_key(&mut self, ctrl: bool, key: KeyEvent) -> Option<UiCommand> {
        match (ctrl, key.code) {
            (true, KeyCode::Char('n')) => return Some(UiCommand::ProceedToConfirm),
            (_, KeyCode::Tab) | (_, KeyCode::BackTab) => {
                self.goods_pane = match self.goods_pane {
                    GoodsPane::Catalog => GoodsPane::Cart,
                    GoodsPane::Cart => GoodsPane::Catalog,
                };
                return None;
            }
            _ => {}
        }

        match self.goods_pane {
            GoodsPane::Catalog => match key.code {
                KeyCode::Char(c) if !ctrl => {
                    self.search_input.push(c);
                    Some(UiCommand::SearchInput(self.search_input.clone()))
                }
                KeyCode::Backspace => {
                    self.search_input.pop();
                    Some(UiCommand::SearchInput(self.search_input.clone()))
                }
                KeyCode::Up => {
                    self.catalog_cursor = self.catalog_cursor.saturating_sub(1);
                    None
                }
                KeyCode::Down => {
                    self.catalog_cursor =
                        clamp(self.catalog_cursor + 1, self.snapshot.catalog.len());
                    None
                }
                KeyCode::Enter => self
                    .snapshot
                    .catalog
                    .get(self.catalog_cursor)
                    .map(|i| UiCommand::AddToCart(i.id)),
                _ => None,
            },
            GoodsPane::Cart => {
                let line = self.snapshot.cart.get(self.cart_cursor).map(|l| l.item_id);
                match key.code {
                    KeyCode::Up => {
                        self.cart_cursor = self.cart_cursor.saturating_sub(1);
                        None
                    }
                    KeyCode::Down => {
                        self.cart_cursor = clamp(self.cart_cursor + 1, self.snapshot.cart.len());
                        None
                    }
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        line.map(|item_id| UiCommand::AdjustQuantity { item_id, delta: 1 })
                    }
                    KeyCode::Char('-') => {
                        line.map(|item_id| UiCommand::AdjustQuantity { item_id, delta: -1 })
                    }
                    KeyCode::Delete | KeyCode::Char('x') => line.map(UiCommand::RemoveFromCart),
                    _ => None,
                }
            }
        }
    }

    fn confirm_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        match key.code {
            KeyCode::Enter | KeyCode::Char('c') => Some(UiCommand::Submit { finalize: false }),
            KeyCode::Char('f') => Some(UiCommand::Submit { finalize: true }),
            _ => None,
        }
    }
}

fn is_phone_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')')
}

/// Commands that hit the network and must not be re-entered while busy.
fn is_remote(cmd: &UiCommand) -> bool {
    matches!(
        cmd,
        UiCommand::Authenticate(_)
            | UiCommand::LookupCustomer(_)
            | UiCommand::ContinueWithCustomer
            | UiCommand::SkipCustomer
            | UiCommand::ReloadReferences
            | UiCommand::Submit { .. }
            | UiCommand::PublishProduct(_)
    )
}

fn clamp(cursor: usize, len: usize) -> usize {
    cursor.min(len.saturating_sub(1))
}
