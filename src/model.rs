use serde::{Deserialize, Serialize};

/// Unit code the API uses for "piece" when an item does not carry its own.
pub const DEFAULT_UNIT: i64 = 116;

/// Wizard steps, in the fixed order the order form walks through them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Auth,
    Client,
    Details,
    Goods,
    Confirm,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Auth,
        Step::Client,
        Step::Details,
        Step::Goods,
        Step::Confirm,
    ];

    pub fn index(self) -> usize {
        match self {
            Step::Auth => 0,
            Step::Client => 1,
            Step::Details => 2,
            Step::Goods => 3,
            Step::Confirm => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Auth => "Token",
            Step::Client => "Client",
            Step::Details => "Details",
            Step::Goods => "Goods",
            Step::Confirm => "Confirm",
        }
    }

    /// The step one position earlier. `Auth` and `Client` have no way back
    /// short of logging out.
    pub fn previous(self) -> Option<Step> {
        match self {
            Step::Auth | Step::Client => None,
            Step::Details => Some(Step::Client),
            Step::Goods => Some(Step::Details),
            Step::Confirm => Some(Step::Goods),
        }
    }
}

/// The four lookup lists an order needs one selection from each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Paybox,
    Organization,
    Warehouse,
    PriceType,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::Paybox,
        ReferenceKind::Organization,
        ReferenceKind::Warehouse,
        ReferenceKind::PriceType,
    ];

    /// Collection path under the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            ReferenceKind::Paybox => "payboxes/",
            ReferenceKind::Organization => "organizations/",
            ReferenceKind::Warehouse => "warehouses/",
            ReferenceKind::PriceType => "price_types/",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReferenceKind::Paybox => "Account",
            ReferenceKind::Organization => "Organization",
            ReferenceKind::Warehouse => "Warehouse",
            ReferenceKind::PriceType => "Price type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub id: i64,
    pub name: String,
}

/// A customer ("contragent") record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub card_id: Option<i64>,
    #[serde(default)]
    pub loyalty_card_id: Option<i64>,
}

/// A catalog item ("nomenclature") as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub unit: Option<i64>,
}

/// One cart line, serialized exactly as a `goods` element of a sale document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "nomenclature")]
    pub item_id: i64,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: f64,
    pub quantity: u32,
    pub unit: i64,
    pub discount: f64,
    #[serde(rename = "sum_discounted")]
    pub discounted_sum: f64,
}

impl CartLine {
    pub fn from_item(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            unit_price: item.price.unwrap_or(0.0),
            quantity: 1,
            unit: item.unit.unwrap_or(DEFAULT_UNIT),
            discount: 0.0,
            discounted_sum: 0.0,
        }
    }

    pub fn amount(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Who the order is for: a resolved record, or an explicit "no customer".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerChoice {
    Customer(Customer),
    Skipped,
}

impl CustomerChoice {
    pub fn customer(&self) -> Option<&Customer> {
        match self {
            CustomerChoice::Customer(c) => Some(c),
            CustomerChoice::Skipped => None,
        }
    }
}

/// Selected reference ids, one per [`ReferenceKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    pub paybox: Option<i64>,
    pub organization: Option<i64>,
    pub warehouse: Option<i64>,
    pub price_type: Option<i64>,
}

impl Selections {
    pub fn get(&self, kind: ReferenceKind) -> Option<i64> {
        match kind {
            ReferenceKind::Paybox => self.paybox,
            ReferenceKind::Organization => self.organization,
            ReferenceKind::Warehouse => self.warehouse,
            ReferenceKind::PriceType => self.price_type,
        }
    }

    pub fn set(&mut self, kind: ReferenceKind, id: Option<i64>) {
        let slot = match kind {
            ReferenceKind::Paybox => &mut self.paybox,
            ReferenceKind::Organization => &mut self.organization,
            ReferenceKind::Warehouse => &mut self.warehouse,
            ReferenceKind::PriceType => &mut self.price_type,
        };
        *slot = id;
    }

    pub fn missing(&self) -> Vec<ReferenceKind> {
        ReferenceKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Reference lists fetched for the current wizard session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub payboxes: Vec<ReferenceEntity>,
    pub organizations: Vec<ReferenceEntity>,
    pub warehouses: Vec<ReferenceEntity>,
    pub price_types: Vec<ReferenceEntity>,
}

impl References {
    pub fn get(&self, kind: ReferenceKind) -> &[ReferenceEntity] {
        match kind {
            ReferenceKind::Paybox => &self.payboxes,
            ReferenceKind::Organization => &self.organizations,
            ReferenceKind::Warehouse => &self.warehouses,
            ReferenceKind::PriceType => &self.price_types,
        }
    }

    pub fn set(&mut self, kind: ReferenceKind, list: Vec<ReferenceEntity>) {
        match kind {
            ReferenceKind::Paybox => self.payboxes = list,
            ReferenceKind::Organization => self.organizations = list,
            ReferenceKind::Warehouse => self.warehouses = list,
            ReferenceKind::PriceType => self.price_types = list,
        }
    }

    pub fn name_of(&self, kind: ReferenceKind, id: i64) -> Option<&str> {
        self.get(kind)
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }
}

/// `contragent` value for an order placed without a customer.
pub const NO_CUSTOMER: i64 = -1;

/// Body of one `docs_sales` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub priority: i64,
    pub dated: i64,
    pub operation: String,
    pub tax_included: bool,
    pub tax_active: bool,
    pub goods: Vec<CartLine>,
    pub settings: serde_json::Map<String, serde_json::Value>,
    // Field name follows the API's spelling.
    #[serde(rename = "loyality_card_id", skip_serializing_if = "Option::is_none")]
    pub loyalty_card_id: Option<i64>,
    pub warehouse: i64,
    /// Customer id, or [`NO_CUSTOMER`] when the order has none.
    pub contragent: i64,
    pub paybox: i64,
    pub organization: i64,
    pub status: bool,
    pub paid_rubles: f64,
    pub paid_lt: f64,
}

/// Long-running operations the UI shows a busy indicator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Authenticate,
    LookupCustomer,
    LoadReferences,
    Search,
    Submit,
    CreateProduct,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Authenticate => "checking token",
            Action::LookupCustomer => "looking up customer",
            Action::LoadReferences => "loading references",
            Action::Search => "searching catalog",
            Action::Submit => "submitting order",
            Action::CreateProduct => "publishing product",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Read-only view of the wizard handed to presentation layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WizardSnapshot {
    pub step: Step,
    pub customer: Option<CustomerChoice>,
    pub selections: Selections,
    pub references: References,
    pub catalog: Vec<CatalogItem>,
    pub search_query: String,
    pub cart: Vec<CartLine>,
    pub total: f64,
}

impl WizardSnapshot {
    pub fn quantity_of(&self, item_id: i64) -> Option<u32> {
        self.cart
            .iter()
            .find(|l| l.item_id == item_id)
            .map(|l| l.quantity)
    }
}

/// Events emitted by the controller task and consumed by UI layers.
#[derive(Debug, Clone)]
pub enum WizardEvent {
    // Boxed to keep the event small; the snapshot carries whole lists.
    Snapshot(Box<WizardSnapshot>),
    Busy { action: Action, busy: bool },
    Notice(Notice),
    /// The product form's draft was accepted by the API.
    ProductPublished,
}
