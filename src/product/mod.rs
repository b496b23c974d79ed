//! Marketplace product creation.
//!
//! A [`ProductDraft`] is the body of one `nomenclature` document. Documents
//! loaded from disk are merged over [`ProductDraft::default`], so a file only
//! needs the fields it wants to change.

mod form;
mod tags;

pub use form::{ProductForm, ProductTab};
pub use tags::{add_tags, remove_tag, TagInput};

use crate::api::RequestError;
use crate::model::DEFAULT_UNIT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CATEGORY: i64 = 2477;
pub const DEFAULT_GLOBAL_CATEGORY: i64 = 127;
pub const DEFAULT_CHATTING_PERCENT: f64 = 4.0;
pub const DEFAULT_ADDRESS: &str =
    "улица Зайцева 8, Ново-Татарская слобода, Казань, TT, Россия, 420108";
pub const DEFAULT_LATITUDE: f64 = 55.7711953;
pub const DEFAULT_LONGITUDE: f64 = 49.10211794999999;

const MIN_NAME_CHARS: usize = 3;
const MAX_SHORT_DESCRIPTION_CHARS: usize = 255;
const MIN_ADDRESS_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description_short: String,
    pub description_long: String,
    pub code: String,
    pub unit: i64,
    pub category: i64,
    pub cashback_type: String,
    pub seo_title: String,
    pub seo_description: String,
    pub seo_keywords: Vec<String>,
    pub global_category_id: i64,
    pub marketplace_price: f64,
    pub chatting_percent: f64,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for ProductDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "product".into(),
            description_short: String::new(),
            description_long: String::new(),
            code: String::new(),
            unit: DEFAULT_UNIT,
            category: DEFAULT_CATEGORY,
            cashback_type: "lcard_cashback".into(),
            seo_title: String::new(),
            seo_description: String::new(),
            seo_keywords: Vec::new(),
            global_category_id: DEFAULT_GLOBAL_CATEGORY,
            marketplace_price: 0.0,
            chatting_percent: DEFAULT_CHATTING_PERCENT,
            address: DEFAULT_ADDRESS.into(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
        }
    }
}

/// Field names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProductField {
    Name,
    DescriptionShort,
    DescriptionLong,
    Code,
    Unit,
    Category,
    SeoTitle,
    SeoDescription,
    SeoKeywords,
    GlobalCategory,
    MarketplacePrice,
    ChattingPercent,
    Address,
    Latitude,
    Longitude,
}

impl ProductField {
    pub fn wire_name(self) -> &'static str {
        match self {
            ProductField::Name => "name",
            ProductField::DescriptionShort => "description_short",
            ProductField::DescriptionLong => "description_long",
            ProductField::Code => "code",
            ProductField::Unit => "unit",
            ProductField::Category => "category",
            ProductField::SeoTitle => "seo_title",
            ProductField::SeoDescription => "seo_description",
            ProductField::SeoKeywords => "seo_keywords",
            ProductField::GlobalCategory => "global_category_id",
            ProductField::MarketplacePrice => "marketplace_price",
            ProductField::ChattingPercent => "chatting_percent",
            ProductField::Address => "address",
            ProductField::Latitude => "latitude",
            ProductField::Longitude => "longitude",
        }
    }

    /// The field's value as editable text. Keywords are joined with commas.
    pub fn text(self, d: &ProductDraft) -> String {
        match self {
            ProductField::Name => d.name.clone(),
            ProductField::DescriptionShort => d.description_short.clone(),
            ProductField::DescriptionLong => d.description_long.clone(),
            ProductField::Code => d.code.clone(),
            ProductField::Unit => d.unit.to_string(),
            ProductField::Category => d.category.to_string(),
            ProductField::SeoTitle => d.seo_title.clone(),
            ProductField::SeoDescription => d.seo_description.clone(),
            ProductField::SeoKeywords => d.seo_keywords.join(", "),
            ProductField::GlobalCategory => d.global_category_id.to_string(),
            ProductField::MarketplacePrice => d.marketplace_price.to_string(),
            ProductField::ChattingPercent => d.chatting_percent.to_string(),
            ProductField::Address => d.address.clone(),
            ProductField::Latitude => d.latitude.to_string(),
            ProductField::Longitude => d.longitude.to_string(),
        }
    }

    /// Store `text` into the field. Numeric fields keep their old value when
    /// the text does not parse.
    pub fn set_text(self, d: &mut ProductDraft, text: &str) -> Result<(), FieldError> {
        let number = |raw: &str| -> Result<f64, FieldError> {
            raw.trim().replace(',', ".").parse().map_err(|_| FieldError {
                field: self,
                message: "must be a number".into(),
            })
        };
        let integer = |raw: &str| -> Result<i64, FieldError> {
            raw.trim().parse().map_err(|_| FieldError {
                field: self,
                message: "must be a whole number".into(),
            })
        };
        match self {
            ProductField::Name => d.name = text.to_string(),
            ProductField::DescriptionShort => d.description_short = text.to_string(),
            ProductField::DescriptionLong => d.description_long = text.to_string(),
            ProductField::Code => d.code = text.to_string(),
            ProductField::Unit => d.unit = integer(text)?,
            ProductField::Category => d.category = integer(text)?,
            ProductField::SeoTitle => d.seo_title = text.to_string(),
            ProductField::SeoDescription => d.seo_description = text.to_string(),
            ProductField::SeoKeywords => {
                d.seo_keywords.clear();
                add_tags(&mut d.seo_keywords, text);
            }
            ProductField::GlobalCategory => d.global_category_id = integer(text)?,
            ProductField::MarketplacePrice => d.marketplace_price = number(text)?,
            ProductField::ChattingPercent => d.chatting_percent = number(text)?,
            ProductField::Address => d.address = text.to_string(),
            ProductField::Latitude => d.latitude = number(text)?,
            ProductField::Longitude => d.longitude = number(text)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: ProductField,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.wire_name(), self.message)
    }
}

/// Every rule a draft broke, in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = ProductField> + '_ {
        self.0.iter().map(|e| e.field)
    }

    pub fn on_tab(&self, tab: ProductTab) -> impl Iterator<Item = &FieldError> + '_ {
        self.0.iter().filter(move |e| ProductTab::of(e.field) == tab)
    }

    fn push(&mut self, field: ProductField, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("invalid product: {0}")]
    Invalid(ValidationErrors),
    #[error("enter a product name of at least {MIN_NAME_CHARS} characters first")]
    NameTooShort,
    #[error("publishing product failed: {0}")]
    Remote(#[from] RequestError),
}

/// Marketplace fee split for a price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub commission: f64,
    pub payout: f64,
}

impl ProductDraft {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::default();

        if self.name.trim().chars().count() < MIN_NAME_CHARS {
            errs.push(
                ProductField::Name,
                format!("must be at least {MIN_NAME_CHARS} characters"),
            );
        }
        if self.description_short.chars().count() > MAX_SHORT_DESCRIPTION_CHARS {
            errs.push(
                ProductField::DescriptionShort,
                format!("must be at most {MAX_SHORT_DESCRIPTION_CHARS} characters"),
            );
        }
        if self.code.trim().is_empty() {
            errs.push(ProductField::Code, "is required");
        }
        if self.unit < 1 {
            errs.push(ProductField::Unit, "choose a unit");
        }
        if self.category < 1 {
            errs.push(ProductField::Category, "choose a category");
        }
        if self.global_category_id < 1 {
            errs.push(ProductField::GlobalCategory, "choose a global category");
        }
        if self.marketplace_price < 0.0 || self.marketplace_price.is_nan() {
            errs.push(ProductField::MarketplacePrice, "must not be negative");
        }
        if !(0.0..=100.0).contains(&self.chatting_percent) {
            errs.push(ProductField::ChattingPercent, "must be between 0 and 100");
        }
        if self.address.trim().chars().count() < MIN_ADDRESS_CHARS {
            errs.push(ProductField::Address, "enter the full address");
        }
        if !self.latitude.is_finite() {
            errs.push(ProductField::Latitude, "must be a number");
        }
        if !self.longitude.is_finite() {
            errs.push(ProductField::Longitude, "must be a number");
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    pub fn pricing(&self) -> Pricing {
        let commission = self.marketplace_price * self.chatting_percent / 100.0;
        Pricing {
            commission,
            payout: self.marketplace_price - commission,
        }
    }

    /// Load a draft from a `.toml` or JSON file, merged over the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))
        } else {
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
        }
    }
}
