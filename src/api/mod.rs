//! Remote catalog client for the TableCRM REST API.
//!
//! Every call is a single request/response with the access token passed as a
//! query parameter. Nothing is retried; callers decide how to surface failures.

mod client;
mod error;

pub use client::TableCrmClient;
pub use error::RequestError;

use crate::model::{CatalogItem, Customer, OrderPayload, ReferenceEntity, ReferenceKind};
use crate::product::ProductDraft;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Operations the order wizard and product form need from the backend.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_references(
        &self,
        token: &str,
        kind: ReferenceKind,
    ) -> Result<Vec<ReferenceEntity>, RequestError>;

    /// `phone` is sent digits-only regardless of how it was typed.
    async fn find_customers_by_phone(
        &self,
        token: &str,
        phone: &str,
    ) -> Result<Vec<Customer>, RequestError>;

    async fn search_catalog(
        &self,
        token: &str,
        query: Option<&str>,
    ) -> Result<Vec<CatalogItem>, RequestError>;

    async fn create_order(
        &self,
        token: &str,
        order: &OrderPayload,
        finalize: bool,
    ) -> Result<serde_json::Value, RequestError>;

    async fn create_product(
        &self,
        token: &str,
        product: &ProductDraft,
    ) -> Result<serde_json::Value, RequestError>;

    /// A token is valid iff the warehouse list can be read with it.
    async fn validate_credential(&self, token: &str) -> Result<(), RequestError> {
        self.list_references(token, ReferenceKind::Warehouse)
            .await
            .map(|_| ())
    }
}

/// Strip everything but ASCII digits from a phone number.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    List(Vec<T>),
    Paged {
        #[serde(default = "Vec::new")]
        results: Vec<T>,
    },
}

/// Decode a list response that may be a bare array or `{"results": [...]}`.
pub(crate) fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, RequestError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    Ok(match envelope {
        Envelope::List(items) => items,
        Envelope::Paged { results } => results,
    })
}
