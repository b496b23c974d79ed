use super::{decode_list, normalize_phone, CatalogApi, RequestError};
use crate::model::{CatalogItem, Customer, OrderPayload, ReferenceEntity, ReferenceKind};
use crate::product::ProductDraft;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// reqwest-backed [`CatalogApi`] implementation.
#[derive(Clone)]
pub struct TableCrmClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TableCrmClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Option<Duration>) -> Result<Self> {
        // A trailing slash makes `Url::join` append to the last segment instead of replacing it.
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("invalid API base URL: {base_url}"))?;

        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str, token: &str) -> Result<Url, RequestError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, RequestError> {
        tracing::debug!(path = url.path(), "GET");
        let resp = self.http.get(url).send().await?;
        let body = read_success(resp).await?;
        decode_list(&body)
    }

    async fn post_batch<T: Serialize + ?Sized>(
        &self,
        url: Url,
        document: &T,
    ) -> Result<serde_json::Value, RequestError> {
        tracing::debug!(path = url.path(), "POST");
        // The API takes a batch; we always send exactly one document.
        let resp = self.http.post(url).json(&[document]).send().await?;
        let body = read_success(resp).await?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

async fn read_success(resp: reqwest::Response) -> Result<String, RequestError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "API request rejected");
        return Err(RequestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl CatalogApi for TableCrmClient {
    async fn list_references(
        &self,
        token: &str,
        kind: ReferenceKind,
    ) -> Result<Vec<ReferenceEntity>, RequestError> {
        let url = self.endpoint(kind.path(), token)?;
        self.get_list(url).await
    }

    async fn find_customers_by_phone(
        &self,
        token: &str,
        phone: &str,
    ) -> Result<Vec<Customer>, RequestError> {
        let mut url = self.endpoint("contragents/", token)?;
        url.query_pairs_mut()
            .append_pair("phone", &normalize_phone(phone));
        self.get_list(url).await
    }

    async fn search_catalog(
        &self,
        token: &str,
        query: Option<&str>,
    ) -> Result<Vec<CatalogItem>, RequestError> {
        let mut url = self.endpoint("nomenclature/", token)?;
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            url.query_pairs_mut().append_pair("search", q);
        }
        self.get_list(url).await
    }

    async fn create_order(
        &self,
        token: &str,
        order: &OrderPayload,
        finalize: bool,
    ) -> Result<serde_json::Value, RequestError> {
        let url = self.endpoint("docs_sales/", token)?;
        let document = OrderPayload {
            status: finalize,
            ..order.clone()
        };
        self.post_batch(url, &document).await
    }

    async fn create_product(
        &self,
        token: &str,
        product: &ProductDraft,
    ) -> Result<serde_json::Value, RequestError> {
        let url = self.endpoint("nomenclature/", token)?;
        self.post_batch(url, product).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    async fn spawn_api(seen: Seen) -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let list_seen = seen.clone();
        let post_seen = seen.clone();
        let app = Router::new()
            .route(
                "/api/v1/:collection/",
                get(
                    move |Path(collection): Path<String>,
                          Query(q): Query<HashMap<String, String>>| {
                        let seen = list_seen.clone();
                        async move {
                            seen.lock().unwrap().push((collection.clone(), q.clone()));
                            if q.get("token").map(String::as_str) != Some("good") {
                                return (StatusCode::UNAUTHORIZED, "invalid token".to_string());
                            }
                            let body = match collection.as_str() {
                                "warehouses" => r#"{"results":[{"id":1,"name":"Main"}]}"#,
                                "contragents" => {
                                    r#"[{"id":9,"name":"Ivan","phone":"79990001112","loyalty_card_id":44}]"#
                                }
                                "nomenclature" => r#"[{"id":7,"name":"Widget","price":150}]"#,
                                _ => "[]",
                            };
                            (StatusCode::OK, body.to_string())
                        }
                    },
                )
                .post(
                    move |Path(collection): Path<String>,
                          Query(q): Query<HashMap<String, String>>,
                          Json(body): Json<serde_json::Value>| {
                        let seen = post_seen.clone();
                        async move {
                            let mut q = q;
                            q.insert("body".into(), body.to_string());
                            seen.lock().unwrap().push((collection, q));
                            Json(serde_json::json!([{"id": 100}]))
                        }
                    },
                ),
            );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/api/v1")
    }

    fn client(base: &str) -> TableCrmClient {
        TableCrmClient::new(base, "tablecrm-order-test", None).expect("client")
    }

    #[test]
    fn endpoint_keeps_base_path_and_token() {
        let c = client("https://app.tablecrm.com/api/v1");
        let url = c.endpoint("warehouses/", "abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.tablecrm.com/api/v1/warehouses/?token=abc"
        );
    }

    #[tokio::test]
    async fn lists_references_from_results_envelope() {
        let seen = Seen::default();
        let base = spawn_api(seen.clone()).await;
        let list = client(&base)
            .list_references("good", ReferenceKind::Warehouse)
            .await
            .expect("list");
        assert_eq!(list, vec![ReferenceEntity { id: 1, name: "Main".into() }]);
    }

    #[tokio::test]
    async fn bad_token_surfaces_status_and_body() {
        let base = spawn_api(Seen::default()).await;
        let err = client(&base).validate_credential("bad").await.unwrap_err();
        match err {
            RequestError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn customer_lookup_sends_digits_only() {
        let seen = Seen::default();
        let base = spawn_api(seen.clone()).await;
        let found = client(&base)
            .find_customers_by_phone("good", "+7 (999) 000-11-12")
            .await
            .expect("lookup");
        assert_eq!(found[0].loyalty_card_id, Some(44));
        let calls = seen.lock().unwrap();
        assert_eq!(calls[0].0, "contragents");
        assert_eq!(calls[0].1.get("phone").map(String::as_str), Some("79990001112"));
    }

    #[tokio::test]
    async fn empty_search_query_is_not_sent() {
        let seen = Seen::default();
        let base = spawn_api(seen.clone()).await;
        let c = client(&base);
        c.search_catalog("good", Some("  ")).await.expect("search");
        c.search_catalog("good", Some("wid")).await.expect("search");
        let calls = seen.lock().unwrap();
        assert!(!calls[0].1.contains_key("search"));
        assert_eq!(calls[1].1.get("search").map(String::as_str), Some("wid"));
    }

    #[tokio::test]
    async fn create_order_posts_single_document_with_finalize_flag() {
        let seen = Seen::default();
        let base = spawn_api(seen.clone()).await;
        let order = OrderPayload {
            priority: 0,
            dated: 1,
            operation: "Заказ".into(),
            tax_included: true,
            tax_active: true,
            goods: Vec::new(),
            settings: serde_json::Map::new(),
            loyalty_card_id: None,
            warehouse: 1,
            contragent: 9,
            paybox: 2,
            organization: 3,
            status: false,
            paid_rubles: 0.0,
            paid_lt: 0.0,
        };
        let resp = client(&base)
            .create_order("good", &order, true)
            .await
            .expect("create");
        assert_eq!(resp[0]["id"], 100);

        let calls = seen.lock().unwrap();
        let (collection, q) = &calls[0];
        assert_eq!(collection, "docs_sales");
        let body: serde_json::Value = serde_json::from_str(&q["body"]).unwrap();
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["status"], true);
        assert_eq!(body[0]["contragent"], 9);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on localhost is not expected to be listening.
        let err = client("http://127.0.0.1:9/api/v1")
            .validate_credential("good")
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
