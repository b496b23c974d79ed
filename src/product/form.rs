use super::{ProductDraft, ProductError, ProductField, TagInput};
use crate::api::CatalogApi;
use rand::Rng;

/// Form sections, in the order `next` walks them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductTab {
    #[default]
    Basic,
    Content,
    Pricing,
    Logistics,
}

impl ProductTab {
    pub const ALL: [ProductTab; 4] = [
        ProductTab::Basic,
        ProductTab::Content,
        ProductTab::Pricing,
        ProductTab::Logistics,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProductTab::Basic => "Basic",
            ProductTab::Content => "Content",
            ProductTab::Pricing => "Pricing",
            ProductTab::Logistics => "Location",
        }
    }

    pub fn fields(self) -> &'static [ProductField] {
        match self {
            ProductTab::Basic => &[
                ProductField::Name,
                ProductField::Code,
                ProductField::Unit,
                ProductField::Category,
                ProductField::GlobalCategory,
            ],
            ProductTab::Content => &[
                ProductField::DescriptionShort,
                ProductField::DescriptionLong,
                ProductField::SeoTitle,
                ProductField::SeoDescription,
                ProductField::SeoKeywords,
            ],
            ProductTab::Pricing => &[ProductField::MarketplacePrice, ProductField::ChattingPercent],
            ProductTab::Logistics => &[
                ProductField::Address,
                ProductField::Latitude,
                ProductField::Longitude,
            ],
        }
    }

    pub fn of(field: ProductField) -> ProductTab {
        Self::ALL
            .into_iter()
            .find(|t| t.fields().contains(&field))
            .unwrap_or_default()
    }

    fn next(self) -> Option<ProductTab> {
        let i = Self::ALL.iter().position(|t| *t == self)?;
        Self::ALL.get(i + 1).copied()
    }

    pub fn previous(self) -> Option<ProductTab> {
        let i = Self::ALL.iter().position(|t| *t == self)?;
        i.checked_sub(1).map(|i| Self::ALL[i])
    }
}

/// Product creation form: a draft plus the tab the user is on.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub draft: ProductDraft,
    pub keywords: TagInput,
    tab: ProductTab,
}

impl ProductForm {
    pub fn new(draft: ProductDraft) -> Self {
        Self {
            draft,
            ..Default::default()
        }
    }

    pub fn tab(&self) -> ProductTab {
        self.tab
    }

    /// Advance one tab; stays put on the last one.
    pub fn next_tab(&mut self) -> ProductTab {
        if let Some(next) = self.tab.next() {
            self.tab = next;
        }
        self.tab
    }

    pub fn set_tab(&mut self, tab: ProductTab) {
        self.tab = tab;
    }

    /// Fill descriptions, SEO fields and an article code from the name.
    pub fn autofill(&mut self) -> Result<(), ProductError> {
        self.autofill_with(&mut rand::thread_rng())
    }

    pub fn autofill_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), ProductError> {
        let name = self.draft.name.trim().to_string();
        if name.chars().count() < super::MIN_NAME_CHARS {
            return Err(ProductError::NameTooShort);
        }
        let d = &mut self.draft;
        d.description_short =
            format!("Отличный выбор: {name}. Высокое качество, стильный дизайн и надёжность.");
        d.description_long = format!(
            "Подробное описание товара «{name}». Идеально подходит для повседневного \
             использования. Изготовлено из экологичных материалов."
        );
        d.seo_title = format!("Купить {name} с доставкой | Лучшая цена");
        d.seo_keywords = vec![
            name.to_lowercase(),
            "купить".into(),
            "доставка".into(),
            "скидка".into(),
            "оригинал".into(),
        ];
        d.code = format!("ART-{}", rng.gen_range(0..100_000));
        Ok(())
    }

    /// Validate the draft. On failure the form jumps to the first tab with an
    /// invalid field.
    pub fn prepare(&mut self) -> Result<(), ProductError> {
        if let Err(errs) = self.draft.validate() {
            if let Some(field) = errs.fields().next() {
                self.tab = ProductTab::of(field);
            }
            return Err(ProductError::Invalid(errs));
        }
        Ok(())
    }

    /// Start over from defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Validate and publish; on success the form starts over.
    pub async fn submit<A: CatalogApi + ?Sized>(
        &mut self,
        api: &A,
        token: &str,
    ) -> Result<serde_json::Value, ProductError> {
        self.prepare()?;
        let created = api.create_product(token, &self.draft).await?;
        tracing::info!(name = %self.draft.name, code = %self.draft.code, "product published");
        self.reset();
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestError;
    use crate::model::{CatalogItem, Customer, OrderPayload, ReferenceEntity, ReferenceKind};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<ProductDraft>>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogApi for Recorder {
        async fn list_references(
            &self,
            _: &str,
            _: ReferenceKind,
        ) -> Result<Vec<ReferenceEntity>, RequestError> {
            Ok(Vec::new())
        }
        async fn find_customers_by_phone(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<Customer>, RequestError> {
            Ok(Vec::new())
        }
        async fn search_catalog(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<Vec<CatalogItem>, RequestError> {
            Ok(Vec::new())
        }
        async fn create_order(
            &self,
            _: &str,
            _: &OrderPayload,
            _: bool,
        ) -> Result<serde_json::Value, RequestError> {
            Ok(serde_json::Value::Null)
        }
        async fn create_product(
            &self,
            _: &str,
            product: &ProductDraft,
        ) -> Result<serde_json::Value, RequestError> {
            if self.fail {
                return Err(RequestError::Status {
                    status: 422,
                    body: "bad".into(),
                });
            }
            self.posted.lock().unwrap().push(product.clone());
            Ok(serde_json::json!([{"id": 1}]))
        }
    }

    #[test]
    fn next_tab_stops_at_logistics() {
        let mut form = ProductForm::default();
        assert_eq!(form.next_tab(), ProductTab::Content);
        assert_eq!(form.next_tab(), ProductTab::Pricing);
        assert_eq!(form.next_tab(), ProductTab::Logistics);
        assert_eq!(form.next_tab(), ProductTab::Logistics);
    }

    #[test]
    fn previous_tab_stops_at_basic() {
        assert_eq!(ProductTab::Pricing.previous(), Some(ProductTab::Content));
        assert_eq!(ProductTab::Basic.previous(), None);
    }

    #[test]
    fn every_field_belongs_to_one_tab() {
        let mut seen = Vec::new();
        for tab in ProductTab::ALL {
            for f in tab.fields() {
                assert!(!seen.contains(f), "{f:?} listed twice");
                seen.push(*f);
            }
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn autofill_requires_a_name() {
        let mut form = ProductForm::default();
        form.draft.name = "ab".into();
        assert!(matches!(form.autofill(), Err(ProductError::NameTooShort)));
        assert!(form.draft.code.is_empty());
    }

    #[test]
    fn autofill_fills_content_and_code() {
        let mut form = ProductForm::default();
        form.draft.name = "Зелёный Чай".into();
        form.autofill_with(&mut StdRng::seed_from_u64(7)).unwrap();

        let d = &form.draft;
        assert_eq!(d.seo_title, "Купить Зелёный Чай с доставкой | Лучшая цена");
        assert_eq!(d.seo_keywords[0], "зелёный чай");
        assert_eq!(d.seo_keywords.len(), 5);
        assert!(d.description_short.contains("Зелёный Чай"));
        let n: u32 = d.code.strip_prefix("ART-").unwrap().parse().unwrap();
        assert!(n < 100_000);
        assert!(d.validate().is_ok());
    }

    #[tokio::test]
    async fn invalid_submit_jumps_to_first_bad_tab() {
        let api = Recorder::default();
        let mut form = ProductForm::default();
        form.draft.name = "Lamp".into();
        form.draft.code = "L-1".into();
        form.draft.chatting_percent = 150.0;
        form.set_tab(ProductTab::Logistics);

        let err = form.submit(&api, "t").await.unwrap_err();
        assert!(matches!(err, ProductError::Invalid(_)));
        assert_eq!(form.tab(), ProductTab::Pricing);
        assert!(api.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_submit_resets_form() {
        let api = Recorder::default();
        let mut form = ProductForm::default();
        form.draft.name = "Lamp".into();
        form.draft.code = "L-1".into();
        form.next_tab();

        form.submit(&api, "t").await.unwrap();
        assert_eq!(api.posted.lock().unwrap()[0].name, "Lamp");
        assert_eq!(form.draft, ProductDraft::default());
        assert_eq!(form.tab(), ProductTab::Basic);
    }

    #[tokio::test]
    async fn remote_failure_keeps_the_draft() {
        let api = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut form = ProductForm::default();
        form.draft.name = "Lamp".into();
        form.draft.code = "L-1".into();

        let err = form.submit(&api, "t").await.unwrap_err();
        assert!(matches!(err, ProductError::Remote(_)));
        assert_eq!(form.draft.name, "Lamp");
    }
}
