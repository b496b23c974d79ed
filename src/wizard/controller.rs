//! Order wizard state machine.
//!
//! Steps run `auth → client → details → goods → confirm`. Each transition is
//! guarded; a failed guard or a failed request leaves the draft untouched.
//! Remote failures come back as [`WizardError::Remote`] so the caller can turn
//! them into a notice.
//!
//! Requests are split in two: a transition starts a [`RemoteOp`], the caller runs
//! it wherever it likes and hands the reply to [`WizardController::complete`].
//! At most one op is pending; leaving its step or logging out abandons it.

use super::draft::OrderDraft;
use super::search::{Sequencer, Ticket};
use super::WizardError;
use crate::api::{normalize_phone, CatalogApi, RequestError};
use crate::model::{
    Action, CatalogItem, Customer, CustomerChoice, Notice, OrderPayload, ReferenceKind,
    References, Step, WizardSnapshot,
};
use crate::product::ProductDraft;
use crate::session::Session;
use std::sync::Arc;

/// Fewer digits than this cannot be a phone number worth looking up.
pub const MIN_PHONE_DIGITS: usize = 7;

/// A search the caller should run against the API and hand back through
/// [`WizardController::apply_search`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub ticket: Ticket,
    pub token: String,
    pub query: Option<String>,
}

/// A request the wizard is waiting on. Run it with [`RemoteCall::run`] and
/// hand the reply to [`WizardController::complete`].
#[derive(Debug, Clone)]
pub struct RemoteOp {
    pub ticket: Ticket,
    pub action: Action,
    pub call: RemoteCall,
}

#[derive(Debug, Clone)]
pub enum RemoteCall {
    ValidateToken {
        token: String,
    },
    FindCustomers {
        token: String,
        digits: String,
    },
    LoadReferences {
        token: String,
    },
    CreateOrder {
        token: String,
        payload: OrderPayload,
        finalize: bool,
    },
    CreateProduct {
        token: String,
        product: Box<ProductDraft>,
    },
}

#[derive(Debug)]
pub enum RemoteReply {
    Validated(Result<(), RequestError>),
    Customers(Result<Vec<Customer>, RequestError>),
    References(Result<References, RequestError>),
    Created(Result<serde_json::Value, RequestError>),
    Published(Result<serde_json::Value, RequestError>),
}

impl RemoteCall {
    pub async fn run<A: CatalogApi + ?Sized>(&self, api: &A) -> RemoteReply {
        match self {
            RemoteCall::ValidateToken { token } => {
                RemoteReply::Validated(api.validate_credential(token).await)
            }
            RemoteCall::FindCustomers { token, digits } => {
                RemoteReply::Customers(api.find_customers_by_phone(token, digits).await)
            }
            RemoteCall::LoadReferences { token } => {
                RemoteReply::References(fetch_references(api, token).await)
            }
            RemoteCall::CreateOrder {
                token,
                payload,
                finalize,
            } => RemoteReply::Created(api.create_order(token, payload, *finalize).await),
            RemoteCall::CreateProduct { token, product } => {
                RemoteReply::Published(api.create_product(token, product).await)
            }
        }
    }
}

/// Fetch all four reference lists concurrently; any failure fails the whole load.
pub async fn fetch_references<A: CatalogApi + ?Sized>(
    api: &A,
    token: &str,
) -> Result<References, RequestError> {
    let (payboxes, organizations, warehouses, price_types) = tokio::join!(
        api.list_references(token, ReferenceKind::Paybox),
        api.list_references(token, ReferenceKind::Organization),
        api.list_references(token, ReferenceKind::Warehouse),
        api.list_references(token, ReferenceKind::PriceType),
    );
    Ok(References {
        payboxes: payboxes?,
        organizations: organizations?,
        warehouses: warehouses?,
        price_types: price_types?,
    })
}

pub struct WizardController<A> {
    api: Arc<A>,
    session: Session,
    draft: OrderDraft,
    references: References,
    catalog: Vec<CatalogItem>,
    search_query: String,
    sequencer: Sequencer,
    ops: Sequencer,
    pending: Option<RemoteOp>,
}

impl<A: CatalogApi> WizardController<A> {
    /// Start a wizard. An already initialised session with a token skips `auth`.
    pub fn new(api: Arc<A>, session: Session) -> Self {
        let step = if session.token().is_some() {
            Step::Client
        } else {
            Step::Auth
        };
        Self {
            api,
            session,
            draft: OrderDraft {
                step,
                ..Default::default()
            },
            references: References::default(),
            catalog: Vec::new(),
            search_query: String::new(),
            sequencer: Sequencer::default(),
            ops: Sequencer::default(),
            pending: None,
        }
    }

    pub fn api(&self) -> Arc<A> {
        self.api.clone()
    }

    /// The remote operation still awaited, if any.
    pub fn pending(&self) -> Option<&RemoteOp> {
        self.pending.as_ref()
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            step: self.draft.step,
            customer: self.draft.customer.clone(),
            selections: self.draft.selections.clone(),
            references: self.references.clone(),
            catalog: self.catalog.clone(),
            search_query: self.search_query.clone(),
            cart: self.draft.cart.lines().to_vec(),
            total: self.draft.cart.total(),
        }
    }

    fn token(&self) -> Result<String, WizardError> {
        self.session
            .token()
            .map(str::to_string)
            .ok_or(WizardError::NotAuthenticated)
    }

    /// Leaving a step abandons whatever request was started on it.
    fn set_step(&mut self, step: Step) {
        if self.draft.step != step {
            tracing::info!(from = ?self.draft.step, to = ?step, "wizard step");
            self.draft.step = step;
            self.cancel_pending();
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(op) = self.pending.take() {
            tracing::info!(action = ?op.action, ticket = ?op.ticket, "request abandoned");
            self.ops.invalidate();
        }
    }

    fn require_idle(&self) -> Result<(), WizardError> {
        match &self.pending {
            Some(op) => Err(WizardError::Busy(op.action)),
            None => Ok(()),
        }
    }

    fn start(&mut self, action: Action, call: RemoteCall) -> RemoteOp {
        let op = RemoteOp {
            ticket: self.ops.issue(),
            action,
            call,
        };
        tracing::debug!(?action, ticket = ?op.ticket, "request started");
        self.pending = Some(op.clone());
        op
    }

    /// `auth → client`, once the returned token check succeeds.
    pub fn authenticate(&mut self, input: &str) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Auth)?;
        self.require_idle()?;
        let token = input.trim();
        if token.is_empty() {
            return Err(WizardError::EmptyToken);
        }
        Ok(self.start(
            Action::Authenticate,
            RemoteCall::ValidateToken {
                token: token.to_string(),
            },
        ))
    }

    /// Look a customer up by phone.
    pub fn lookup_customer(&mut self, phone: &str) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Client)?;
        self.require_idle()?;
        let digits = normalize_phone(phone);
        if digits.len() < MIN_PHONE_DIGITS {
            return Err(WizardError::PhoneTooShort {
                min: MIN_PHONE_DIGITS,
            });
        }
        let token = self.token()?;
        Ok(self.start(
            Action::LookupCustomer,
            RemoteCall::FindCustomers { token, digits },
        ))
    }

    /// Forget the found customer, abandoning a lookup still in flight.
    pub fn clear_customer(&mut self) -> Result<(), WizardError> {
        self.draft.require_step(Step::Client)?;
        if self
            .pending
            .as_ref()
            .is_some_and(|op| op.action == Action::LookupCustomer)
        {
            self.cancel_pending();
        }
        self.draft.customer = None;
        Ok(())
    }

    /// `client → details` with the customer found by [`Self::lookup_customer`].
    /// The step changes at once; the returned op loads the reference lists.
    pub fn continue_with_customer(&mut self) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Client)?;
        self.require_idle()?;
        match self.draft.customer {
            Some(CustomerChoice::Customer(_)) => self.enter_details(),
            _ => Err(WizardError::NoCustomer),
        }
    }

    /// `client → details` without a customer.
    pub fn skip_customer(&mut self) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Client)?;
        self.require_idle()?;
        self.draft.customer = Some(CustomerChoice::Skipped);
        self.enter_details()
    }

    fn enter_details(&mut self) -> Result<RemoteOp, WizardError> {
        self.set_step(Step::Details);
        self.load_references()
    }

    /// Reload the four reference lists. They are only replaced when every
    /// fetch succeeded.
    pub fn load_references(&mut self) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Details)?;
        self.require_idle()?;
        let token = self.token()?;
        Ok(self.start(Action::LoadReferences, RemoteCall::LoadReferences { token }))
    }

    /// Apply the reply to a started op. `Ok(None)` means the op was abandoned
    /// or superseded and its reply dropped.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        reply: RemoteReply,
    ) -> Result<Option<Notice>, WizardError> {
        let op = match self.pending.take() {
            Some(op) if op.ticket == ticket && self.ops.is_current(ticket) => op,
            other => {
                self.pending = other;
                tracing::debug!(?ticket, "discarding stale reply");
                return Ok(None);
            }
        };
        let action = op.action;
        let notice = match (op.call, reply) {
            (RemoteCall::ValidateToken { token }, RemoteReply::Validated(result)) => {
                result.map_err(WizardError::remote(action))?;
                self.signed_in(&token)
            }
            (RemoteCall::FindCustomers { digits, .. }, RemoteReply::Customers(result)) => {
                let found = result.map_err(WizardError::remote(action))?;
                self.customer_found(found, &digits)
            }
            (RemoteCall::LoadReferences { .. }, RemoteReply::References(result)) => {
                let loaded = result.map_err(WizardError::remote(action))?;
                self.references_loaded(loaded)
            }
            (
                RemoteCall::CreateOrder {
                    payload, finalize, ..
                },
                RemoteReply::Created(result),
            ) => {
                let response = result.map_err(WizardError::remote(action))?;
                self.order_created(&payload, finalize, &response)
            }
            (RemoteCall::CreateProduct { product, .. }, RemoteReply::Published(result)) => {
                let response = result.map_err(WizardError::remote(action))?;
                tracing::info!(
                    name = %product.name,
                    code = %product.code,
                    %response,
                    "product published"
                );
                Notice::success(format!("Product published: {}", product.name))
            }
            _ => {
                tracing::warn!(?action, "reply does not match its request");
                return Ok(None);
            }
        };
        Ok(Some(notice))
    }

    fn signed_in(&mut self, token: &str) -> Notice {
        let persisted = self.session.store(token);
        self.set_step(Step::Client);
        match persisted {
            Ok(()) => Notice::success("Signed in"),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not persist token");
                Notice::warning(format!("Signed in, but the token was not saved: {e:#}"))
            }
        }
    }

    // An empty result is "not found", not an error; it clears any previously found customer.
    fn customer_found(&mut self, found: Vec<Customer>, digits: &str) -> Notice {
        match found.into_iter().next() {
            Some(customer) => {
                let notice = Notice::success(format!("Customer found: {}", customer.name));
                self.draft.customer = Some(CustomerChoice::Customer(customer));
                notice
            }
            None => {
                self.draft.customer = None;
                Notice::warning(format!("No customer found for {digits}"))
            }
        }
    }

    fn references_loaded(&mut self, loaded: References) -> Notice {
        for kind in ReferenceKind::ALL {
            self.draft.apply_default(kind, loaded.get(kind));
        }
        self.references = loaded;
        tracing::debug!(selections = ?self.draft.selections, "references loaded");
        Notice::info("References loaded")
    }

    pub fn select_reference(&mut self, kind: ReferenceKind, id: i64) -> Result<(), WizardError> {
        self.draft.require_step(Step::Details)?;
        if self.references.name_of(kind, id).is_none() {
            return Err(WizardError::UnknownReference { kind, id });
        }
        self.draft.selections.set(kind, Some(id));
        Ok(())
    }

    /// `details → goods`. Returns the initial unfiltered search to run.
    pub fn proceed_to_goods(&mut self) -> Result<SearchRequest, WizardError> {
        self.draft.require_step(Step::Details)?;
        self.draft.require_selections()?;
        self.set_step(Step::Goods);
        self.search_query.clear();
        self.issue_search(String::new())
    }

    /// Record the search text as typed. The search itself is issued separately
    /// once the input settles.
    pub fn set_search_query(&mut self, query: String) -> Result<(), WizardError> {
        self.draft.require_step(Step::Goods)?;
        self.search_query = query;
        Ok(())
    }

    /// Issue a catalog search, superseding any search still in flight.
    pub fn issue_search(&mut self, query: String) -> Result<SearchRequest, WizardError> {
        self.draft.require_step(Step::Goods)?;
        let token = self.token()?;
        let ticket = self.sequencer.issue();
        let query = Some(query).filter(|q| !q.trim().is_empty());
        tracing::debug!(?ticket, ?query, "catalog search issued");
        Ok(SearchRequest {
            ticket,
            token,
            query,
        })
    }

    /// Apply a search response. Returns `Ok(false)` when the response was
    /// superseded and dropped.
    pub fn apply_search(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<CatalogItem>, RequestError>,
    ) -> Result<bool, WizardError> {
        if !self.sequencer.is_current(ticket) || self.draft.step != Step::Goods {
            tracing::debug!(?ticket, "discarding stale catalog search");
            return Ok(false);
        }
        self.catalog = result.map_err(WizardError::remote(Action::Search))?;
        Ok(true)
    }

    // The cart is frozen while an order built from it is being submitted.
    fn require_cart_step(&self) -> Result<(), WizardError> {
        match self.draft.step {
            Step::Goods | Step::Confirm => self.require_idle(),
            actual => Err(WizardError::WrongStep {
                expected: Step::Goods,
                actual,
            }),
        }
    }

    /// Add one unit of a listed catalog item. Returns the line's new quantity.
    pub fn add_to_cart(&mut self, item_id: i64) -> Result<u32, WizardError> {
        self.require_cart_step()?;
        let item = self
            .catalog
            .iter()
            .find(|i| i.id == item_id)
            .ok_or(WizardError::UnknownItem(item_id))?;
        Ok(self.draft.cart.add(item))
    }

    pub fn adjust_quantity(&mut self, item_id: i64, delta: i64) -> Result<Option<u32>, WizardError> {
        self.require_cart_step()?;
        let qty = self.draft.cart.adjust(item_id, delta);
        self.fall_back_if_cart_empty();
        Ok(qty)
    }

    pub fn remove_from_cart(&mut self, item_id: i64) -> Result<bool, WizardError> {
        self.require_cart_step()?;
        let removed = self.draft.cart.remove(item_id);
        self.fall_back_if_cart_empty();
        Ok(removed)
    }

    // `confirm` is only reachable with a non-empty cart; emptying it there steps back.
    fn fall_back_if_cart_empty(&mut self) {
        if self.draft.step == Step::Confirm && self.draft.cart.is_empty() {
            self.set_step(Step::Goods);
        }
    }

    /// `goods → confirm`.
    pub fn proceed_to_confirm(&mut self) -> Result<(), WizardError> {
        self.draft.require_step(Step::Goods)?;
        self.draft.require_selections()?;
        self.draft.require_cart()?;
        self.set_step(Step::Confirm);
        Ok(())
    }

    /// Step back one state, keeping the draft. A request started on the step
    /// being left is abandoned.
    pub fn back(&mut self) -> Result<Step, WizardError> {
        let prev = self.draft.step.previous().ok_or(WizardError::WrongStep {
            expected: Step::Details,
            actual: self.draft.step,
        })?;
        if self.draft.step == Step::Goods {
            // Late search responses must not land after leaving the step.
            self.sequencer.invalidate();
        }
        self.set_step(prev);
        Ok(prev)
    }

    /// Submit the draft. On success the cart is cleared and the wizard returns
    /// to `client` with the reference selections kept.
    pub fn submit(&mut self, finalize: bool) -> Result<RemoteOp, WizardError> {
        self.draft.require_step(Step::Confirm)?;
        self.require_idle()?;
        let token = self.token()?;
        let dated = time::OffsetDateTime::now_utc().unix_timestamp();
        let payload = self.draft.build_payload(dated, finalize)?;
        Ok(self.start(
            Action::Submit,
            RemoteCall::CreateOrder {
                token,
                payload,
                finalize,
            },
        ))
    }

    fn order_created(
        &mut self,
        payload: &OrderPayload,
        finalize: bool,
        response: &serde_json::Value,
    ) -> Notice {
        tracing::info!(
            finalize,
            lines = payload.goods.len(),
            total = payload.paid_rubles,
            %response,
            "order created"
        );
        self.draft.reset_for_next_order();
        self.catalog.clear();
        self.search_query.clear();
        self.sequencer.invalidate();
        Notice::success(if finalize {
            "Order created and posted"
        } else {
            "Order created"
        })
    }

    /// Publish a product from the product form. It does not depend on the
    /// wizard step, only on being signed in; the caller validates the draft.
    pub fn publish_product(&mut self, product: ProductDraft) -> Result<RemoteOp, WizardError> {
        self.require_idle()?;
        let token = self.token()?;
        Ok(self.start(
            Action::CreateProduct,
            RemoteCall::CreateProduct {
                token,
                product: Box::new(product),
            },
        ))
    }

    /// Back to `auth` from anywhere: abandon any request, forget the token and
    /// the whole draft.
    pub fn logout(&mut self) -> Notice {
        self.cancel_pending();
        let cleared = self.session.clear();
        self.draft = OrderDraft::default();
        self.references = References::default();
        self.catalog.clear();
        self.search_query.clear();
        self.sequencer.invalidate();
        tracing::info!("logged out");
        match cleared {
            Ok(()) => Notice::info("Signed out"),
            Err(e) => Notice::warning(format!("Signed out, but the token file remains: {e:#}")),
        }
    }
}
