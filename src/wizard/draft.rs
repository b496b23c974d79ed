use super::cart::Cart;
use super::WizardError;
use crate::model::{
    CustomerChoice, OrderPayload, ReferenceEntity, ReferenceKind, Selections, Step, NO_CUSTOMER,
};

/// Operation label the API expects for a customer order.
const ORDER_OPERATION: &str = "Заказ";

/// The in-progress order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderDraft {
    pub step: Step,
    pub customer: Option<CustomerChoice>,
    pub selections: Selections,
    pub cart: Cart,
}

impl OrderDraft {
    /// Select the first entry of `list` for `kind` unless something is already selected.
    pub fn apply_default(&mut self, kind: ReferenceKind, list: &[ReferenceEntity]) {
        if self.selections.get(kind).is_none() {
            if let Some(first) = list.first() {
                self.selections.set(kind, Some(first.id));
            }
        }
    }

    pub fn require_step(&self, expected: Step) -> Result<(), WizardError> {
        if self.step != expected {
            return Err(WizardError::WrongStep {
                expected,
                actual: self.step,
            });
        }
        Ok(())
    }

    pub fn require_selections(&self) -> Result<(), WizardError> {
        let missing = self.selections.missing();
        if !missing.is_empty() {
            return Err(WizardError::MissingSelection(missing));
        }
        Ok(())
    }

    pub fn require_cart(&self) -> Result<(), WizardError> {
        if self.cart.is_empty() {
            return Err(WizardError::EmptyCart);
        }
        Ok(())
    }

    /// Build the sale document. `dated` is the order time in Unix seconds.
    pub fn build_payload(&self, dated: i64, finalize: bool) -> Result<OrderPayload, WizardError> {
        self.require_selections()?;
        self.require_cart()?;
        let customer = self.customer.as_ref().ok_or(WizardError::NoCustomer)?;

        let (Some(warehouse), Some(paybox), Some(organization)) = (
            self.selections.warehouse,
            self.selections.paybox,
            self.selections.organization,
        ) else {
            return Err(WizardError::MissingSelection(self.selections.missing()));
        };

        let record = customer.customer();
        Ok(OrderPayload {
            priority: 0,
            dated,
            operation: ORDER_OPERATION.to_string(),
            tax_included: true,
            tax_active: true,
            goods: self.cart.lines().to_vec(),
            settings: serde_json::Map::new(),
            loyalty_card_id: record.and_then(|c| c.loyalty_card_id),
            warehouse,
            contragent: record.map_or(NO_CUSTOMER, |c| c.id),
            paybox,
            organization,
            status: finalize,
            paid_rubles: self.cart.total(),
            paid_lt: 0.0,
        })
    }

    /// Prepare for the next order after a successful submission: keep the
    /// reference selections, drop the customer and the cart.
    pub fn reset_for_next_order(&mut self) {
        self.cart.clear();
        self.customer = None;
        self.step = Step::Client;
    }
}
