//! Order-entry wizard.
//!
//! `controller` owns the draft and implements the step machine; `runner` drives a
//! controller from UI commands on the async runtime and reports back as events.

mod cart;
mod controller;
mod draft;
mod runner;
mod search;

pub use controller::{fetch_references, WizardController, MIN_PHONE_DIGITS};
pub(crate) use runner::{run_controller, UiCommand};

use crate::api::RequestError;
use crate::model::{Action, ReferenceKind, Step};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("enter an access token")]
    EmptyToken,
    #[error("enter a phone number with at least {min} digits")]
    PhoneTooShort { min: usize },
    #[error("find a customer or continue without one")]
    NoCustomer,
    #[error("choose: {}", labels(.0))]
    MissingSelection(Vec<ReferenceKind>),
    #[error("unknown {} id {id}", .kind.label())]
    UnknownReference { kind: ReferenceKind, id: i64 },
    #[error("item {0} is not in the current catalog list")]
    UnknownItem(i64),
    #[error("add at least one item to the cart")]
    EmptyCart,
    #[error("not available on the {} step (expected {})", .actual.label(), .expected.label())]
    WrongStep { expected: Step, actual: Step },
    #[error("please wait: {}…", .0.label())]
    Busy(Action),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("{} failed: {source}", .action.label())]
    Remote {
        action: Action,
        #[source]
        source: RequestError,
    },
}

impl WizardError {
    pub(crate) fn remote(action: Action) -> impl FnOnce(RequestError) -> Self {
        move |source| WizardError::Remote { action, source }
    }
}

fn labels(kinds: &[ReferenceKind]) -> String {
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(", ")
}
