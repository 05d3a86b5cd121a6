//! Paged list results with per-item unsealing.
//!
//! Every item of a page is unsealed on its own. An item whose sealed fields
//! cannot be unsealed is demoted to its partial form (unsealed fields only)
//! and reported next to the cause; the rest of the page is still returned.
//! Errors other than unsealing failures abort the whole page.

use crate::error::{EmailError, Result};
use crate::sealing::SealingService;

/// A sealed item that can be unsealed, or reduced to its unsealed fields.
pub trait Unsealable {
    type Output;
    type Partial;

    fn unseal(&self, sealing: &dyn SealingService) -> Result<Self::Output>;
    fn to_partial(&self) -> Self::Partial;
}

/// An item that failed to unseal.
#[derive(Debug)]
pub struct PartialResult<P> {
    pub partial: P,
    pub cause: EmailError,
}

#[derive(Debug)]
pub enum ListApiResult<T, P> {
    Success {
        items: Vec<T>,
        next_token: Option<String>,
    },
    Partial {
        items: Vec<T>,
        failed: Vec<PartialResult<P>>,
        next_token: Option<String>,
    },
}

impl<T, P> ListApiResult<T, P> {
    pub fn items(&self) -> &[T] {
        match self {
            ListApiResult::Success { items, .. } | ListApiResult::Partial { items, .. } => items,
        }
    }

    pub fn failed(&self) -> &[PartialResult<P>] {
        match self {
            ListApiResult::Success { .. } => &[],
            ListApiResult::Partial { failed, .. } => failed,
        }
    }

    pub fn next_token(&self) -> Option<&str> {
        match self {
            ListApiResult::Success { next_token, .. } | ListApiResult::Partial { next_token, .. } => {
                next_token.as_deref()
            }
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ListApiResult::Partial { .. })
    }
}

/// Unseal every item of a page.
pub fn unseal_page<U: Unsealable>(
    sealed: &[U],
    sealing: &dyn SealingService,
    next_token: Option<String>,
) -> Result<ListApiResult<U::Output, U::Partial>> {
    let mut items = Vec::with_capacity(sealed.len());
    let mut failed = Vec::new();
    for item in sealed {
        match item.unseal(sealing) {
            Ok(unsealed) => items.push(unsealed),
            Err(cause @ EmailError::Unsealing(_)) => {
                tracing::warn!(error = %cause, "list item failed to unseal; returning partial");
                failed.push(PartialResult {
                    partial: item.to_partial(),
                    cause,
                });
            }
            Err(other) => return Err(other),
        }
    }

    if failed.is_empty() {
        Ok(ListApiResult::Success { items, next_token })
    } else {
        Ok(ListApiResult::Partial {
            items,
            failed,
            next_token,
        })
    }
}
