pub mod creation;
pub mod lifecycle;
pub mod referral;
pub mod report;
pub mod retry;

pub use creation::{CommissionRun, CreateOrderParams, CreatedOrder, NewOrderItem, OrderCreationService, OrderPolicy};
pub use lifecycle::{OrderLifecycle, StatusChange};
pub use referral::{AffiliateRef, Attribution, ReferralError, ReferralStatus, ReferralValidator};
pub use report::FulfillmentReport;
pub use retry::{CommissionRetrier, RetrySummary};

use tandem_commission::CommissionError;
use tandem_core::{OrderStatus, RepoError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid order: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Referral(#[from] ReferralError),

    #[error("An order already exists for transaction {0}")]
    DuplicateTransaction(String),

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Commission(#[from] CommissionError),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

/// Flatten `validator` errors into `field: code` lines, nested paths included.
pub fn validation_issues(errors: &validator::ValidationErrors) -> Vec<String> {
    fn walk(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<String>) {
        use validator::ValidationErrorsKind;

        for (field, kind) in errors.errors() {
            let path = if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
            match kind {
                ValidationErrorsKind::Field(list) => {
                    for err in list {
                        let detail = err.message.as_deref().unwrap_or(&*err.code);
                        out.push(format!("{}: {}", path, detail));
                    }
                }
                ValidationErrorsKind::Struct(inner) => walk(&path, inner, out),
                ValidationErrorsKind::List(items) => {
                    for (idx, inner) in items {
                        walk(&format!("{}[{}]", path, idx), inner, out);
                    }
                }
            }
        }
    }

    let mut issues = Vec::new();
    walk("", errors, &mut issues);
    issues.sort();
    issues
}
