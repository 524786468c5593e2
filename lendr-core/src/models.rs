use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Customer account status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
}

/// Loan status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    #[default]
    Pending,
    Active,
    Rejected,
    Paid,
}

impl LoanStatus {
    /// Pending and active loans count towards a customer's debt.
    pub fn is_open(self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
    Rejected,
}

macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(UnknownStatus(s.to_string())),
                }
            }
        }
    };
}

status_strings!(CustomerStatus { Active => "ACTIVE", Inactive => "INACTIVE" });
status_strings!(LoanStatus {
    Pending => "PENDING",
    Active => "ACTIVE",
    Rejected => "REJECTED",
    Paid => "PAID",
});
status_strings!(PaymentStatus { Completed => "COMPLETED", Rejected => "REJECTED" });

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// A borrower. `score` is the credit line: the ceiling on open loan balances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub external_id: String,
    pub status: CustomerStatus,
    pub score: Decimal,
    pub preapproved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(input: NewCustomer) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: input.external_id,
            status: input.status,
            score: input.score,
            preapproved_at: input.preapproved_at,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Loan {
    pub id: Uuid,
    pub external_id: String,
    pub customer_id: Uuid,
    pub customer_external_id: String,
    pub amount: Decimal,
    pub outstanding: Decimal,
    pub status: LoanStatus,
    pub contract_version: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub maximum_payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Originate a loan for `customer`. Starts pending with the full amount outstanding.
    pub fn originate(customer: &Customer, input: NewLoan) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: input.external_id,
            customer_id: customer.id,
            customer_external_id: customer.external_id.clone(),
            amount: input.amount,
            outstanding: input.amount,
            status: LoanStatus::Pending,
            contract_version: input.contract_version,
            taken_at: input.taken_at,
            maximum_payment_date: input.maximum_payment_date,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentDetail {
    pub loan_id: Uuid,
    pub loan_external_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub external_id: String,
    pub customer_id: Uuid,
    pub customer_external_id: String,
    pub total_amount: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub details: Vec<PaymentDetail>,
}

impl Payment {
    /// Sum of the amounts applied to loans.
    pub fn applied_amount(&self) -> Decimal {
        self.details.iter().map(|d| d.amount).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCustomer {
    pub external_id: String,
    pub score: Decimal,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default)]
    pub preapproved_at: Option<DateTime<Utc>>,
}

impl NewCustomer {
    pub fn new(external_id: impl Into<String>, score: Decimal) -> Self {
        Self {
            external_id: external_id.into(),
            score,
            status: CustomerStatus::Active,
            preapproved_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLoan {
    pub external_id: String,
    pub customer_external_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub contract_version: String,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maximum_payment_date: Option<DateTime<Utc>>,
}

impl NewLoan {
    pub fn new(
        external_id: impl Into<String>,
        customer_external_id: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            customer_external_id: customer_external_id.into(),
            amount,
            contract_version: String::new(),
            taken_at: None,
            maximum_payment_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPayment {
    pub external_id: String,
    pub customer_external_id: String,
    pub total_amount: Decimal,
}

impl NewPayment {
    pub fn new(
        external_id: impl Into<String>,
        customer_external_id: impl Into<String>,
        total_amount: Decimal,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            customer_external_id: customer_external_id.into(),
            total_amount,
        }
    }
}
