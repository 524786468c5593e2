use rust_decimal::Decimal;

use crate::models::{NewCustomer, NewLoan, NewPayment};
use crate::{LendingError, LendingResult};

pub const EXTERNAL_ID_MAX_LEN: usize = 60;
pub const CONTRACT_VERSION_MAX_LEN: usize = 30;
pub const MONEY_DECIMAL_PLACES: u32 = 2;
pub const MONEY_MAX_DIGITS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    NonNegative,
    Positive,
}

/// Trims and bounds an external identifier.
pub fn external_id(field: &str, value: &str) -> LendingResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LendingError::validation(field, "This field may not be blank."));
    }
    if trimmed.chars().count() > EXTERNAL_ID_MAX_LEN {
        return Err(LendingError::validation(
            field,
            format!("Ensure this field has no more than {EXTERNAL_ID_MAX_LEN} characters."),
        ));
    }
    Ok(trimmed.to_string())
}

/// Checks sign, precision and magnitude, and returns the value at two decimal places.
pub fn money(field: &str, value: Decimal, sign: Sign) -> LendingResult<Decimal> {
    match sign {
        Sign::Positive if value <= Decimal::ZERO => {
            return Err(LendingError::validation(field, "Ensure this value is greater than 0."));
        }
        Sign::NonNegative if value < Decimal::ZERO => {
            return Err(LendingError::validation(
                field,
                "Ensure this value is greater than or equal to 0.",
            ));
        }
        _ => {}
    }

    if value.normalize().scale() > MONEY_DECIMAL_PLACES {
        return Err(LendingError::validation(
            field,
            format!("Ensure that there are no more than {MONEY_DECIMAL_PLACES} decimal places."),
        ));
    }

    let limit = Decimal::from(10i64.pow(MONEY_MAX_DIGITS - MONEY_DECIMAL_PLACES));
    if value.abs() >= limit {
        return Err(LendingError::validation(
            field,
            format!("Ensure that there are no more than {MONEY_MAX_DIGITS} digits in total."),
        ));
    }

    let mut scaled = value;
    scaled.rescale(MONEY_DECIMAL_PLACES);
    Ok(scaled)
}

impl NewCustomer {
    pub fn validated(mut self) -> LendingResult<Self> {
        self.external_id = external_id("external_id", &self.external_id)?;
        self.score = money("score", self.score, Sign::NonNegative)?;
        Ok(self)
    }
}

impl NewLoan {
    pub fn validated(mut self) -> LendingResult<Self> {
        self.external_id = external_id("external_id", &self.external_id)?;
        self.customer_external_id =
            external_id("customer_external_id", &self.customer_external_id)?;
        self.amount = money("amount", self.amount, Sign::Positive)?;
        if self.contract_version.chars().count() > CONTRACT_VERSION_MAX_LEN {
            return Err(LendingError::validation(
                "contract_version",
                format!("Ensure this field has no more than {CONTRACT_VERSION_MAX_LEN} characters."),
            ));
        }
        Ok(self)
    }
}

impl NewPayment {
    pub fn validated(mut self) -> LendingResult<Self> {
        self.external_id = external_id("external_id", &self.external_id)?;
        self.customer_external_id =
            external_id("customer_external_id", &self.customer_external_id)?;
        self.total_amount = money("total_amount", self.total_amount, Sign::Positive)?;
        Ok(self)
    }
}
