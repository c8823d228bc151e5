//! Value Objects for the Agora domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors raised by value objects and entity state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Action attempted on an entity not in the required state
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Negotiation has used its whole round budget
    #[error("Round limit exceeded: round {round} of {max_rounds}")]
    RoundLimitExceeded {
        /// Current round
        round: u32,
        /// Configured maximum
        max_rounds: u32,
    },

    /// Wallet balance cannot cover the amount
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Spendable balance
        available: Decimal,
        /// Requested amount
        required: Decimal,
    },

    /// Hold would push daily spend over the daily limit
    #[error("Daily limit exceeded: spent {spent} + requested {requested} > limit {limit}")]
    DailyLimitExceeded {
        /// Amount already spent today
        spent: Decimal,
        /// Requested amount
        requested: Decimal,
        /// Daily limit
        limit: Decimal,
    },

    /// Single hold larger than the per-job limit
    #[error("Per-job limit exceeded: requested {requested} > limit {limit}")]
    PerJobLimitExceeded {
        /// Requested amount
        requested: Decimal,
        /// Per-job limit
        limit: Decimal,
    },
}

// =============================================================================
// Money
// =============================================================================

/// Money represents a strictly positive decimal amount
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Create a new amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::Validation(format!("Amount must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Currency
// =============================================================================

/// Three-letter upper-case currency code (e.g., USD)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a currency code
    ///
    /// # Examples
    /// ```
    /// # use agora_domain::value_objects::Currency;
    /// let usd = Currency::new("usd").unwrap();
    /// assert_eq!(usd.code(), "USD");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::Validation` unless the code is three ASCII letters
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::Validation(format!("Invalid currency code: {}", code)));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// US dollar
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// Get the currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Turn Policy
// =============================================================================

/// Whether buyer and seller must take turns in a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolicy {
    /// Either participant may act at any time
    #[default]
    Free,
    /// The author of the current offer may not counter or accept it
    Alternating,
}

impl FromStr for TurnPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(TurnPolicy::Free),
            "alternating" | "strict" => Ok(TurnPolicy::Alternating),
            other => Err(DomainError::Validation(format!(
                "Invalid turn policy: {}. Expected: free, alternating",
                other
            ))),
        }
    }
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPolicy::Free => write!(f, "free"),
            TurnPolicy::Alternating => write!(f, "alternating"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
