//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a cart line.
///
/// ```text
/// Active --(order committed)--> Consumed
/// Active --(removed / cart cleared)--> deleted, stock credited back
/// ```
///
/// Nothing leaves `Consumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.cart_line_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CartLineStatus {
    /// Live reservation: stock is debited and held for the user.
    #[default]
    Active,
    /// Committed into an order; the stock transfer is permanent.
    Consumed,
}

impl CartLineStatus {
    /// Whether the line still represents a live, mutable reservation.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for CartLineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Consumed => write!(f, "consumed"),
        }
    }
}

impl std::str::FromStr for CartLineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "consumed" => Ok(Self::Consumed),
            _ => Err(format!("invalid cart line status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrips_through_str() {
        for status in [CartLineStatus::Active, CartLineStatus::Consumed] {
            let parsed: CartLineStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("ordered".parse::<CartLineStatus>().is_err());
    }

    #[test]
    fn test_only_active_is_mutable() {
        assert!(CartLineStatus::Active.is_active());
        assert!(!CartLineStatus::Consumed.is_active());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&CartLineStatus::Consumed).unwrap();
        assert_eq!(json, "\"consumed\"");
    }
}
