//! # Pricing
//!
//! Line and order totals for sales.
//!
//! ```text
//! line_total = unit_price × quantity − line_discount
//! subtotal   = Σ line_total
//! total      = subtotal + tax − order_discount
//! change     = max(0, amount_paid − total)
//! ```
//!
//! Inputs are validated first (quantities bounded by
//! [`crate::MAX_LINE_QUANTITY`], amounts by [`crate::MAX_AMOUNT_CENTS`]).
//! Every step is still checked: an amount that does not fit in `i64` is a
//! [`ValidationError`] naming the field, never a wrapped total.
//! [`validate_totals`] rejects discounts that would drive a line or the
//! order below zero.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::ValidationResult;

/// One line to be priced. `unit_price` is already resolved (the override or
/// the product's current price).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLineInput {
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Money,
}

impl PricedLineInput {
    /// Price before the line discount. `None` on overflow.
    #[inline]
    pub fn gross(&self) -> Option<Money> {
        self.unit_price.checked_mul_quantity(self.quantity)
    }

    #[inline]
    pub fn line_total(&self) -> Option<Money> {
        self.gross()?.checked_sub(self.discount)
    }
}

fn too_large(field: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.into(),
        reason: "amount is too large".to_string(),
    }
}

/// Per-line totals, in input order.
pub fn line_totals(lines: &[PricedLineInput]) -> ValidationResult<Vec<Money>> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            line.line_total()
                .ok_or_else(|| too_large(format!("items[{index}].unit_price_cents")))
        })
        .collect()
}

/// Sum of the line totals.
pub fn subtotal(lines: &[PricedLineInput]) -> ValidationResult<Money> {
    line_totals(lines)?
        .into_iter()
        .try_fold(Money::zero(), Money::checked_add)
        .ok_or_else(|| too_large("subtotal"))
}

/// Computed totals for a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    /// Per-line totals, in input order.
    pub line_totals: Vec<Money>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub change: Money,
}

/// Prices a document.
///
/// ```rust
/// use apothecary_core::money::Money;
/// use apothecary_core::pricing::{price_order, PricedLineInput};
///
/// let lines = [
///     PricedLineInput { unit_price: Money::from_cents(1200), quantity: 2, discount: Money::from_cents(200) },
///     PricedLineInput { unit_price: Money::from_cents(350), quantity: 1, discount: Money::zero() },
/// ];
/// let totals = price_order(&lines, Money::from_cents(100), Money::from_cents(50), Money::from_cents(2000))?;
///
/// assert_eq!(totals.subtotal.cents(), 2550);
/// assert_eq!(totals.total.cents(), 2600);
/// assert!(totals.change.is_zero());
/// # Ok::<(), apothecary_core::ValidationError>(())
/// ```
pub fn price_order(
    lines: &[PricedLineInput],
    tax: Money,
    discount: Money,
    amount_paid: Money,
) -> ValidationResult<OrderTotals> {
    let line_totals = line_totals(lines)?;
    let subtotal = line_totals
        .iter()
        .copied()
        .try_fold(Money::zero(), Money::checked_add)
        .ok_or_else(|| too_large("subtotal"))?;
    let total = subtotal
        .checked_add(tax)
        .and_then(|t| t.checked_sub(discount))
        .ok_or_else(|| too_large("total"))?;
    let change = amount_paid
        .checked_sub(total)
        .ok_or_else(|| too_large("amount_paid_cents"))?
        .non_negative();

    Ok(OrderTotals {
        line_totals,
        subtotal,
        tax,
        discount,
        total,
        amount_paid,
        change,
    })
}

/// Rejects totals where a discount exceeds what it applies to.
pub fn validate_totals(totals: &OrderTotals) -> ValidationResult<()> {
    if let Some(index) = totals.line_totals.iter().position(Money::is_negative) {
        return Err(ValidationError::InvalidFormat {
            field: format!("items[{index}].discount"),
            reason: "exceeds the line amount".to_string(),
        });
    }

    if totals.total.is_negative() {
        return Err(ValidationError::InvalidFormat {
            field: "discount".to_string(),
            reason: "exceeds subtotal plus tax".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(unit: i64, qty: i64, discount: i64) -> PricedLineInput {
        PricedLineInput {
            unit_price: Money::from_cents(unit),
            quantity: qty,
            discount: Money::from_cents(discount),
        }
    }

    #[test]
    fn test_total_identity_holds() {
        let totals = price_order(
            &[line(999, 3, 0), line(1500, 2, 250)],
            Money::from_cents(412),
            Money::from_cents(300),
            Money::from_cents(10_000),
        )
        .unwrap();

        assert_eq!(totals.line_totals, vec![Money::from_cents(2997), Money::from_cents(2750)]);
        assert_eq!(totals.subtotal.cents(), 5747);
        assert_eq!(totals.total, totals.subtotal + totals.tax - totals.discount);
        assert_eq!(totals.total.cents(), 5859);
        assert_eq!(totals.change.cents(), 10_000 - 5859);
    }

    #[test]
    fn test_underpayment_gives_zero_change() {
        let totals = price_order(&[line(500, 1, 0)], Money::zero(), Money::zero(), Money::zero()).unwrap();
        assert_eq!(totals.total.cents(), 500);
        assert_eq!(totals.change, Money::zero());
    }

    #[test]
    fn test_exact_payment() {
        let totals = price_order(&[line(450, 3, 0)], Money::zero(), Money::zero(), Money::from_cents(1350)).unwrap();
        assert!(totals.change.is_zero());
    }

    #[test]
    fn test_validate_totals_rejects_oversized_discounts() {
        let bad_line = price_order(&[line(100, 1, 101)], Money::zero(), Money::zero(), Money::zero()).unwrap();
        assert!(matches!(
            validate_totals(&bad_line),
            Err(ValidationError::InvalidFormat { field, .. }) if field == "items[0].discount"
        ));

        let bad_order = price_order(&[line(100, 1, 0)], Money::zero(), Money::from_cents(101), Money::zero()).unwrap();
        assert!(validate_totals(&bad_order).is_err());

        let ok = price_order(&[line(100, 1, 100)], Money::zero(), Money::zero(), Money::zero()).unwrap();
        assert!(validate_totals(&ok).is_ok());
    }

    #[test]
    fn test_huge_tax_is_rejected_not_wrapped() {
        let err = price_order(
            &[line(450, 3, 0)],
            Money::from_cents(i64::MAX),
            Money::zero(),
            Money::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field, .. } if field == "total"));
    }

    #[test]
    fn test_huge_lines_are_rejected_not_wrapped() {
        let half = i64::MAX / 2 + 1;

        let err = price_order(&[line(half, 1, 0), line(half, 1, 0)], Money::zero(), Money::zero(), Money::zero())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field, .. } if field == "subtotal"));

        let err = price_order(&[line(1, 1, 0), line(half, 2, 0)], Money::zero(), Money::zero(), Money::zero())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidFormat { field, .. } if field == "items[1].unit_price_cents"
        ));

        assert!(subtotal(&[line(half, 1, 0), line(half, 1, 0)]).is_err());
        assert_eq!(subtotal(&[line(450, 3, 0), line(100, 1, 50)]).unwrap().cents(), 1400);
    }
}
