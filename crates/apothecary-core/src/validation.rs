//! # Validation Module
//!
//! Input validation for everything that enters the system.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP JSON body ──► serde (types) ──► THIS MODULE ──► transaction       │
//! │                                           │                             │
//! │                                           └── fails? nothing was locked │
//! │                                                                         │
//! │  SQLite still enforces NOT NULL / UNIQUE / FK / CHECK (quantity >= 0)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use apothecary_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("PARA-500").unwrap();
//! validate_quantity(30).unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_AMOUNT_CENTS, MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - 1 to 50 characters after trimming
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use apothecary_core::validation::validate_sku;
///
/// assert!(validate_sku("AMOX-500").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_code("sku", sku, 50)
}

/// Validates a short identifier code (sku, test code): letters, digits,
/// hyphens and underscores.
pub fn validate_code(field: &str, code: &str, max: usize) -> ValidationResult<()> {
    let code = validate_text(field, code, max)?;

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a required free-text field and returns it trimmed.
pub fn validate_text<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value)
}

/// Validates an optional free-text field. Blank strings count as absent.
pub fn validate_optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => validate_text(field, v, max).map(|v| Some(v.to_string())),
    }
}

/// Validates a search query, returning it trimmed. Empty is allowed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

/// Validates a login name: 3 to 50 characters, no whitespace.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = validate_text("username", username, 50)?;

    if username.chars().count() < 3 || username.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must be at least 3 characters without spaces".to_string(),
        });
    }

    Ok(())
}

/// Loose shape check: one `@` with text on both sides and a dot in the domain.
///
/// ```rust
/// use apothecary_core::validation::validate_email;
///
/// assert!(validate_email("email", "orders@medisupply.co.ke").is_ok());
/// assert!(validate_email("email", "orders@localhost").is_err());
/// ```
pub fn validate_email(field: &str, email: &str) -> ValidationResult<()> {
    let email = validate_text(field, email, 254)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() > 1
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    };

    if !valid || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "is not an email address".to_string(),
        });
    }

    Ok(())
}

/// Passwords must be at least 8 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 8 {
        return Err(ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: "must be at least 8 characters".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_LINE_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a monetary amount in cents.
///
/// ## Rules
/// - Zero is allowed, negatives are not
/// - Must not exceed [`MAX_AMOUNT_CENTS`]
///
/// ```rust
/// use apothecary_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents("tax", 0).is_ok());
/// assert!(validate_amount_cents("discount", -1).is_err());
/// assert!(validate_amount_cents("tax", i64::MAX).is_err());
/// ```
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// A charge that must be strictly positive (expense amounts).
pub fn validate_positive_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents == 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    validate_amount_cents(field, cents)
}

/// Patient age in whole years, 0 to 150.
pub fn validate_age(age: i64) -> ValidationResult<()> {
    if !(0..=150).contains(&age) {
        return Err(ValidationError::OutOfRange {
            field: "patient_age".to_string(),
            min: 0,
            max: 150,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0 to 10000).
pub fn validate_tax_rate_bps(bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a reorder level or counted stock quantity.
pub fn validate_stock_level(field: &str, qty: i64) -> ValidationResult<()> {
    validate_amount_cents(field, qty)
}

// =============================================================================
// Collection Validators
// =============================================================================

/// A document must have between 1 and [`MAX_DOCUMENT_LINES`] lines.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::required("items"));
    }

    if lines > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
