//! # apothecary-core: Pure Business Logic for Apothecary POS
//!
//! Everything in this crate is deterministic and free of I/O. The database
//! layer (`apothecary-db`) and the REST server build on top of it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Apothecary Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 REST API (apps/api-server)                      │   │
//! │  │   /sales  /prescriptions  /products  /customers  /settings      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ apothecary-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────────────┐ │   │
//! │  │   │  types   │ │  money   │ │  pricing  │ │ numbering/policy │ │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        apothecary-db (SQLite, repositories, fulfillment)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Prescription, ...)
//! - [`money`] - Integer-cent money type
//! - [`pricing`] - Line and order total computation
//! - [`numbering`] - Day-coded sequential document numbers
//! - [`policy`] - Role/action capability table
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use apothecary_core::money::Money;
//! use apothecary_core::pricing::{price_order, PricedLineInput};
//!
//! let lines = [PricedLineInput {
//!     unit_price: Money::from_cents(450),
//!     quantity: 3,
//!     discount: Money::zero(),
//! }];
//! let totals = price_order(&lines, Money::zero(), Money::zero(), Money::from_cents(2000))?;
//!
//! assert_eq!(totals.total.cents(), 1350);
//! assert_eq!(totals.change.cents(), 650);
//! # Ok::<(), apothecary_core::ValidationError>(())
//! ```

pub mod error;
pub mod money;
pub mod numbering;
pub mod policy;
pub mod pricing;
pub mod types;
pub mod validation;

pub use error::{CoreError, StockShortage, ValidationError};
pub use money::Money;
pub use numbering::DocumentKind;
pub use policy::{Action, Role};
pub use types::*;

/// Maximum number of lines accepted in a single document.
pub const MAX_DOCUMENT_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against keying mistakes (10000 instead of 100 tablets).
pub const MAX_LINE_QUANTITY: i64 = 10_000;

/// Largest single monetary amount accepted from callers (1 billion in major
/// units).
///
/// With [`MAX_LINE_QUANTITY`] and [`MAX_DOCUMENT_LINES`] this keeps every
/// document total far inside `i64`; pricing still uses checked arithmetic.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;
