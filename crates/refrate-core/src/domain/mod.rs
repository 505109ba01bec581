//! # Domain Models
//!
//! Validated value types for reference-rate observations.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CurrencyCode`] | Three-letter uppercase code (`USD`, `EUR`) |
//! | [`RateValue`] | Rate literal exactly as printed |
//! | [`ColumnSchema`] | Ordered rate-column names negotiated from a header |
//! | [`PublishedAt`] | Minute-precision publication timestamp, the series key |
//! | [`RateObservation`] | One currency's rates from one document |
//! | [`RateRow`] | Parsed table row before timestamp binding |

mod currency;
mod observation;
mod rate;
mod timestamp;

pub use currency::CurrencyCode;
pub use observation::{RateObservation, RateRow};
pub use rate::{canonical_column, column_words, ColumnSchema, RateValue};
pub use timestamp::PublishedAt;
