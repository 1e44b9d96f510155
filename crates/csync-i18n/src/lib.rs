#![forbid(unsafe_code)]

//! Locale data for csync clients.
//!
//! The client formats dates itself; the server only ships calendar symbols
//! and a split short date-time pattern for every locale in use.

pub mod catalog;
pub mod pattern;

pub use catalog::{I18nError, Locale, LocaleCatalog, LocaleData};
pub use pattern::DateTimeFormat;
