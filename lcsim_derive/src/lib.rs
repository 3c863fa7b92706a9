//! Derive macros for the lcsim crate.
//!
//! Provides:
//! - `#[derive(Error)]` - error type boilerplate (thiserror replacement) with
//!   `#[from]` / `#[source]` support for wrapping lower-level errors

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display`, `Error` and `From` conversions for error types.
#[proc_macro_derive(Error, attributes(error, from, source))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
