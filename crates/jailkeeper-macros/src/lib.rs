#![deny(unsafe_code)]

//! Procedural macros for jailkeeper.
//!
//! - `#[derive(Validate)]` generates a `validate()` method from field annotations
//! - `#[derive(Redact)]` masks secret fields in `Debug` output

extern crate proc_macro;

mod redact;
mod validate;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derive a `Debug` implementation that hides fields marked `#[redact]`.
///
/// Redacted `Option` fields render as `Some([REDACTED])` or `None`, so an
/// operator can still tell whether a secret is configured.
///
/// ```ignore
/// use jailkeeper_macros::Redact;
///
/// #[derive(Redact)]
/// struct ServerConfig {
///     pub listen_addr: String,
///     #[redact]
///     pub api_token: Option<String>,
/// }
/// ```
#[proc_macro_derive(Redact, attributes(redact))]
pub fn derive_redact(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    redact::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive a `validate(&self) -> Result<(), Vec<String>>` method.
///
/// Supported attributes:
/// - `#[validate(non_empty)]`: string/collection must not be empty
/// - `#[validate(identifier)]`: usable as a file stem and a command token:
///   ASCII alphanumerics, `-`, `_` and `.`, not starting with `.`
/// - `#[validate(range(min = N, max = M))]`: numeric value in [N, M]
/// - `#[validate(min_len = N)]` / `#[validate(max_len = N)]`
///
/// ```ignore
/// use jailkeeper_macros::Validate;
///
/// #[derive(Validate)]
/// struct Jail {
///     #[validate(non_empty, identifier)]
///     pub name: String,
///     #[validate(range(min = 1, max = 1000))]
///     pub maxretry: u32,
/// }
/// ```
#[proc_macro_derive(Validate, attributes(validate))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    validate::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
