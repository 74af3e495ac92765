//! Derive macros for the dbconnect data-access layer
//!
//! This crate provides the following derive macros:
//! - `FromRow` - Builds the mapping descriptor that materializes rows into a struct
//! - `ToParams` - Exposes a struct's fields as named parameters and bulk-copy columns
//!
//! These macros are re-exported from the `dbconnect` crate, so users typically
//! don't need to depend on this crate directly.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod fields;
mod from_row;
mod to_params;

/// Derive macro for materializing database rows into Rust structs.
///
/// The generated `FromRow` implementation starts from `Default::default()`
/// and assigns every non-null column whose name matches a field
/// (case-insensitively). Unmatched columns are ignored and unmatched fields
/// keep their default, so the struct must implement `Default`.
///
/// # Attributes
///
/// - `#[dbconnect(rename = "column_name")]` - Match a different column name for this field
/// - `#[dbconnect(skip)]` - Never assign this field from a row
///
/// # Example
///
/// ```ignore
/// use dbconnect::FromRow;
///
/// #[derive(Default, FromRow)]
/// pub struct User {
///     pub id: i64,
///     #[dbconnect(rename = "user_name")]
///     pub username: String,
///     pub email: Option<String>,
/// }
/// ```
#[proc_macro_derive(FromRow, attributes(dbconnect))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::derive_from_row_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive macro for exposing Rust structs as named parameters.
///
/// The field table is used both to bind a parameter object to a command
/// and as the source columns of a bulk copy.
///
/// # Attributes
///
/// - `#[dbconnect(rename = "column_name")]` - Use a different parameter/column name for this field
/// - `#[dbconnect(skip)]` - Leave this field out (e.g. auto-increment columns)
///
/// # Example
///
/// ```ignore
/// use dbconnect::ToParams;
///
/// #[derive(ToParams)]
/// pub struct NewUser {
///     pub username: String,
///     pub email: String,
/// }
/// ```
#[proc_macro_derive(ToParams, attributes(dbconnect))]
pub fn derive_to_params(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    to_params::derive_to_params_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
