//! ToParams trait: the outbound field table of a record type

use crate::value::Value;

/// Trait for record types whose fields can be read out as named values.
///
/// This is the field table used in two places:
/// - auto-binding a positional parameter object, where every field becomes a
///   parameter named after it;
/// - bulk loading, where every field (minus an ignore list) becomes a
///   destination column of the same name.
///
/// Typically implemented via `#[derive(ToParams)]`. Names and values are
/// parallel: `param_values()[i]` belongs to `param_names()[i]`.
pub trait ToParams {
    /// Field names, in declaration order.
    fn param_names() -> &'static [&'static str];

    /// Field values, in the same order as [`ToParams::param_names`].
    fn param_values(&self) -> Vec<Value>;
}

impl<T: ToParams> ToParams for &T {
    fn param_names() -> &'static [&'static str] {
        T::param_names()
    }

    fn param_values(&self) -> Vec<Value> {
        (**self).param_values()
    }
}
