//! ToParams derive macro implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

use crate::fields::parse_fields;

pub fn derive_to_params_impl(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let field_configs = parse_fields(&input)?;
    let mapped: Vec<_> = field_configs.iter().filter(|c| !c.skip).collect();

    let param_names: Vec<&str> = mapped.iter().map(|c| c.column_name.as_str()).collect();

    let param_values: Vec<TokenStream> = mapped
        .iter()
        .map(|config| {
            let field_ident = &config.ident;
            quote! {
                dbconnect::ToValue::to_value(&self.#field_ident)
            }
        })
        .collect();

    let expanded = quote! {
        impl #impl_generics dbconnect::ToParams for #name #ty_generics #where_clause {
            fn param_names() -> &'static [&'static str] {
                &[#(#param_names),*]
            }

            fn param_values(&self) -> Vec<dbconnect::Value> {
                vec![#(#param_values),*]
            }
        }
    };

    Ok(expanded)
}
