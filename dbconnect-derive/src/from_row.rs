//! FromRow derive macro implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

use crate::fields::parse_fields;

pub fn derive_from_row_impl(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let field_configs = parse_fields(&input)?;

    // One assignment per mapped field; skipped fields keep their default
    let field_mappings: Vec<TokenStream> = field_configs
        .iter()
        .filter(|c| !c.skip)
        .map(|config| {
            let field_ident = &config.ident;
            let column_name = &config.column_name;
            let ty = &config.ty;
            quote! {
                dbconnect::FieldMapping::new(
                    #column_name,
                    |record: &mut Self, value: dbconnect::Value| {
                        record.#field_ident =
                            <#ty as dbconnect::FromValue>::from_value(value)?;
                        Ok(())
                    },
                )
            }
        })
        .collect();

    let expanded = quote! {
        impl #impl_generics dbconnect::FromRow for #name #ty_generics #where_clause {
            fn mapping() -> dbconnect::RowMapping<Self> {
                dbconnect::RowMapping::Record(dbconnect::RecordMapping::new(
                    #type_name,
                    <Self as std::default::Default>::default,
                    vec![#(#field_mappings),*],
                ))
            }
        }
    };

    Ok(expanded)
}
