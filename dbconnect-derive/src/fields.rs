//! Field attribute parsing shared by both derives

use std::collections::HashMap;

use syn::{spanned::Spanned, Data, DeriveInput, Error, Field, Fields, Ident, Result};

/// One named field and its `#[dbconnect(...)]` configuration
pub struct FieldConfig {
    /// The field identifier
    pub ident: Ident,
    /// Column name to use (may be renamed)
    pub column_name: String,
    /// Whether to leave this field out of the mapping
    pub skip: bool,
    /// The field type
    pub ty: syn::Type,
}

fn parse_field_config(field: &Field) -> Result<FieldConfig> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new(field.span(), "tuple structs are not supported"))?;

    let raw = ident.to_string();
    let mut column_name = raw.strip_prefix("r#").unwrap_or(&raw).to_string();
    let mut skip = false;

    for attr in &field.attrs {
        if attr.path().is_ident("dbconnect") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value = meta.value()?;
                    let lit: syn::LitStr = value.parse()?;
                    if lit.value().trim().is_empty() {
                        return Err(Error::new(lit.span(), "column name must not be empty"));
                    }
                    column_name = lit.value();
                } else if meta.path.is_ident("skip") {
                    skip = true;
                } else {
                    return Err(meta.error(format!(
                        "unknown dbconnect attribute `{}`",
                        meta.path
                            .get_ident()
                            .map(|i| i.to_string())
                            .unwrap_or_default()
                    )));
                }
                Ok(())
            })?;
        }
    }

    Ok(FieldConfig {
        ident,
        column_name,
        skip,
        ty: field.ty.clone(),
    })
}

/// Parse the fields of a named struct,
/// rejecting column names that collide case-insensitively.
pub fn parse_fields(input: &DeriveInput) -> Result<Vec<FieldConfig>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Err(Error::new(input.span(), "only named fields are supported")),
        },
        _ => return Err(Error::new(input.span(), "only structs are supported")),
    };

    let configs = fields
        .iter()
        .map(parse_field_config)
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashMap<String, &Ident> = HashMap::new();
    for config in configs.iter().filter(|c| !c.skip) {
        if let Some(other) = seen.insert(config.column_name.to_lowercase(), &config.ident) {
            return Err(Error::new(
                config.ident.span(),
                format!(
                    "column `{}` is mapped by both `{}` and `{}`",
                    config.column_name, other, config.ident
                ),
            ));
        }
    }

    Ok(configs)
}
