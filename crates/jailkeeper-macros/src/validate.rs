//! Implementation of `#[derive(Validate)]`.
//!
//! Each `#[validate(...)]` attribute contributes checks to a generated
//! `validate(&self) -> Result<(), Vec<String>>` method. All failing checks
//! are reported, not just the first.

use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{DeriveInput, LitInt, Result};

#[derive(Default)]
struct Rules {
    non_empty: bool,
    identifier: bool,
    range_min: Option<i64>,
    range_max: Option<i64>,
    min_len: Option<usize>,
    max_len: Option<usize>,
}

fn int_value<N>(meta: &ParseNestedMeta) -> Result<N>
where
    N: std::str::FromStr,
    N::Err: std::fmt::Display,
{
    let lit: LitInt = meta.value()?.parse()?;
    lit.base10_parse()
}

impl Rules {
    fn from_field(field: &syn::Field) -> Result<Option<Self>> {
        let mut rules = Rules::default();
        let mut annotated = false;

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("validate")) {
            annotated = true;
            attr.parse_nested_meta(|meta| rules.parse_rule(meta))?;
        }

        Ok(annotated.then_some(rules))
    }

    fn parse_rule(&mut self, meta: ParseNestedMeta) -> Result<()> {
        if meta.path.is_ident("non_empty") {
            self.non_empty = true;
        } else if meta.path.is_ident("identifier") {
            self.identifier = true;
        } else if meta.path.is_ident("min_len") {
            self.min_len = Some(int_value(&meta)?);
        } else if meta.path.is_ident("max_len") {
            self.max_len = Some(int_value(&meta)?);
        } else if meta.path.is_ident("range") {
            meta.parse_nested_meta(|bound| {
                if bound.path.is_ident("min") {
                    self.range_min = Some(int_value(&bound)?);
                } else if bound.path.is_ident("max") {
                    self.range_max = Some(int_value(&bound)?);
                } else {
                    return Err(bound.error("expected `min` or `max`"));
                }
                Ok(())
            })?;
        } else {
            return Err(meta.error(
                "unknown validate rule; expected non_empty, identifier, range, min_len, or max_len",
            ));
        }
        Ok(())
    }

    fn checks(&self, field: &syn::Ident) -> TokenStream {
        let label = field.to_string();
        let mut checks = Vec::new();

        if self.non_empty {
            checks.push(quote! {
                if self.#field.is_empty() {
                    errors.push(format!("{}: must not be empty", #label));
                }
            });
        }

        // Empty values are left to `non_empty` so one mistake yields one message.
        if self.identifier {
            checks.push(quote! {
                if !self.#field.is_empty()
                    && (self.#field.starts_with('.')
                        || !self.#field.chars().all(|c| {
                            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
                        }))
                {
                    errors.push(format!(
                        "{}: may only contain ASCII letters, digits, '-', '_' or '.', and must not start with '.'",
                        #label
                    ));
                }
            });
        }

        if let Some(min) = self.min_len {
            checks.push(quote! {
                if self.#field.len() < #min {
                    errors.push(format!("{}: length must be at least {}", #label, #min));
                }
            });
        }

        if let Some(max) = self.max_len {
            checks.push(quote! {
                if self.#field.len() > #max {
                    errors.push(format!("{}: length must be at most {}", #label, #max));
                }
            });
        }

        if let Some(min) = self.range_min {
            checks.push(quote! {
                if (self.#field as i64) < #min {
                    errors.push(format!("{}: must be at least {}", #label, #min));
                }
            });
        }

        if let Some(max) = self.range_max {
            checks.push(quote! {
                if (self.#field as i64) > #max {
                    errors.push(format!("{}: must be at most {}", #label, #max));
                }
            });
        }

        quote! { #(#checks)* }
    }
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    let syn::Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Validate can only be derived for structs",
        ));
    };
    let syn::Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "Validate only supports structs with named fields",
        ));
    };

    let mut all_checks = Vec::new();
    for field in &fields.named {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        if let Some(rules) = Rules::from_field(field)? {
            all_checks.push(rules.checks(ident));
        }
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            /// Check the field-level constraints declared with `#[validate(...)]`.
            ///
            /// Returns every violated constraint as a human-readable message.
            pub fn validate(&self) -> ::std::result::Result<(), ::std::vec::Vec<::std::string::String>> {
                let mut errors = ::std::vec::Vec::new();
                #(#all_checks)*
                if errors.is_empty() {
                    ::std::result::Result::Ok(())
                } else {
                    ::std::result::Result::Err(errors)
                }
            }
        }
    })
}
