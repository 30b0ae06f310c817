//! Implementation of `#[derive(Redact)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result, Type};

/// Whether the field type is spelled `Option<...>`.
fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Option"),
        _ => false,
    }
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    let syn::Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Redact can only be derived for structs",
        ));
    };
    let syn::Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "Redact only supports structs with named fields",
        ));
    };

    let mut field_debug = Vec::new();
    for f in &fields.named {
        let Some(field_name) = f.ident.as_ref() else {
            continue;
        };
        let label = field_name.to_string();
        let redacted = f.attrs.iter().any(|a| a.path().is_ident("redact"));

        let tokens = match (redacted, is_option(&f.ty)) {
            (false, _) => quote! { .field(#label, &self.#field_name) },
            (true, false) => quote! { .field(#label, &"[REDACTED]") },
            (true, true) => quote! {
                .field(#label, &self.#field_name.as_ref().map(|_| "[REDACTED]"))
            },
        };
        field_debug.push(tokens);
    }

    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::std::fmt::Debug for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(#name_str)
                    #(#field_debug)*
                    .finish()
            }
        }
    })
}
