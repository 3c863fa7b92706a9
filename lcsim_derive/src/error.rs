//! Derive macro for error types.
//!
//! Generates `std::fmt::Display`, `std::error::Error` and, for fields marked
//! `#[from]`, `From` implementations. Replacement for `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use lcsim_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum AsmError {
//!     #[error("line {line}: offset {offset} does not fit in 5 bits")]
//!     OffsetTooLarge { offset: i32, line: usize },
//!
//!     #[error("line {line}: duplicate label `{label}`")]
//!     DuplicateLabel { label: String, line: usize },
//! }
//!
//! #[derive(Debug, Error)]
//! pub enum Error {
//!     #[error("assembly failed: {0}")]
//!     Assembly(#[from] AsmError),
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - Fields not mentioned in the message are simply not formatted
//! - `#[from]` on the only field of a variant: `From` impl plus `source()`
//! - `#[source]` on any field: reported through `source()`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::new();
            let mut source_arms = Vec::new();
            let mut from_impls = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message(variant)?;
                let path = quote! { Self::#variant_name };

                display_arms.push(display_arm(&path, &variant.fields, &error_msg));

                if let Some(arm) = source_arm(&path, &variant.fields) {
                    source_arms.push(arm);
                }

                if let Some(from) = from_impl(name, variant_name, &variant.fields)? {
                    from_impls.push(from);
                }
            }

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                    #[allow(unreachable_patterns)]
                    fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                        match self {
                            #(#source_arms)*
                            _ => ::std::option::Option::None,
                        }
                    }
                }

                #(#from_impls)*
            })
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;
            let path = quote! { Self };
            let display_arm = display_arm(&path, &data_struct.fields, &error_msg);

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #display_arm
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Builds a `pattern => write!(...)` arm binding only the fields the message mentions.
fn display_arm(path: &TokenStream2, fields: &Fields, error_msg: &str) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! {
            #path => write!(f, #error_msg),
        },
        Fields::Unnamed(unnamed) => {
            let mut bindings = Vec::new();
            let mut used = Vec::new();
            for i in 0..unnamed.unnamed.len() {
                if mentions(error_msg, &i.to_string()) {
                    let ident = format_ident!("f{}", i);
                    bindings.push(quote! { #ident });
                    used.push(ident);
                } else {
                    bindings.push(quote! { _ });
                }
            }
            let format_str = convert_positional_to_named(error_msg, unnamed.unnamed.len());
            quote! {
                #path(#(#bindings),*) => write!(f, #format_str, #(#used = #used),*),
            }
        }
        Fields::Named(named) => {
            let used: Vec<&Ident> = named
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .filter(|ident| mentions(error_msg, &ident.to_string()))
                .collect();
            quote! {
                #path { #(#used,)* .. } => write!(f, #error_msg, #(#used = #used),*),
            }
        }
    }
}

/// Builds the `source()` arm for a variant with a `#[from]` or `#[source]` field.
fn source_arm(path: &TokenStream2, fields: &Fields) -> Option<TokenStream2> {
    match fields {
        Fields::Unit => None,
        Fields::Unnamed(unnamed) => {
            let index = unnamed
                .unnamed
                .iter()
                .position(|field| has_attr(&field.attrs, "from") || has_attr(&field.attrs, "source"))?;
            let bindings = (0..unnamed.unnamed.len()).map(|i| {
                if i == index {
                    quote! { source }
                } else {
                    quote! { _ }
                }
            });
            Some(quote! {
                #path(#(#bindings),*) => ::std::option::Option::Some(source as &(dyn ::std::error::Error + 'static)),
            })
        }
        Fields::Named(named) => {
            let ident = named
                .named
                .iter()
                .find(|field| has_attr(&field.attrs, "from") || has_attr(&field.attrs, "source"))?
                .ident
                .as_ref()?;
            Some(quote! {
                #path { #ident, .. } => ::std::option::Option::Some(#ident as &(dyn ::std::error::Error + 'static)),
            })
        }
    }
}

/// Generates `impl From<T> for Enum` for a single-field variant marked `#[from]`.
fn from_impl(
    enum_name: &Ident,
    variant_name: &Ident,
    fields: &Fields,
) -> syn::Result<Option<TokenStream2>> {
    let (field, named) = match fields {
        Fields::Unit => return Ok(None),
        Fields::Unnamed(unnamed) => match unnamed.unnamed.iter().find(|f| has_attr(&f.attrs, "from")) {
            Some(field) if unnamed.unnamed.len() == 1 => (field, false),
            Some(field) => {
                return Err(syn::Error::new_spanned(
                    field,
                    "#[from] requires the variant to have exactly one field",
                ));
            }
            None => return Ok(None),
        },
        Fields::Named(named) => match named.named.iter().find(|f| has_attr(&f.attrs, "from")) {
            Some(field) if named.named.len() == 1 => (field, true),
            Some(field) => {
                return Err(syn::Error::new_spanned(
                    field,
                    "#[from] requires the variant to have exactly one field",
                ));
            }
            None => return Ok(None),
        },
    };

    let ty = &field.ty;
    let construct = if named {
        let ident = &field.ident;
        quote! { #enum_name::#variant_name { #ident: source } }
    } else {
        quote! { #enum_name::#variant_name(source) }
    };

    Ok(Some(quote! {
        impl ::std::convert::From<#ty> for #enum_name {
            fn from(source: #ty) -> Self {
                #construct
            }
        }
    }))
}

fn has_attr(attrs: &[syn::Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Returns true if `message` interpolates the argument `arg` (`{arg}` or `{arg:...}`).
fn mentions(message: &str, arg: &str) -> bool {
    message.contains(&format!("{{{arg}}}")) || message.contains(&format!("{{{arg}:"))
}

/// Extracts the error message from a variant's `#[error("...")]` attribute.
fn extract_error_message(variant: &syn::Variant) -> syn::Result<String> {
    let variant_name = variant.ident.to_string();
    extract_error_message_from_attrs(
        &variant.attrs,
        &variant.ident,
        &format!("variant `{}`", variant_name),
    )
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            if let Meta::List(meta_list) = &attr.meta {
                let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
                    syn::Error::new_spanned(
                        &attr.meta,
                        "failed to parse #[error] attribute; expected a string literal like #[error(\"line {line}: not a number\")]",
                    )
                })?;

                if let Lit::Str(lit_str) = lit {
                    return Ok(lit_str.value());
                }

                return Err(syn::Error::new_spanned(
                    &attr.meta,
                    "invalid #[error] attribute: message must be a string literal, e.g. #[error(\"invalid word: {0}\")]",
                ));
            }

            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        }
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Converts positional format args `{0}`, `{1:?}` to named args `{f0}`, `{f1:?}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
