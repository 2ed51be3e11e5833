//! Derive macros for `Encode`, `Decode`, and `Message`.
//!
//! See `ichor_protocol`'s documentation for more information.

use proc_macro::TokenStream as StdTokenStream;
use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::{parse_quote, Error, Expr, GenericParam, Generics, Lifetime, LifetimeParam, Lit, Result, Variant};

mod decode;
mod encode;
mod message;

#[proc_macro_derive(Encode)]
pub fn derive_encode(item: StdTokenStream) -> StdTokenStream {
    match encode::derive_encode(item.into()) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.into_compile_error().into(),
    }
}

#[proc_macro_derive(Decode)]
pub fn derive_decode(item: StdTokenStream) -> StdTokenStream {
    match decode::derive_decode(item.into()) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.into_compile_error().into(),
    }
}

#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(item: StdTokenStream) -> StdTokenStream {
    match message::derive_message(item.into()) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.into_compile_error().into(),
    }
}

/// Enum variants are tagged on the wire with a leading `u8`. Explicit Rust
/// discriminants (`Variant = 3`) set the tag; variants without one continue
/// counting from the previous tag.
fn pair_variants_with_discriminants(
    variants: impl IntoIterator<Item = Variant>,
) -> Result<Vec<(u8, Variant)>> {
    let mut discriminant = 0u16;
    variants
        .into_iter()
        .map(|v| {
            if let Some((_, expr)) = &v.discriminant {
                let Expr::Lit(lit) = expr else {
                    return Err(Error::new_spanned(
                        expr,
                        "discriminant must be an integer literal",
                    ));
                };
                let Lit::Int(int) = &lit.lit else {
                    return Err(Error::new_spanned(
                        lit,
                        "discriminant must be an integer literal",
                    ));
                };
                discriminant = int.base10_parse::<u16>()?;
            }

            if discriminant > u8::MAX as u16 {
                return Err(Error::new_spanned(
                    &v,
                    "enum discriminant does not fit in the u8 wire tag",
                ));
            }

            let pair = (discriminant as u8, v);
            discriminant += 1;
            Ok(pair)
        })
        .collect::<Result<_>>()
}

/// Adding our lifetime to the generics before calling `.split_for_impl()`
/// would also add it to the resulting ty_generics, which we don't want. So
/// I'm doing this hack.
fn decode_split_for_impl(
    mut generics: Generics,
    lifetime: Lifetime,
) -> (TokenStream, TokenStream, TokenStream) {
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut impl_generics = impl_generics.to_token_stream();
    let ty_generics = ty_generics.to_token_stream();
    let where_clause = where_clause.to_token_stream();

    if generics.lifetimes().next().is_none() {
        generics
            .params
            .push(GenericParam::Lifetime(LifetimeParam::new(lifetime)));

        impl_generics = generics.split_for_impl().0.to_token_stream();
    }

    (impl_generics, ty_generics, where_clause)
}

fn add_trait_bounds(generics: &mut Generics, trait_: TokenStream) {
    for param in &mut generics.params {
        if let GenericParam::Type(type_param) = param {
            type_param.bounds.push(parse_quote!(#trait_))
        }
    }
}
