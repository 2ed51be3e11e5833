use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse2, Attribute, DeriveInput, Error, Expr, LitStr, Result};

use crate::add_trait_bounds;

pub(super) fn derive_message(item: TokenStream) -> Result<TokenStream> {
    let mut input = parse2::<DeriveInput>(item)?;

    let Some(attr) = parse_message_helper_attr(&input.attrs)? else {
        return Err(Error::new(
            input.span(),
            "missing `#[message(...)]` helper attribute",
        ));
    };

    let Some(kind) = attr.kind else {
        return Err(Error::new(
            attr.span,
            "missing `kind = ...` value from `message` helper attribute",
        ));
    };

    let Some(side) = attr.side else {
        return Err(Error::new(
            attr.span,
            "missing `side = ...` value from `message` helper attribute",
        ));
    };

    let type_name = input.ident;

    let name_str = match attr.name {
        Some(name) => name.value(),
        None => type_name.to_string(),
    };

    add_trait_bounds(&mut input.generics, quote!(::std::fmt::Debug));

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::ichor_protocol::__private::Message for #type_name #ty_generics
        #where_clause
        {
            const KIND: ::ichor_protocol::MessageKind = #kind;
            const NAME: &'static str = #name_str;
            const SIDE: ::ichor_protocol::MessageSide = #side;
        }
    })
}

struct MessageAttr {
    span: proc_macro2::Span,
    kind: Option<Expr>,
    side: Option<Expr>,
    name: Option<LitStr>,
}

fn parse_message_helper_attr(attrs: &[Attribute]) -> Result<Option<MessageAttr>> {
    for attr in attrs {
        if attr.path().is_ident("message") {
            let mut res = MessageAttr {
                span: attr.span(),
                kind: None,
                side: None,
                name: None,
            };

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("kind") {
                    res.kind = Some(meta.value()?.parse::<Expr>()?);
                    Ok(())
                } else if meta.path.is_ident("side") {
                    res.side = Some(meta.value()?.parse::<Expr>()?);
                    Ok(())
                } else if meta.path.is_ident("name") {
                    res.name = Some(meta.value()?.parse::<LitStr>()?);
                    Ok(())
                } else {
                    Err(meta.error("unrecognized #[message(...)] argument"))
                }
            })?;

            return Ok(Some(res));
        }
    }

    Ok(None)
}
