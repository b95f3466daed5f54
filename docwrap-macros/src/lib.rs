//! Procedural macros for the docwrap project.
//!
//! `#[derive(Record)]` implements `docwrap::record::Record` for a struct with
//! named fields:
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! #[record(collection = "users")]
//! pub struct User {
//!     #[record(id)]
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     #[record(modified)]
//!     pub modified: Option<DateTime>,
//!     pub email: String,
//! }
//! ```
//!
//! Without `#[record(id)]` a field named `id` is used. The id field may be an
//! `ObjectId` or an `Option<ObjectId>`; the latter is filled on first save.

#[allow(unused_extern_crates)]
extern crate self as docwrap_macros;

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Fields, Ident, LitStr, Result, Type,
    parse_macro_input, spanned::Spanned,
};

#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_record(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

struct RecordField {
    ident: Ident,
    optional: bool,
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option"),
        _ => false,
    }
}

fn collection_name(input: &DeriveInput) -> Result<LitStr> {
    let mut collection = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let name: LitStr = meta.value()?.parse()?;
                if name.value().trim().is_empty() {
                    return Err(meta.error("collection name must not be empty"));
                }
                collection = Some(name);
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `collection = \"...\"`"))
            }
        })?;
    }

    collection.ok_or_else(|| {
        Error::new(input.ident.span(), "missing `#[record(collection = \"...\")]` attribute")
    })
}

fn marked_fields(input: &DeriveInput) -> Result<(RecordField, Option<RecordField>)> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Err(Error::new(input.span(), "Record can only be derived for structs with named fields")),
        },
        _ => return Err(Error::new(input.span(), "Record can only be derived for structs")),
    };

    let mut id = None;
    let mut modified = None;
    let mut fallback_id = None;

    for field in fields {
        let Some(ident) = field.ident.clone() else { continue };
        let optional = is_option(&field.ty);

        if ident == "id" {
            fallback_id = Some(RecordField { ident: ident.clone(), optional });
        }

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    if id.is_some() {
                        return Err(meta.error("only one field may be marked `#[record(id)]`"));
                    }
                    id = Some(RecordField { ident: ident.clone(), optional });
                    Ok(())
                } else if meta.path.is_ident("modified") {
                    if modified.is_some() {
                        return Err(meta.error("only one field may be marked `#[record(modified)]`"));
                    }
                    modified = Some(RecordField { ident: ident.clone(), optional });
                    Ok(())
                } else {
                    Err(meta.error("unsupported record field attribute, expected `id` or `modified`"))
                }
            })?;
        }
    }

    let id = id.or(fallback_id).ok_or_else(|| {
        Error::new(input.ident.span(), "no id field, mark one with `#[record(id)]`")
    })?;

    Ok((id, modified))
}

fn expand_record(input: DeriveInput) -> Result<proc_macro2::TokenStream> {
    let collection = collection_name(&input)?;
    let (id, modified) = marked_fields(&input)?;

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let id_ident = &id.ident;
    let make_id = if id.optional {
        quote! { *self.#id_ident.get_or_insert_with(::docwrap::bson::oid::ObjectId::new) }
    } else {
        quote! { self.#id_ident }
    };

    let stamp_modified = modified.map(|field| {
        let ident = &field.ident;
        let assign = if field.optional {
            quote! { self.#ident = ::core::option::Option::Some(at); }
        } else {
            quote! { self.#ident = at; }
        };

        quote! {
            fn stamp_modified(&mut self, at: ::docwrap::bson::DateTime) {
                #assign
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::docwrap::record::Record for #name #ty_generics #where_clause {
            fn collection_name() -> &'static str {
                #collection
            }

            fn make_id(&mut self) -> ::docwrap::bson::oid::ObjectId {
                #make_id
            }

            #stamp_modified
        }
    })
}
