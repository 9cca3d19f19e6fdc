use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error, LitStr};

pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    match expand(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error(),
    }
}

#[derive(Default)]
struct EntityAttrs {
    collection: Option<LitStr>,
    timestamps: Option<(String, String)>,
}

fn parse_attrs(input: &DeriveInput) -> syn::Result<EntityAttrs> {
    let mut parsed = EntityAttrs::default();

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                parsed.collection = Some(meta.value()?.parse()?);
                return Ok(());
            }

            if meta.path.is_ident("timestamps") {
                let mut created = "createdAt".to_string();
                let mut updated = "updatedAt".to_string();

                if !meta.input.is_empty() && !meta.input.peek(syn::Token![,]) {
                    meta.parse_nested_meta(|field| {
                        let name: LitStr = field.value()?.parse()?;
                        if field.path.is_ident("created") {
                            created = name.value();
                        } else if field.path.is_ident("updated") {
                            updated = name.value();
                        } else {
                            return Err(field.error("expected `created` or `updated`"));
                        }
                        Ok(())
                    })?;
                }

                parsed.timestamps = Some((created, updated));
                return Ok(());
            }

            Err(meta.error("expected `collection = \"...\"` or `timestamps`"))
        })?;
    }

    Ok(parsed)
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let attrs = parse_attrs(input)?;

    let Some(collection) = attrs.collection else {
        return Err(Error::new_spanned(
            ident,
            "missing #[entity(collection = \"...\")] attribute",
        ));
    };

    let timestamps = attrs.timestamps.map(|(created, updated)| {
        quote! {
            const TIMESTAMPS: ::core::option::Option<::docbase::document::TimestampFields> =
                ::core::option::Option::Some(::docbase::document::TimestampFields {
                    created_at: #created,
                    updated_at: #updated,
                });
        }
    });

    Ok(quote! {
        impl #impl_generics ::docbase::document::Entity for #ident #ty_generics #where_clause {
            #timestamps

            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}
