use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, LitStr, Type, ext::IdentExt};

use crate::serde_attr::{SerdeAttrs, apply_rename_rule};

const KINDS: [&str; 8] = [
    "string",
    "int",
    "float32",
    "float64",
    "bool",
    "array",
    "objectId",
    "objectIdArray",
];

pub fn derive_query_params(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    match expand(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "QueryParams can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                ident,
                "QueryParams can only be derived for structs with named fields",
            ));
        }
    };

    let container = SerdeAttrs::parse(&input.attrs)?;
    let mut declarations = Vec::with_capacity(fields.len());

    for field in fields {
        let serde = SerdeAttrs::parse(&field.attrs)?;
        if serde.skip_deserializing {
            continue;
        }

        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };

        let kind = transform_kind(field)?;

        if kind.value() == "bool" && !is_option(&field.ty) && !serde.default && !container.default {
            return Err(Error::new_spanned(
                &field.ty,
                "a `bool` transform field must be an `Option` or carry #[serde(default)]",
            ));
        }

        let name = field_ident.unraw().to_string();
        let key = match (&serde.rename, &container.rename_all) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => apply_rename_rule(rule, &name)?,
            (None, None) => name,
        };

        declarations.push(quote! {
            ::docbase::transform::FieldDeclaration { key: #key, kind: #kind }
        });
    }

    Ok(quote! {
        impl #impl_generics ::docbase::transform::QueryParams for #ident #ty_generics #where_clause {
            fn declarations() -> &'static [::docbase::transform::FieldDeclaration] {
                const DECLARATIONS: &[::docbase::transform::FieldDeclaration] = &[
                    #(#declarations),*
                ];
                DECLARATIONS
            }
        }
    })
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option"),
        _ => false,
    }
}

fn transform_kind(field: &syn::Field) -> syn::Result<LitStr> {
    let mut attrs = field.attrs.iter().filter(|attr| attr.path().is_ident("transform"));

    let Some(attr) = attrs.next() else {
        return Err(Error::new_spanned(
            field,
            "missing #[transform(\"...\")] attribute; every query field declares a transform kind",
        ));
    };

    if let Some(duplicate) = attrs.next() {
        return Err(Error::new_spanned(duplicate, "duplicate #[transform] attribute"));
    }

    let kind: LitStr = attr.parse_args()?;

    if !KINDS.contains(&kind.value().as_str()) {
        return Err(Error::new_spanned(
            &kind,
            format!(
                "invalid query transform `{}`, expected one of: {}",
                kind.value(),
                KINDS.join(", ")
            ),
        ));
    }

    Ok(kind)
}
