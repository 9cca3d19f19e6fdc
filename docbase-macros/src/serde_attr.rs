use syn::{Attribute, LitStr, Token, meta::ParseNestedMeta, parenthesized};

/// The subset of serde attributes that decides wire keys.
#[derive(Default)]
pub struct SerdeAttrs {
    pub rename: Option<String>,
    pub rename_all: Option<LitStr>,
    pub skip_deserializing: bool,
    /// `default` or `default = "path"`.
    pub default: bool,
}

impl SerdeAttrs {
    pub fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = SerdeAttrs::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    parsed.rename = parse_rename(&meta)?.map(|lit| lit.value());
                } else if meta.path.is_ident("rename_all") {
                    parsed.rename_all = parse_rename(&meta)?;
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    parsed.skip_deserializing = true;
                } else if meta.path.is_ident("default") {
                    parsed.default = true;
                    skip_meta(&meta)?;
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}

// `rename = "x"` or `rename(deserialize = "x")`; only the deserialize side matters.
fn parse_rename(meta: &ParseNestedMeta) -> syn::Result<Option<LitStr>> {
    if meta.input.peek(Token![=]) {
        return Ok(Some(meta.value()?.parse()?));
    }

    let mut deserialize = None;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("deserialize") {
            deserialize = Some(nested.value()?.parse()?);
        } else {
            skip_meta(&nested)?;
        }
        Ok(())
    })?;

    Ok(deserialize)
}

fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        parenthesized!(_content in meta.input);
    }
    Ok(())
}

/// Applies a serde `rename_all` rule to a snake_case field name.
pub fn apply_rename_rule(rule: &LitStr, field: &str) -> syn::Result<String> {
    let words = field.split('_').filter(|w| !w.is_empty());

    let renamed = match rule.value().as_str() {
        "lowercase" => field.to_ascii_lowercase(),
        "UPPERCASE" => field.to_ascii_uppercase(),
        "snake_case" => field.to_string(),
        "SCREAMING_SNAKE_CASE" => field.to_ascii_uppercase(),
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_ascii_uppercase(),
        "PascalCase" => words.map(capitalize).collect(),
        "camelCase" => {
            let pascal: String = words.map(capitalize).collect();
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        other => {
            return Err(syn::Error::new_spanned(
                rule,
                format!("unsupported serde rename_all rule `{other}`"),
            ));
        }
    };

    Ok(renamed)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
