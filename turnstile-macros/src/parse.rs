use proc_macro2::{Span, TokenStream};
use syn::{Attribute, Lit, Meta};

pub(crate) fn parse_string(lit: &Lit, span: Span, field: &str) -> Result<String, syn::Error> {
    match lit {
        Lit::Str(s) => Ok(s.value()),
        _ => Err(syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as string."),
        )),
    }
}

pub(crate) fn parse_int(lit: &Lit, span: Span, field: &str) -> Result<usize, syn::Error> {
    let Lit::Int(int) = lit else {
        return Err(syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as integer."),
        ));
    };

    int.base10_parse::<usize>().map_err(|e| {
        syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as integer: {e}"),
        )
    })
}

/// Returns true for `#[test]` and its fully qualified prelude forms.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let Meta::Path(path) = &attr.meta else {
        return false;
    };

    let idents: Vec<String> = path
        .segments
        .iter()
        .filter(|segment| segment.arguments.is_none())
        .map(|segment| segment.ident.to_string())
        .collect();

    if idents.len() != path.segments.len() {
        return false;
    }

    match idents.as_slice() {
        [name] => path.leading_colon.is_none() && name == "test",
        [root, prelude, _edition, name] => {
            (root == "core" || root == "std") && prelude == "prelude" && name == "test"
        }
        _ => false,
    }
}

pub(crate) fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}
