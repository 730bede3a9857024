use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::ItemFn;
use syn::parse::Parser;
use syn::spanned::Spanned;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

/// Config used when the attribute arguments are invalid, so the expansion
/// stays close to the real thing while the error is reported.
const DEFAULT_ERROR_CONFIG: FinalConfig = FinalConfig {
    queue_capacity: None,
    unhandled_panic: None,
};

const KNOWN_OPTIONS: &str = "`queue_capacity`, `unhandled_panic`";

/// Expands
///
/// ```rust,no_run
/// #[turnstile::main(queue_capacity = 64)]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// where `args` is everything between the attribute's parentheses and `item`
/// is the annotated function.
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        let msg = "the main function cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.ident, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, false))
    };

    match config {
        Ok(config) => parse_knobs(input, false, config),
        Err(e) => token_stream_with_error(parse_knobs(input, false, DEFAULT_ERROR_CONFIG), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, true))
    };

    match config {
        Ok(config) => parse_knobs(input, true, config),
        Err(e) => token_stream_with_error(parse_knobs(input, true, DEFAULT_ERROR_CONFIG), e),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum UnhandledPanic {
    Abort,
    Propagate,
}

impl UnhandledPanic {
    fn from_str(s: &str) -> Result<UnhandledPanic, String> {
        match s {
            "abort" => Ok(UnhandledPanic::Abort),
            "propagate" => Ok(UnhandledPanic::Propagate),
            _ => Err(format!(
                "No such unhandled panic behavior `{s}`. The behaviors are `abort` and `propagate`."
            )),
        }
    }

    fn to_tokens(self, span: Span) -> TokenStream {
        match self {
            UnhandledPanic::Abort => quote_spanned! {span=>
                turnstile::runtime::UnhandledPanic::Abort
            },
            UnhandledPanic::Propagate => quote_spanned! {span=>
                turnstile::runtime::UnhandledPanic::Propagate
            },
        }
    }
}

struct FinalConfig {
    queue_capacity: Option<usize>,
    unhandled_panic: Option<UnhandledPanic>,
}

struct ConfigBuilder {
    queue_capacity: Option<usize>,
    unhandled_panic: Option<UnhandledPanic>,
}

impl ConfigBuilder {
    fn new() -> Self {
        ConfigBuilder {
            queue_capacity: None,
            unhandled_panic: None,
        }
    }

    fn set_queue_capacity(&mut self, lit: &syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.queue_capacity.is_some() {
            return Err(syn::Error::new(span, "`queue_capacity` set multiple times."));
        }

        let capacity = parse_int(lit, span, "queue_capacity")?;
        if capacity == 0 {
            return Err(syn::Error::new(span, "`queue_capacity` may not be 0."));
        }
        self.queue_capacity = Some(capacity);

        Ok(())
    }

    fn set_unhandled_panic(&mut self, lit: &syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.unhandled_panic.is_some() {
            return Err(syn::Error::new(span, "`unhandled_panic` set multiple times."));
        }

        let behavior = parse_string(lit, span, "unhandled_panic")?;
        let behavior =
            UnhandledPanic::from_str(&behavior).map_err(|err| syn::Error::new(span, err))?;
        self.unhandled_panic = Some(behavior);

        Ok(())
    }

    fn build(self) -> FinalConfig {
        FinalConfig {
            queue_capacity: self.queue_capacity,
            unhandled_panic: self.unhandled_panic,
        }
    }
}

fn build_config(
    input: &ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    let macro_name = if is_test {
        "turnstile::test"
    } else {
        "turnstile::main"
    };
    let mut config = ConfigBuilder::new();

    for arg in args {
        match arg {
            syn::Meta::NameValue(namevalue) => {
                let ident = namevalue
                    .path
                    .get_ident()
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&namevalue, "Must have specified ident")
                    })?
                    .to_string()
                    .to_lowercase();
                let lit = match &namevalue.value {
                    syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
                    expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
                };
                match ident.as_str() {
                    "queue_capacity" => config.set_queue_capacity(lit, lit.span())?,
                    "unhandled_panic" => config.set_unhandled_panic(lit, lit.span())?,
                    name => {
                        let msg = format!(
                            "Unknown attribute {name} is specified; expected one of: {KNOWN_OPTIONS}"
                        );
                        return Err(syn::Error::new_spanned(namevalue, msg));
                    }
                }
            }
            syn::Meta::Path(path) => {
                let name = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&path, "Must have specified ident"))?
                    .to_string()
                    .to_lowercase();
                let msg = match name.as_str() {
                    "queue_capacity" | "unhandled_panic" => {
                        format!("The `{name}` attribute requires an argument, e.g. #[{macro_name}({name} = ...)].")
                    }
                    name => {
                        format!("Unknown attribute {name} is specified; expected one of: {KNOWN_OPTIONS}.")
                    }
                };
                return Err(syn::Error::new_spanned(path, msg));
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Unknown attribute inside the macro",
                ));
            }
        }
    }

    Ok(config.build())
}

fn parse_knobs(mut input: ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    input.sig.asyncness = None;

    // Inner attributes are not allowed where the body is expanded, lift them
    // onto the function.
    for attr in &mut input.attrs {
        attr.style = syn::AttrStyle::Outer;
    }

    // If type mismatch occurs, the current rustc points to the last statement.
    let last_stmt_span = input
        .block
        .stmts
        .last()
        .map_or_else(Span::call_site, |stmt| stmt.span());

    let mut rt = quote_spanned! {last_stmt_span=>
        turnstile::runtime::Builder::new_local()
    };

    if let Some(capacity) = config.queue_capacity {
        rt = quote_spanned! {last_stmt_span=> #rt.queue_capacity(#capacity) };
    }

    if let Some(behavior) = config.unhandled_panic {
        let behavior = behavior.to_tokens(last_stmt_span);
        rt = quote_spanned! {last_stmt_span=> #rt.unhandled_panic(#behavior) };
    }

    let generated_attrs = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    // This explicit `return` is intentional. See tokio-rs/tokio#4636
    let last_block = quote_spanned! {last_stmt_span=>
        #[allow(clippy::expect_used, clippy::needless_return)]
        {
            return #rt
                .try_build()
                .expect("Failed building the Runtime")
                .block_on(body);
        }
    };

    let block = &input.block;

    // Tests pin the body and erase its type, so `Runtime::block_on` is only
    // instantiated once per output type across the whole test binary.
    let body = if is_test {
        let output_type = match &input.sig.output {
            syn::ReturnType::Default => quote! { () },
            syn::ReturnType::Type(_, ret_type) => quote! { #ret_type },
        };
        quote! {
            let unpinned = async #block;
            let pinned = ::core::pin::pin!(unpinned);
            let body: ::core::pin::Pin<&mut dyn ::core::future::Future<Output = #output_type>> = pinned;
        }
    } else {
        quote! {
            let body = async #block;
        }
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;

    quote! {
        #(#attrs)*
        #generated_attrs
        #vis #sig {
            #body
            #last_block
        }
    }
}
