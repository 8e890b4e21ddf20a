//! Test attribute to run async integration tests on the shared runtime.
//!
//! Apply `#[shared_runtime_test]` to an async test function. It expands to a
//! synchronous `#[test]` that executes the body on
//! `crate::common::test_db::run_test`, bounded by a timeout so a hung
//! container or stuck lease cannot stall the whole suite.
//!
//! ```ignore
//! #[shared_runtime_test]
//! async fn claims_in_order() { /* ... */ }
//!
//! #[shared_runtime_test(timeout_secs = 30)]
//! async fn quick_check() { /* ... */ }
//! ```
use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input,
    spanned::Spanned,
    Ident, ItemFn, LitInt, Meta, Token,
};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

struct Args {
    timeout_secs: u64,
}

impl Parse for Args {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            });
        }

        let key: Ident = input.parse()?;
        if key != "timeout_secs" {
            return Err(syn::Error::new(
                key.span(),
                "expected `timeout_secs = <seconds>`",
            ));
        }
        input.parse::<Token![=]>()?;
        let value: LitInt = input.parse()?;
        let timeout_secs = value.base10_parse::<u64>()?;
        if timeout_secs == 0 {
            return Err(syn::Error::new(value.span(), "timeout_secs must be positive"));
        }
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after timeout_secs"));
        }

        Ok(Self { timeout_secs })
    }
}

/// Marks an async function as a test that runs on the shared database runtime.
#[proc_macro_attribute]
pub fn shared_runtime_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let Args { timeout_secs } = parse_macro_input!(attr as Args);

    let input_fn = parse_macro_input!(item as ItemFn);

    if input_fn.sig.asyncness.is_none() {
        return syn::Error::new(
            input_fn.sig.span(),
            "shared_runtime_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }

    if !input_fn.sig.inputs.is_empty() {
        return syn::Error::new(
            input_fn.sig.inputs.span(),
            "shared_runtime_test functions cannot accept arguments",
        )
        .to_compile_error()
        .into();
    }

    if !input_fn.sig.generics.params.is_empty() {
        return syn::Error::new(
            input_fn.sig.generics.span(),
            "shared_runtime_test does not support generic parameters",
        )
        .to_compile_error()
        .into();
    }

    if !matches!(input_fn.sig.output, syn::ReturnType::Default) {
        return syn::Error::new(
            input_fn.sig.output.span(),
            "shared_runtime_test functions must return ()",
        )
        .to_compile_error()
        .into();
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input_fn;

    let name = sig.ident;
    let label = name.to_string();

    let filtered_attrs = attrs.into_iter().filter(
        |attr| !matches!(attr.meta, Meta::Path(ref path) if path.is_ident("shared_runtime_test")),
    );

    TokenStream::from(quote! {
        #(#filtered_attrs)*
        #[test]
        #vis fn #name() {
            crate::common::test_db::run_test(async {
                let limit = ::std::time::Duration::from_secs(#timeout_secs);
                if ::tokio::time::timeout(limit, async #block).await.is_err() {
                    panic!("{} did not finish within {:?}", #label, limit);
                }
            })
        }
    })
}
