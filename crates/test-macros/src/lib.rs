use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Ident, ItemFn, LitInt, Token};

/// Time limit applied when none is given.
const DEFAULT_TIMEOUT_SECS: u64 = 1;

/// `#[timed_test]`, `#[timed_test(30)]` or `#[timed_test(timeout = 30)]`.
struct TimedArgs {
    timeout_secs: u64,
}

impl Parse for TimedArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            });
        }
        if input.peek(Ident) {
            let key: Ident = input.parse()?;
            if key != "timeout" {
                return Err(syn::Error::new(key.span(), "expected `timeout = <seconds>`"));
            }
            input.parse::<Token![=]>()?;
        }
        let lit: LitInt = input.parse()?;
        let timeout_secs = lit.base10_parse::<u64>()?;
        if timeout_secs == 0 {
            return Err(syn::Error::new(lit.span(), "timeout must be at least one second"));
        }
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after timeout"));
        }
        Ok(Self { timeout_secs })
    }
}

/// `#[test]` with a wall-clock budget.
///
/// The body runs to completion; its elapsed time goes to stderr and the
/// test fails if it ran past the budget (one second unless given). A panic
/// inside the body is re-raised after the timing line is printed.
///
/// ```ignore
/// use test_macros::timed_test;
///
/// #[timed_test]
/// fn quick() {}
///
/// #[timed_test(30)]
/// fn solver_smoke() {}
///
/// #[timed_test(timeout = 30)]
/// fn same_thing() {}
/// ```
#[proc_macro_attribute]
pub fn timed_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let TimedArgs { timeout_secs } = parse_macro_input!(attr as TimedArgs);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if let Some(asyncness) = &sig.asyncness {
        return syn::Error::new_spanned(asyncness, "timed_test does not support async tests")
            .to_compile_error()
            .into();
    }
    let name = &sig.ident;

    quote! {
        #(#attrs)*
        #[test]
        #vis fn #name() {
            let __budget = ::std::time::Duration::from_secs(#timeout_secs);
            let __start = ::std::time::Instant::now();
            let __outcome = ::std::panic::catch_unwind(
                ::std::panic::AssertUnwindSafe(|| #block)
            );
            let __elapsed = __start.elapsed();

            eprintln!(
                "[timed] {} {:.3}s / {}s",
                stringify!(#name),
                __elapsed.as_secs_f64(),
                #timeout_secs,
            );

            if let ::std::result::Result::Err(__payload) = __outcome {
                ::std::panic::resume_unwind(__payload);
            }
            assert!(
                __elapsed < __budget,
                "[timed] {} ran {:.3}s, over its {}s budget",
                stringify!(#name),
                __elapsed.as_secs_f64(),
                #timeout_secs,
            );
        }
    }
    .into()
}
