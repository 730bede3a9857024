#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Attribute macros that run an async function on a turnstile runtime.

mod entry;
mod parse;

/// Runs the async `main` function on a local turnstile runtime.
///
/// The function body becomes the root future given to `Runtime::block_on`:
/// it runs alongside every task it spawns, and `main` returns once the body
/// is done and the ready queue is drained.
///
/// # Options
///
/// - `queue_capacity = N`: capacity of the ready queue, must be greater
///   than 0. Defaults to 256.
/// - `unhandled_panic = "abort" | "propagate"`: what happens when a task
///   body panics. Defaults to `"abort"`.
///
/// Function arguments are not allowed.
///
/// # Usage
///
/// ```rust
/// #[turnstile::main(queue_capacity = 64)]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[turnstile::main]`
///
/// ```rust
/// fn main() {
///     turnstile::runtime::Builder::new_local()
///         .queue_capacity(64)
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             println!("Hello world");
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Runs an async test on its own local turnstile runtime.
///
/// Accepts the same options as [`macro@main`]. Each test gets a fresh
/// runtime, so tests never share a ready queue.
///
/// ```no_run
/// #[turnstile::test(unhandled_panic = "propagate")]
/// async fn my_test() {
///     turnstile::yield_now().await;
/// }
/// ```
///
/// Equivalent code not using `#[turnstile::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     turnstile::runtime::Builder::new_local()
///         .unhandled_panic(turnstile::runtime::UnhandledPanic::Propagate)
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             turnstile::yield_now().await;
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
