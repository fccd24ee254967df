//! Steplog Proc Macros
//!
//! This crate provides the `#[loggable]` attribute that turns one function
//! body containing record operations into a dual-mode function: a plain form
//! that runs the body as ordinary code, and recording forms that also build
//! a nested record of the values the body marks.
//!
//! Use it through `steplog-core`, which re-exports the attribute and provides
//! the runtime types the generated code refers to.
//!
//! # Example
//!
//! ```ignore
//! use steplog_core::loggable;
//!
//! #[loggable]
//! fn dynamics(theta: f64, omega: f64) -> (f64, f64) {
//!     let u = nested_log!(controller: control(theta));
//!     log!(alpha = -theta.sin() + u);
//!     only_log!(energy = 0.5 * omega * omega);
//!     (omega, alpha)
//! }
//! ```

use proc_macro::TokenStream;

mod loggable;
mod parsing;
mod rewrite;

/// Dual-mode step function attribute
///
/// The annotated body may use four record operations, which are not real
/// macros and only exist inside a `#[loggable]` body:
///
/// - `log!(x)`, `log!(y = expr)`, `log!((a, b) = expr)`: record values
///   under their identifier names
/// - `only_log!(...)`: same shapes, evaluated only while recording
/// - `nested_log!(f(args))`, `nested_log!(sub: f(args))`: call another
///   `#[loggable]` function and merge its record, flat or under `sub`
/// - `nested_log!(sub: x)`, `nested_log!(sub: y = expr)`: any operand other
///   than a single call takes the `log!` shapes and is recorded into a child
///   record, merged flat or under `sub`
/// - `nested_only_log!(...)`: same shapes, evaluated only while recording
///
/// # Generated Code
///
/// For `fn name(args) -> T` the attribute emits:
/// - `name(args) -> T`: the plain form
/// - `name_with_context(args, &mut Context<'_>) -> Result<T, RecordError>`
/// - `name_recorded(args) -> Result<Record, RecordError>`
/// - `name_traced(args) -> Result<(T, Record), RecordError>`
///
/// When a free function's output borrows through an elided lifetime,
/// `name_with_context` names it so the extra parameter keeps the signature
/// valid.
///
/// `return`, `?`, `try!`, `bail!` and `ensure!` are rejected in the body: the
/// recording forms hand back the record only once the body falls through.
/// Other macro invocations are opaque and are not inspected.
#[proc_macro_attribute]
pub fn loggable(attr: TokenStream, item: TokenStream) -> TokenStream {
    match loggable::expand(attr.into(), item.into()) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
