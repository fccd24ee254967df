//! `#[loggable]` expansion: one annotated function in, four forms out.

use crate::rewrite::{self, ctx_ident, Mode, WITH_CONTEXT_SUFFIX};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::{
    parse_quote, Attribute, FnArg, GenericParam, ItemFn, Lifetime, LifetimeParam, ReturnType,
    Signature, TypeReference,
};

/// Expand `#[loggable]` applied to `item`
pub fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new_spanned(attr, "#[loggable] takes no arguments"));
    }
    let function: ItemFn = syn::parse2(item)?;
    LoggableFn::new(function)?.generate()
}

struct LoggableFn {
    function: ItemFn,
}

impl LoggableFn {
    fn new(function: ItemFn) -> syn::Result<Self> {
        let sig = &function.sig;
        if let Some(token) = &sig.asyncness {
            return Err(syn::Error::new_spanned(
                token,
                "#[loggable] does not support async functions",
            ));
        }
        if let Some(token) = &sig.constness {
            return Err(syn::Error::new_spanned(
                token,
                "#[loggable] functions cannot be const: recording allocates",
            ));
        }
        if let Some(variadic) = &sig.variadic {
            return Err(syn::Error::new(
                variadic.dots.spans[0],
                "#[loggable] does not support variadic functions",
            ));
        }
        rewrite::check_no_early_exit(&function.block)?;
        Ok(Self { function })
    }

    fn generate(&self) -> syn::Result<TokenStream> {
        let ItemFn {
            attrs, vis, sig, ..
        } = &self.function;
        let name = &sig.ident;

        let plain_block = rewrite::rewrite_block((*self.function.block).clone(), Mode::Plain)?;
        let recording_block =
            rewrite::rewrite_block((*self.function.block).clone(), Mode::Recording)?;

        let value_ty = match &sig.output {
            ReturnType::Default => quote! { () },
            ReturnType::Type(_, ty) => quote! { #ty },
        };
        let forwarded = forwarded_attrs(attrs);
        let ctx = ctx_ident();

        let mut with_context_sig = renamed(&with_named_output_lifetime(sig), WITH_CONTEXT_SUFFIX);
        let with_context_ty = match &with_context_sig.output {
            ReturnType::Default => quote! { () },
            ReturnType::Type(_, ty) => quote! { #ty },
        };
        let ctx_arg: FnArg = parse_quote! { #ctx: &mut ::steplog_core::Context<'_> };
        with_context_sig.inputs.push(ctx_arg);
        with_context_sig.output = parse_quote! {
            -> ::core::result::Result<#with_context_ty, ::steplog_core::RecordError>
        };

        let mut recorded_sig = renamed(sig, "recorded");
        recorded_sig.output = parse_quote! {
            -> ::core::result::Result<::steplog_core::Record, ::steplog_core::RecordError>
        };

        let mut traced_sig = renamed(sig, "traced");
        traced_sig.output = parse_quote! {
            -> ::core::result::Result<(#value_ty, ::steplog_core::Record), ::steplog_core::RecordError>
        };

        let with_context_doc = doc(format!(
            "Context-threading form of [`{name}`]: records into the caller's context."
        ));
        let recorded_doc = doc(format!(
            "Recording form of [`{name}`]: returns the record built by one call."
        ));
        let traced_doc = doc(format!(
            "Traced form of [`{name}`]: returns the value together with the record."
        ));

        Ok(quote! {
            #(#attrs)*
            #[allow(unused_variables)]
            #vis #sig #plain_block

            #with_context_doc
            #(#forwarded)*
            #[allow(unused_variables, unused_braces, clippy::unit_arg)]
            #vis #with_context_sig {
                ::core::result::Result::Ok(#recording_block)
            }

            #recorded_doc
            #(#forwarded)*
            #[allow(unused_variables, unused_braces, clippy::unit_arg)]
            #vis #recorded_sig {
                ::steplog_core::call_recording(|#ctx| ::core::result::Result::Ok(#recording_block))
            }

            #traced_doc
            #(#forwarded)*
            #[allow(unused_variables, unused_braces, clippy::unit_arg)]
            #vis #traced_sig {
                ::steplog_core::call_traced(|#ctx| ::core::result::Result::Ok(#recording_block))
            }
        })
    }
}

fn renamed(sig: &Signature, suffix: &str) -> Signature {
    let mut sig = sig.clone();
    sig.ident = format_ident!("{}_{}", sig.ident, suffix);
    sig
}

/// Name of the lifetime introduced when the extra context parameter would
/// otherwise make the output lifetime ambiguous
const OUTPUT_LIFETIME: &str = "'__steplog_a";

/// Spell out the lifetime an elided output reference borrows from.
///
/// Without a `self` receiver, `fn f(x: &T) -> &U` relies on `x` being the
/// only input lifetime. The context-threading form adds a `&mut Context<'_>`
/// parameter, so the output lifetime is named explicitly before that happens.
fn with_named_output_lifetime(sig: &Signature) -> Signature {
    let mut sig = sig.clone();
    if sig.receiver().is_some() {
        return sig;
    }
    let ReturnType::Type(_, output) = &sig.output else {
        return sig;
    };
    let mut output_lifetimes = Lifetimes::default();
    output_lifetimes.visit_type(output);
    if output_lifetimes.elided == 0 {
        return sig;
    }

    let mut input_lifetimes = Lifetimes::default();
    for input in &sig.inputs {
        input_lifetimes.visit_fn_arg(input);
    }
    input_lifetimes.named.sort_by_key(|lifetime| lifetime.ident.to_string());
    input_lifetimes.named.dedup_by_key(|lifetime| lifetime.ident.to_string());
    let lifetime = match (input_lifetimes.elided, input_lifetimes.named.as_slice()) {
        (1, []) => {
            let lifetime = Lifetime::new(OUTPUT_LIFETIME, Span::call_site());
            sig.generics
                .params
                .insert(0, GenericParam::Lifetime(LifetimeParam::new(lifetime.clone())));
            sig.generics.lt_token.get_or_insert_with(Default::default);
            sig.generics.gt_token.get_or_insert_with(Default::default);
            let mut fill = FillElided(&lifetime);
            for input in &mut sig.inputs {
                fill.visit_fn_arg_mut(input);
            }
            lifetime
        }
        (0, [named]) => named.clone(),
        // Ambiguous already; the plain form reports it
        _ => return sig,
    };
    if let ReturnType::Type(_, output) = &mut sig.output {
        FillElided(&lifetime).visit_type_mut(output);
    }
    sig
}

#[derive(Default)]
struct Lifetimes {
    elided: usize,
    named: Vec<Lifetime>,
}

impl<'ast> Visit<'ast> for Lifetimes {
    fn visit_type_reference(&mut self, node: &'ast TypeReference) {
        if node.lifetime.is_none() {
            self.elided += 1;
        }
        visit::visit_type_reference(self, node);
    }

    fn visit_lifetime(&mut self, node: &'ast Lifetime) {
        if node.ident == "_" {
            self.elided += 1;
        } else if node.ident != "static" {
            self.named.push(node.clone());
        }
    }

    // Fn-pointer and `Fn(&T)` bounds carry their own elision scope
    fn visit_type_bare_fn(&mut self, _node: &'ast syn::TypeBareFn) {}

    fn visit_parenthesized_generic_arguments(
        &mut self,
        _node: &'ast syn::ParenthesizedGenericArguments,
    ) {
    }
}

struct FillElided<'l>(&'l Lifetime);

impl VisitMut for FillElided<'_> {
    fn visit_type_reference_mut(&mut self, node: &mut TypeReference) {
        if node.lifetime.is_none() {
            node.lifetime = Some(self.0.clone());
        }
        visit_mut::visit_type_reference_mut(self, node);
    }

    fn visit_lifetime_mut(&mut self, node: &mut Lifetime) {
        if node.ident == "_" {
            *node = self.0.clone();
        }
    }

    fn visit_type_bare_fn_mut(&mut self, _node: &mut syn::TypeBareFn) {}

    fn visit_parenthesized_generic_arguments_mut(
        &mut self,
        _node: &mut syn::ParenthesizedGenericArguments,
    ) {
    }
}

/// Everything but doc comments carries over to the generated forms
fn forwarded_attrs(attrs: &[Attribute]) -> Vec<&Attribute> {
    attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("doc"))
        .collect()
}

fn doc(text: String) -> Attribute {
    let text = syn::LitStr::new(&text, Span::call_site());
    parse_quote! { #[doc = #text] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_ok(item: TokenStream) -> String {
        expand(TokenStream::new(), item).unwrap().to_string()
    }

    #[test]
    fn generates_all_four_forms() {
        let output = expand_ok(quote! {
            fn double(x: f64) -> f64 {
                log!(y = x * 2.0);
                x
            }
        });

        for form in ["fn double", "fn double_with_context", "fn double_recorded", "fn double_traced"] {
            assert!(output.contains(form), "missing `{form}` in {output}");
        }
        assert!(output.contains("call_recording"));
        assert!(output.contains("call_traced"));
    }

    #[test]
    fn methods_keep_their_receiver() {
        let output = expand_ok(quote! {
            pub fn torque(&self, theta: f64) -> f64 {
                log!(torque = -self.gain * theta);
                torque
            }
        });
        assert!(output.contains("pub fn torque_with_context"));
        assert!(output.contains("& self"));
    }

    #[test]
    fn borrowed_output_survives_the_context_parameter() {
        let output = expand_ok(quote! {
            fn first(xs: &[f64]) -> &f64 {
                log!(n = xs.len());
                &xs[0]
            }
        });
        assert!(output.contains("fn first_with_context < '__steplog_a >"));
        assert!(output.contains("Result < & '__steplog_a f64"));
    }

    #[test]
    fn borrowed_output_gets_a_named_lifetime() {
        let sig: Signature = parse_quote!(fn first(xs: &[f64]) -> &f64);
        let named = with_named_output_lifetime(&sig);
        let expected: Signature =
            parse_quote!(fn first<'__steplog_a>(xs: &'__steplog_a [f64]) -> &'__steplog_a f64);
        assert_eq!(named, expected);

        let sig: Signature = parse_quote!(fn pick<'a>(xs: &'a [f64], ys: &'a [f64]) -> &f64);
        let expected: Signature =
            parse_quote!(fn pick<'a>(xs: &'a [f64], ys: &'a [f64]) -> &'a f64);
        assert_eq!(with_named_output_lifetime(&sig), expected);

        // Receivers and owned outputs are left alone
        let sig: Signature = parse_quote!(fn get(&self, key: &str) -> &f64);
        assert_eq!(with_named_output_lifetime(&sig), sig);
        let sig: Signature = parse_quote!(fn len(xs: &[f64]) -> usize);
        assert_eq!(with_named_output_lifetime(&sig), sig);
    }

    #[test]
    fn doc_comments_stay_on_the_plain_form() {
        let output = expand_ok(quote! {
            /// Pendulum controller
            #[inline]
            fn control(theta: f64) -> f64 { theta }
        });
        assert_eq!(output.matches("Pendulum controller").count(), 1);
        assert_eq!(output.matches("inline").count(), 4);
    }

    #[test]
    fn rejects_arguments_and_async() {
        assert!(expand(quote!(verbose), quote!(fn f() {})).is_err());

        let err = expand(TokenStream::new(), quote!(async fn f() {})).unwrap_err();
        assert!(err.to_string().contains("async"));
    }

    #[test]
    fn rejects_early_return() {
        let err = expand(
            TokenStream::new(),
            quote! {
                fn f(x: f64) -> f64 {
                    if x < 0.0 {
                        return 0.0;
                    }
                    log!(x);
                    x
                }
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("`return` is not allowed"));
    }

    #[test]
    fn reports_invalid_record_expressions() {
        let err = expand(
            TokenStream::new(),
            quote! {
                fn f(x: f64) -> f64 {
                    log!(x + 1.0);
                    x
                }
            },
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid record expression"));
    }
}
