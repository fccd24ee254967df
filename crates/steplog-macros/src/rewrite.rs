//! Lowering of record operations into plain or recording code.
//!
//! The same body is rewritten twice. In [`Mode::Plain`] every operation
//! becomes ordinary evaluation (or nothing, for the only-when-recording
//! forms) and nested calls go to the callee's plain form. In
//! [`Mode::Recording`] operations write into the context bound to
//! [`CTX`] and nested calls go to the callee's `_with_context` form.
//!
//! Operations in statement position do not yield a value, so `log!(x);`
//! records `x` by reference without moving it, and `log!(y = expr);` binds
//! `y` for the rest of the block. In expression position every operation
//! yields its operand's value.

use crate::parsing::{key_for, LogArgs, LogItem, NestedArgs, NestedCall, NestedOperand, OpKind};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::parse::Parser;
use syn::visit::Visit;
use syn::visit_mut::{self, VisitMut};
use syn::{Block, Expr, ExprMacro, LitStr, Macro, Stmt, StmtMacro};

/// Name of the context binding inside recording bodies
pub const CTX: &str = "__steplog_ctx";

/// Suffix of the context-threading form of a `#[loggable]` function
pub const WITH_CONTEXT_SUFFIX: &str = "with_context";

/// Which of the two bodies is being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    Recording,
}

pub fn ctx_ident() -> syn::Ident {
    syn::Ident::new(CTX, Span::call_site())
}

/// Rewrite every record operation in `block` for `mode`
pub fn rewrite_block(mut block: Block, mode: Mode) -> syn::Result<Block> {
    let mut rewriter = Rewriter {
        mode,
        closure_depth: 0,
        error: None,
    };
    rewriter.visit_block_mut(&mut block);
    match rewriter.error {
        Some(err) => Err(err),
        None => Ok(block),
    }
}

/// Reject `return` and `?` outside closures and nested items.
///
/// The recording form hands back the accumulated record once the body falls
/// through; an early exit would skip that. Macro bodies are opaque here, so
/// only the well-known early-exit macros (`try!`, `bail!`, `ensure!`) are
/// caught by name; any other user macro that expands to `return` is not.
pub fn check_no_early_exit(block: &Block) -> syn::Result<()> {
    let mut check = EarlyExitCheck { error: None };
    check.visit_block(block);
    check.error.map_or(Ok(()), Err)
}

fn check_expr_no_early_exit(expr: &Expr) -> syn::Result<()> {
    let mut check = EarlyExitCheck { error: None };
    check.visit_expr(expr);
    check.error.map_or(Ok(()), Err)
}

/// Macros that conventionally expand to an early `return`
const EARLY_EXIT_MACROS: [&str; 3] = ["try", "bail", "ensure"];

struct EarlyExitCheck {
    error: Option<syn::Error>,
}

impl EarlyExitCheck {
    fn push(&mut self, err: syn::Error) {
        match &mut self.error {
            Some(existing) => existing.combine(err),
            None => self.error = Some(err),
        }
    }
}

impl<'ast> Visit<'ast> for EarlyExitCheck {
    fn visit_expr_return(&mut self, node: &'ast syn::ExprReturn) {
        self.push(syn::Error::new_spanned(
            node,
            "`return` is not allowed in a #[loggable] body; the recording form returns the record when the body falls through (use the `_traced` form to get the value too)",
        ));
    }

    fn visit_expr_try(&mut self, node: &'ast syn::ExprTry) {
        self.push(syn::Error::new_spanned(
            node,
            "`?` is not allowed in a #[loggable] body; an early exit would drop the record being accumulated",
        ));
    }

    fn visit_macro(&mut self, node: &'ast Macro) {
        let Some(segment) = node.path.segments.last() else {
            return;
        };
        let name = segment.ident.unraw().to_string();
        if EARLY_EXIT_MACROS.contains(&name.as_str()) {
            self.push(syn::Error::new_spanned(
                node,
                format!("`{name}!` is not allowed in a #[loggable] body; it may return early and drop the record being accumulated"),
            ));
        }
    }

    fn visit_expr_closure(&mut self, _node: &'ast syn::ExprClosure) {}

    fn visit_expr_async(&mut self, _node: &'ast syn::ExprAsync) {}

    fn visit_item(&mut self, _node: &'ast syn::Item) {}
}

struct Rewriter {
    mode: Mode,
    closure_depth: usize,
    error: Option<syn::Error>,
}

/// Where an operation appears
#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Statement,
    Expression,
}

/// Where recorded values are written
#[derive(Clone, Copy)]
enum Target<'a> {
    /// Straight into the current record
    Current,
    /// Into a child record merged flat or under a sub-key
    Child(Option<&'a LitStr>),
}

impl Rewriter {
    fn push_error(&mut self, err: syn::Error) {
        match &mut self.error {
            Some(existing) => existing.combine(err),
            None => self.error = Some(err),
        }
    }

    fn lower(&mut self, kind: OpKind, mac: &Macro, position: Position) -> syn::Result<TokenStream> {
        if self.closure_depth > 0 {
            return Err(syn::Error::new_spanned(
                mac,
                format!(
                    "`{}` cannot be used inside a closure or async block of a #[loggable] body",
                    kind.name()
                ),
            ));
        }
        if kind.is_nested() {
            let mut args: NestedArgs = mac.parse_body()?;
            match &mut args.operand {
                NestedOperand::Call { bind, call } => {
                    if kind.only_when_recording() && bind.is_some() {
                        return Err(syn::Error::new_spanned(
                            mac,
                            "`nested_only_log!` cannot bind a local: its value only exists while recording",
                        ));
                    }
                    if let NestedCall::Method { receiver, .. } = &mut *call {
                        self.prepare_operand(receiver)?;
                    }
                    for arg in call.args_mut().iter_mut() {
                        self.prepare_operand(arg)?;
                    }
                    Ok(self.lower_nested(kind, args.key.as_ref(), bind.as_ref(), call, position))
                }
                NestedOperand::Values(items) => {
                    self.prepare_items(items)?;
                    let target = Target::Child(args.key.as_ref());
                    Ok(self.lower_log(kind, items, target, position))
                }
            }
        } else {
            let mut args: LogArgs = mac.parse_body()?;
            self.prepare_items(&mut args.items)?;
            Ok(self.lower_log(kind, &args.items, Target::Current, position))
        }
    }

    fn prepare_items(&mut self, items: &mut [LogItem]) -> syn::Result<()> {
        for item in items {
            if let Some(value) = item.value_mut() {
                self.prepare_operand(value)?;
            }
        }
        Ok(())
    }

    /// Operands are checked for early exits and have their own operations
    /// lowered before the enclosing operation is.
    fn prepare_operand(&mut self, expr: &mut Expr) -> syn::Result<()> {
        check_expr_no_early_exit(expr)?;
        self.visit_expr_mut(expr);
        Ok(())
    }

    fn lower_log(
        &self,
        kind: OpKind,
        items: &[LogItem],
        target: Target<'_>,
        position: Position,
    ) -> TokenStream {
        let ctx = ctx_ident();
        let mut lets = Vec::new();
        let mut records = Vec::new();
        let mut temps = Vec::new();
        for item in items {
            let names = item.names();
            match position {
                // Statement position binds the recorded names themselves
                Position::Statement => {
                    match item {
                        LogItem::Ident(_) => {}
                        LogItem::Assign { name, value } => {
                            lets.push(quote! { let #name = #value; });
                        }
                        LogItem::Tuple { names, value } => {
                            lets.push(quote! { let (#(#names),*) = #value; });
                        }
                    }
                    for name in names {
                        let key = key_for(name);
                        records.push(quote! { #ctx.log_ref(#key, &#name)?; });
                    }
                }
                // Every operand is moved into a temporary so the operation
                // can yield it after recording.
                Position::Expression => {
                    let item_temps: Vec<_> = (temps.len()..temps.len() + names.len())
                        .map(|i| format_ident!("__steplog_v{}", i))
                        .collect();
                    match item {
                        LogItem::Ident(name) => {
                            let temp = &item_temps[0];
                            lets.push(quote! { let #temp = #name; });
                        }
                        LogItem::Assign { value, .. } => {
                            let temp = &item_temps[0];
                            lets.push(quote! { let #temp = #value; });
                        }
                        LogItem::Tuple { value, .. } => {
                            lets.push(quote! { let (#(#item_temps),*) = #value; });
                        }
                    }
                    for (name, temp) in names.iter().zip(&item_temps) {
                        let key = key_for(name);
                        records.push(quote! { #ctx.log_ref(#key, &#temp)?; });
                    }
                    temps.extend(item_temps);
                }
            }
        }

        let records = match target {
            Target::Current => quote! { #(#records)* },
            Target::Child(None) => quote! {
                #ctx.nested(|#ctx| {
                    #(#records)*
                    ::core::result::Result::Ok(())
                })?;
            },
            Target::Child(Some(key)) => quote! {
                #ctx.nested_under(#key, |#ctx| {
                    #(#records)*
                    ::core::result::Result::Ok(())
                })?;
            },
        };

        let result = match (position, temps.as_slice()) {
            (Position::Statement, _) => None,
            (Position::Expression, [single]) => Some(quote! { #single }),
            (Position::Expression, many) => Some(quote! { (#(#many),*) }),
        };
        match (self.mode, kind.only_when_recording(), result) {
            (Mode::Plain, true, None) => quote! {},
            (Mode::Plain, true, Some(result)) => quote! {
                if false {
                    #(#lets)*
                    ::core::option::Option::Some(#result)
                } else {
                    ::core::option::Option::None
                }
            },
            (Mode::Plain, false, None) => quote! { #(#lets)* },
            (Mode::Plain, false, Some(result)) => quote! { { #(#lets)* #result } },
            (Mode::Recording, true, None) => quote! {
                if #ctx.is_recording() {
                    #(#lets)*
                    #records
                }
            },
            (Mode::Recording, true, Some(result)) => quote! {
                if #ctx.is_recording() {
                    #(#lets)*
                    #records
                    ::core::option::Option::Some(#result)
                } else {
                    ::core::option::Option::None
                }
            },
            (Mode::Recording, false, None) => quote! { #(#lets)* #records },
            (Mode::Recording, false, Some(result)) => quote! { { #(#lets)* #records #result } },
        }
    }

    fn lower_nested(
        &self,
        kind: OpKind,
        key: Option<&LitStr>,
        bind: Option<&syn::Ident>,
        call: &NestedCall,
        position: Position,
    ) -> TokenStream {
        let call = match self.mode {
            Mode::Plain => plain_call(call),
            Mode::Recording => recording_call(call, key),
        };
        let bind = bind.filter(|_| position == Position::Statement);

        match (self.mode, kind, position) {
            (Mode::Plain, OpKind::NestedOnlyLog, Position::Statement) => quote! {},
            (Mode::Plain, OpKind::NestedOnlyLog, Position::Expression) => quote! {
                if false {
                    ::core::option::Option::Some(#call)
                } else {
                    ::core::option::Option::None
                }
            },
            (Mode::Recording, OpKind::NestedOnlyLog, Position::Statement) => {
                let ctx = ctx_ident();
                quote! {
                    if #ctx.is_recording() {
                        #call;
                    }
                }
            }
            (Mode::Recording, OpKind::NestedOnlyLog, Position::Expression) => {
                let ctx = ctx_ident();
                quote! {
                    if #ctx.is_recording() {
                        ::core::option::Option::Some(#call)
                    } else {
                        ::core::option::Option::None
                    }
                }
            }
            (_, _, Position::Statement) => match bind {
                Some(bind) => quote! { let #bind = #call; },
                None => quote! { #call; },
            },
            (_, _, Position::Expression) => call,
        }
    }
}

fn plain_call(call: &NestedCall) -> TokenStream {
    match call {
        NestedCall::Function { func, args } => quote! { #func(#args) },
        NestedCall::Method {
            receiver,
            method,
            turbofish,
            args,
        } => quote! { #receiver.#method #turbofish(#args) },
    }
}

/// Call the callee's context-threading form through the context, merging
/// its record flat or under `key`. The receiver and arguments are evaluated
/// before the call, in source order, against the caller's record.
fn recording_call(call: &NestedCall, key: Option<&LitStr>) -> TokenStream {
    let ctx = ctx_ident();
    let mut setup = Vec::new();
    let (args, invoke) = match call {
        NestedCall::Function { func, args } => {
            let mut func = func.clone();
            if let Some(last) = func.path.segments.last_mut() {
                last.ident = format_ident!("{}_{}", last.ident, WITH_CONTEXT_SUFFIX);
            }
            let temps = arg_temps(args.len());
            (args, quote! { #func(#(#temps,)* #ctx) })
        }
        NestedCall::Method {
            receiver,
            method,
            turbofish,
            args,
        } => {
            let method = format_ident!("{}_{}", method, WITH_CONTEXT_SUFFIX);
            let temps = arg_temps(args.len());
            // Places have no side effects and must not be moved out of, so
            // only computed receivers are bound ahead of the arguments.
            let receiver = if is_place(receiver) {
                quote! { #receiver }
            } else {
                setup.push(quote! { let __steplog_recv = #receiver; });
                quote! { __steplog_recv }
            };
            (args, quote! { #receiver.#method #turbofish(#(#temps,)* #ctx) })
        }
    };
    let merge = match key {
        Some(key) => quote! { #ctx.nested_under(#key, |#ctx| #invoke)? },
        None => quote! { #ctx.nested(|#ctx| #invoke)? },
    };
    let temps = arg_temps(args.len());
    let values = args.iter();
    quote! {
        {
            #(#setup)*
            #(let #temps = #values;)*
            #merge
        }
    }
}

fn is_place(expr: &Expr) -> bool {
    match expr {
        Expr::Path(_) | Expr::Lit(_) => true,
        Expr::Field(field) => is_place(&field.base),
        Expr::Paren(paren) => is_place(&paren.expr),
        Expr::Reference(reference) => is_place(&reference.expr),
        Expr::Index(index) => is_place(&index.expr) && is_place(&index.index),
        _ => false,
    }
}

fn arg_temps(count: usize) -> Vec<syn::Ident> {
    (0..count).map(|i| format_ident!("__steplog_arg{}", i)).collect()
}

fn op_kind(mac: &Macro) -> Option<OpKind> {
    OpKind::from_path(&mac.path)
}

fn parse_stmts(tokens: TokenStream) -> syn::Result<Vec<Stmt>> {
    Block::parse_within.parse2(tokens)
}

impl VisitMut for Rewriter {
    fn visit_block_mut(&mut self, block: &mut Block) {
        let stmts = std::mem::take(&mut block.stmts);
        let last = stmts.len().saturating_sub(1);
        for (index, stmt) in stmts.into_iter().enumerate() {
            let statement_op = match &stmt {
                Stmt::Macro(StmtMacro {
                    mac, semi_token, ..
                }) if semi_token.is_some() || index != last => {
                    op_kind(mac).map(|kind| (kind, mac.clone()))
                }
                Stmt::Expr(Expr::Macro(ExprMacro { mac, .. }), Some(_)) => {
                    op_kind(mac).map(|kind| (kind, mac.clone()))
                }
                _ => None,
            };

            if let Some((kind, mac)) = statement_op {
                match self
                    .lower(kind, &mac, Position::Statement)
                    .and_then(parse_stmts)
                {
                    Ok(lowered) => block.stmts.extend(lowered),
                    Err(err) => self.push_error(err),
                }
                continue;
            }

            // A trailing brace-delimited operation is the block's value
            let mut stmt = match stmt {
                Stmt::Macro(StmtMacro { attrs, mac, .. }) if op_kind(&mac).is_some() => {
                    Stmt::Expr(Expr::Macro(ExprMacro { attrs, mac }), None)
                }
                other => other,
            };
            self.visit_stmt_mut(&mut stmt);
            block.stmts.push(stmt);
        }
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let Expr::Macro(ExprMacro { mac, .. }) = expr {
            if let Some(kind) = op_kind(mac) {
                let mac = mac.clone();
                match self
                    .lower(kind, &mac, Position::Expression)
                    .and_then(syn::parse2::<Expr>)
                {
                    Ok(lowered) => *expr = lowered,
                    Err(err) => self.push_error(err),
                }
                return;
            }
        }
        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_expr_closure_mut(&mut self, node: &mut syn::ExprClosure) {
        self.closure_depth += 1;
        visit_mut::visit_expr_closure_mut(self, node);
        self.closure_depth -= 1;
    }

    fn visit_expr_async_mut(&mut self, node: &mut syn::ExprAsync) {
        self.closure_depth += 1;
        visit_mut::visit_expr_async_mut(self, node);
        self.closure_depth -= 1;
    }

    // Nested items are not part of the body
    fn visit_item_mut(&mut self, _node: &mut syn::Item) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn lowered(block: Block, mode: Mode) -> String {
        let block = rewrite_block(block, mode).unwrap();
        quote!(#block).to_string()
    }

    #[test]
    fn plain_log_keeps_bindings_and_drops_recording() {
        let output = lowered(parse_quote!({ log!(y = x * 2.0); y }), Mode::Plain);
        assert!(output.contains("let y"));
        assert!(!output.contains(CTX));
    }

    #[test]
    fn recording_log_records_by_reference() {
        let output = lowered(parse_quote!({ log!(x); x }), Mode::Recording);
        assert!(output.contains("log_ref"));
        assert!(output.contains("\"x\""));
    }

    #[test]
    fn plain_only_log_evaluates_nothing() {
        let output = lowered(
            parse_quote!({ only_log!(cost = expensive()); 1.0 }),
            Mode::Plain,
        );
        assert!(!output.contains("expensive"));
    }

    #[test]
    fn nested_calls_route_to_matching_form() {
        let block: Block = parse_quote!({ let u = nested_log!(controller: control(x)); u });

        let plain = lowered(block.clone(), Mode::Plain);
        assert!(plain.contains("control"));
        assert!(!plain.contains("control_with_context"));

        let recording = lowered(block, Mode::Recording);
        assert!(recording.contains("control_with_context"));
        assert!(recording.contains("nested_under"));
        assert!(recording.contains("\"controller\""));
    }

    #[test]
    fn nested_values_record_into_a_child() {
        let block: Block = parse_quote!({ nested_log!(sub: y = x * 2.0); y });

        let plain = lowered(block.clone(), Mode::Plain);
        assert!(plain.contains("let y"));
        assert!(!plain.contains("nested_under"));

        let recording = lowered(block, Mode::Recording);
        assert!(recording.contains("nested_under"));
        assert!(recording.contains("\"sub\""));
        assert!(recording.contains("log_ref"));
    }

    #[test]
    fn plain_nested_only_values_evaluate_nothing() {
        let output = lowered(
            parse_quote!({ nested_only_log!(diag: cost = expensive()); 1.0 }),
            Mode::Plain,
        );
        assert!(!output.contains("expensive"));
    }

    #[test]
    fn computed_receivers_are_evaluated_before_arguments() {
        let recording = lowered(
            parse_quote!({ let u = nested_log!(make().torque(next())); u }),
            Mode::Recording,
        );
        let receiver = recording.find("let __steplog_recv = make ()").unwrap();
        let argument = recording.find("let __steplog_arg0 = next ()").unwrap();
        assert!(receiver < argument);

        // Places are neither moved nor re-evaluated
        let recording = lowered(
            parse_quote!({ let u = nested_log!(self.ctrl.torque(x)); u }),
            Mode::Recording,
        );
        assert!(!recording.contains("__steplog_recv"));
        assert!(recording.contains("self . ctrl . torque_with_context"));
    }

    #[test]
    fn operations_inside_closures_are_rejected() {
        let block: Block = parse_quote!({ xs.iter().map(|x| log!(x)).count() });
        let err = rewrite_block(block, Mode::Recording).unwrap_err();
        assert!(err.to_string().contains("inside a closure"));
    }

    #[test]
    fn early_exits_are_rejected() {
        let block: Block = parse_quote!({ if x > 1.0 { return x; } x });
        assert!(check_no_early_exit(&block).is_err());

        let block: Block = parse_quote!({ let y = parse(s)?; y });
        assert!(check_no_early_exit(&block).is_err());

        let block: Block = parse_quote!({ if x < 0.0 { anyhow::bail!("negative"); } x });
        let err = check_no_early_exit(&block).unwrap_err();
        assert!(err.to_string().contains("`bail!` is not allowed"));

        let block: Block = parse_quote!({ let y = r#try!(parse(s)); y });
        assert!(check_no_early_exit(&block).is_err());

        // Other macros are left alone
        let block: Block = parse_quote!({ println!("{x}"); log!(x); x });
        assert!(check_no_early_exit(&block).is_ok());

        // Closures own their returns
        let block: Block = parse_quote!({ let f = |v: f64| { return v; }; f(x) });
        assert!(check_no_early_exit(&block).is_ok());
    }
}
