//! Parsing of the record operations that may appear in a `#[loggable]` body.
//!
//! ```text
//! log!(x)                      record `x` under "x"
//! log!(y = expr)               record `expr` under "y" (binds `y` as a statement)
//! log!(a, b)                   record each identifier under its own name
//! log!((a, b) = (ea, eb))      zip names to values positionally
//! only_log!(...)               same shapes, evaluated only while recording
//! nested_log!(f(x))            merge f's record flat
//! nested_log!(sub: f(x))       merge f's record under "sub"
//! nested_log!(u = f(x))        as above, binding the value to `u`
//! nested_log!(sub: x)          record `x` into a child merged under "sub"
//! nested_log!(sub: y = expr)   same for a computed value, binding `y`
//! nested_only_log!(...)        same shapes, evaluated only while recording
//! ```
//!
//! A nested operand that is a call or method call (optionally bound to one
//! identifier) is routed to the callee's dual-mode forms. Any other operand
//! takes the `log!` shapes and is recorded into a child record instead; wrap
//! an ordinary call in a block (`y = { f(x) }`) to record its value that way.

use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{
    AngleBracketedGenericArguments, Expr, ExprCall, ExprMethodCall, ExprPath, Ident, LitStr,
    Path, Result, Token,
};

/// The four record operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `log!`: always evaluated, recorded when active
    Log,
    /// `only_log!`: evaluated and recorded only when active
    OnlyLog,
    /// `nested_log!`: always called, record merged when active
    NestedLog,
    /// `nested_only_log!`: called and merged only when active
    NestedOnlyLog,
}

impl OpKind {
    /// Recognize an operation by the last segment of a macro path
    pub fn from_path(path: &Path) -> Option<Self> {
        let segment = path.segments.last()?;
        if !segment.arguments.is_none() {
            return None;
        }
        match segment.ident.to_string().as_str() {
            "log" => Some(Self::Log),
            "only_log" => Some(Self::OnlyLog),
            "nested_log" => Some(Self::NestedLog),
            "nested_only_log" => Some(Self::NestedOnlyLog),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Log => "log!",
            Self::OnlyLog => "only_log!",
            Self::NestedLog => "nested_log!",
            Self::NestedOnlyLog => "nested_only_log!",
        }
    }

    pub fn is_nested(self) -> bool {
        matches!(self, Self::NestedLog | Self::NestedOnlyLog)
    }

    /// Whether the operand is skipped entirely outside recording mode
    pub fn only_when_recording(self) -> bool {
        matches!(self, Self::OnlyLog | Self::NestedOnlyLog)
    }
}

/// Error for an operand shape the operations do not support
pub fn invalid_expression<T: quote::ToTokens>(tokens: T, detail: &str) -> syn::Error {
    syn::Error::new_spanned(tokens, format!("invalid record expression: {detail}"))
}

/// One operand of `log!` / `only_log!`
#[derive(Debug, Clone)]
pub enum LogItem {
    /// `x`
    Ident(Ident),
    /// `y = expr`
    Assign { name: Ident, value: Expr },
    /// `(a, b) = expr`
    Tuple { names: Vec<Ident>, value: Expr },
}

impl LogItem {
    /// Names recorded by this item, in order
    pub fn names(&self) -> Vec<&Ident> {
        match self {
            Self::Ident(name) | Self::Assign { name, .. } => vec![name],
            Self::Tuple { names, .. } => names.iter().collect(),
        }
    }

    /// The computed expression, if any
    pub fn value_mut(&mut self) -> Option<&mut Expr> {
        match self {
            Self::Ident(_) => None,
            Self::Assign { value, .. } | Self::Tuple { value, .. } => Some(value),
        }
    }

    pub fn from_expr(expr: Expr) -> Result<Self> {
        match expr {
            Expr::Path(path) => Ok(Self::Ident(single_ident(&path)?)),
            Expr::Assign(assign) => {
                let value = *assign.right;
                match *assign.left {
                    Expr::Path(path) => Ok(Self::Assign {
                        name: single_ident(&path)?,
                        value,
                    }),
                    Expr::Tuple(tuple) => {
                        let names = tuple
                            .elems
                            .iter()
                            .map(|elem| match elem {
                                Expr::Path(path) => single_ident(path),
                                other => Err(invalid_expression(
                                    other,
                                    "tuple targets must be plain identifiers",
                                )),
                            })
                            .collect::<Result<Vec<_>>>()?;
                        if names.is_empty() {
                            return Err(invalid_expression(&tuple, "empty tuple target"));
                        }
                        if let Expr::Tuple(values) = &value {
                            if values.elems.len() != names.len() {
                                return Err(invalid_expression(
                                    &value,
                                    &format!(
                                        "{} names but {} values",
                                        names.len(),
                                        values.elems.len()
                                    ),
                                ));
                            }
                        }
                        Ok(Self::Tuple { names, value })
                    }
                    other => Err(invalid_expression(
                        other,
                        "the target of `=` must be an identifier or a tuple of identifiers",
                    )),
                }
            }
            other => Err(invalid_expression(
                other,
                "expected an identifier, `name = expr`, or `(a, b) = expr`",
            )),
        }
    }
}

fn single_ident(path: &ExprPath) -> Result<Ident> {
    if path.qself.is_none() {
        if let Some(ident) = path.path.get_ident() {
            return Ok(ident.clone());
        }
    }
    Err(invalid_expression(path, "expected a plain identifier"))
}

/// Recorded key for an identifier, without any `r#` prefix
pub fn key_for(ident: &Ident) -> LitStr {
    LitStr::new(&ident.unraw().to_string(), ident.span())
}

/// Operands of `log!` / `only_log!`
#[derive(Debug, Clone)]
pub struct LogArgs {
    pub items: Vec<LogItem>,
}

impl Parse for LogArgs {
    fn parse(input: ParseStream<'_>) -> Result<Self> {
        let exprs = Punctuated::<Expr, Token![,]>::parse_terminated(input)?;
        if exprs.is_empty() {
            return Err(syn::Error::new(
                Span::call_site(),
                "invalid record expression: nothing to record",
            ));
        }
        let items = exprs
            .into_iter()
            .map(LogItem::from_expr)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }
}

/// The dual-mode call inside `nested_log!` / `nested_only_log!`
#[derive(Debug, Clone)]
pub enum NestedCall {
    /// `path::to::f(args)`
    Function {
        func: ExprPath,
        args: Punctuated<Expr, Token![,]>,
    },
    /// `receiver.f::<T>(args)`
    Method {
        receiver: Box<Expr>,
        method: Ident,
        turbofish: Option<AngleBracketedGenericArguments>,
        args: Punctuated<Expr, Token![,]>,
    },
}

impl NestedCall {
    pub fn args_mut(&mut self) -> &mut Punctuated<Expr, Token![,]> {
        match self {
            Self::Function { args, .. } | Self::Method { args, .. } => args,
        }
    }

    fn from_expr(expr: Expr) -> Result<Self> {
        match expr {
            Expr::Call(ExprCall { func, args, .. }) => match *func {
                Expr::Path(func) if func.qself.is_none() => Ok(Self::Function { func, args }),
                other => Err(invalid_expression(
                    other,
                    "the callee must be a path to a #[loggable] function",
                )),
            },
            Expr::MethodCall(ExprMethodCall {
                receiver,
                method,
                turbofish,
                args,
                ..
            }) => Ok(Self::Method {
                receiver,
                method,
                turbofish,
                args,
            }),
            other => Err(invalid_expression(
                other,
                "expected a call to a #[loggable] function",
            )),
        }
    }
}

/// What a nested operation records
#[derive(Debug, Clone)]
pub enum NestedOperand {
    /// A dual-mode call whose own record is merged
    Call {
        /// Local bound to the call's value in statement position
        bind: Option<Ident>,
        call: NestedCall,
    },
    /// Values recorded into a fresh child record, which is then merged
    Values(Vec<LogItem>),
}

/// Operands of `nested_log!` / `nested_only_log!`
#[derive(Debug, Clone)]
pub struct NestedArgs {
    /// Sub-key the nested record is merged under
    pub key: Option<LitStr>,
    pub operand: NestedOperand,
}

fn is_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call(call) => matches!(&*call.func, Expr::Path(func) if func.qself.is_none()),
        Expr::MethodCall(_) => true,
        _ => false,
    }
}

impl NestedOperand {
    fn from_exprs(exprs: Vec<Expr>) -> Result<Self> {
        if let [single] = exprs.as_slice() {
            if is_call(single) {
                return Ok(Self::Call {
                    bind: None,
                    call: NestedCall::from_expr(single.clone())?,
                });
            }
            if let Expr::Assign(assign) = single {
                if let (Expr::Path(path), true) = (&*assign.left, is_call(&assign.right)) {
                    return Ok(Self::Call {
                        bind: Some(single_ident(path)?),
                        call: NestedCall::from_expr((*assign.right).clone())?,
                    });
                }
            }
        }
        exprs
            .into_iter()
            .map(LogItem::from_expr)
            .collect::<Result<Vec<_>>>()
            .map(Self::Values)
    }
}

impl Parse for NestedArgs {
    fn parse(input: ParseStream<'_>) -> Result<Self> {
        let has_key = (input.peek(Ident::peek_any) || input.peek(LitStr))
            && input.peek2(Token![:])
            && !input.peek2(Token![::]);
        let key = if has_key {
            let key = if input.peek(LitStr) {
                input.parse::<LitStr>()?
            } else {
                key_for(&input.call(Ident::parse_any)?)
            };
            if key.value().is_empty() {
                return Err(invalid_expression(&key, "sub-keys must not be empty"));
            }
            input.parse::<Token![:]>()?;
            Some(key)
        } else {
            None
        };

        let exprs = Punctuated::<Expr, Token![,]>::parse_terminated(input)?;
        if exprs.is_empty() {
            return Err(syn::Error::new(
                Span::call_site(),
                "invalid record expression: nothing to record",
            ));
        }

        Ok(Self {
            key,
            operand: NestedOperand::from_exprs(exprs.into_iter().collect())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    impl NestedOperand {
        fn clone_items(&self) -> Option<Vec<LogItem>> {
            match self {
                Self::Values(items) => Some(items.clone()),
                Self::Call { .. } => None,
            }
        }
    }

    #[test]
    fn recognizes_operations_by_last_segment() {
        let path: Path = parse_quote!(steplog_core::nested_log);
        assert_eq!(OpKind::from_path(&path), Some(OpKind::NestedLog));
        let path: Path = parse_quote!(println);
        assert_eq!(OpKind::from_path(&path), None);
    }

    #[test]
    fn parses_all_log_shapes() {
        let args: LogArgs = syn::parse2(quote::quote!(x, y = x * 2.0, (a, b) = (1, 2))).unwrap();
        let names: Vec<String> = args
            .items
            .iter()
            .flat_map(LogItem::names)
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["x", "y", "a", "b"]);
    }

    #[test]
    fn rejects_unsupported_log_shapes() {
        let err = syn::parse2::<LogArgs>(quote::quote!(x + 1)).unwrap_err();
        assert!(err.to_string().starts_with("invalid record expression"));

        let err = syn::parse2::<LogArgs>(quote::quote!((a, b) = (1, 2, 3))).unwrap_err();
        assert!(err.to_string().contains("2 names but 3 values"));

        assert!(syn::parse2::<LogArgs>(quote::quote!()).is_err());
        assert!(syn::parse2::<LogArgs>(quote::quote!(self.x = 1)).is_err());
    }

    #[test]
    fn parses_nested_keys_and_bindings() {
        let args: NestedArgs = syn::parse2(quote::quote!(controller: u = self.torque(theta))).unwrap();
        assert_eq!(args.key.map(|key| key.value()), Some("controller".to_string()));
        match args.operand {
            NestedOperand::Call { bind, call } => {
                assert_eq!(bind.map(|bind| bind.to_string()), Some("u".to_string()));
                assert!(matches!(call, NestedCall::Method { .. }));
            }
            NestedOperand::Values(_) => panic!("expected a call"),
        }

        let args: NestedArgs = syn::parse2(quote::quote!(dynamics::step(x, t))).unwrap();
        assert!(args.key.is_none());
        assert!(matches!(
            args.operand,
            NestedOperand::Call {
                bind: None,
                call: NestedCall::Function { .. }
            }
        ));

        let args: NestedArgs = syn::parse2(quote::quote!("sub key": f(x))).unwrap();
        assert_eq!(args.key.map(|key| key.value()), Some("sub key".to_string()));
    }

    #[test]
    fn nested_operands_may_be_plain_values() {
        let args: NestedArgs = syn::parse2(quote::quote!(sub: y = x * 2)).unwrap();
        assert_eq!(args.key.map(|key| key.value()), Some("sub".to_string()));
        assert!(matches!(
            args.operand.clone_items().as_deref(),
            Some([LogItem::Assign { .. }])
        ));

        let args: NestedArgs = syn::parse2(quote::quote!(sub: x)).unwrap();
        assert!(matches!(
            args.operand.clone_items().as_deref(),
            Some([LogItem::Ident(_)])
        ));

        // A call behind a block is a value, not a dual-mode call
        let args: NestedArgs = syn::parse2(quote::quote!(sub: y = { f(x) }, z)).unwrap();
        assert_eq!(args.operand.clone_items().map(|items| items.len()), Some(2));
    }

    #[test]
    fn nested_operand_shape_is_checked() {
        let err = syn::parse2::<NestedArgs>(quote::quote!(sub: x + 1)).unwrap_err();
        assert!(err.to_string().starts_with("invalid record expression"));
        assert!(syn::parse2::<NestedArgs>(quote::quote!(sub:)).is_err());
    }
}
