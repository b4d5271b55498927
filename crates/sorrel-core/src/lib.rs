//! Core runtime for the sorrel scripting language.
//!
//! sorrel is a dynamically-typed, embeddable language driven by a host
//! process. This crate holds everything downstream of the parser: the AST
//! shape, the tree-walking evaluator, the scoped environment, the host value
//! bridge, and the channel/goroutine primitives. Execution is cancellable at
//! every statement boundary through a host-supplied [`ExecContext`].
//!
//! ```
//! use sorrel_core::ast::{Expr, ExprKind, Span, Stmt, StmtKind};
//! use sorrel_core::{Env, Value};
//!
//! let env = Env::new();
//! env.define("a", Value::Int(41));
//!
//! // a + 1  (the parser collaborator normally produces this)
//! let expr = Expr::new(
//!     ExprKind::Binary {
//!         op: sorrel_core::ast::BinaryOp::Add,
//!         lhs: Box::new(Expr::new(ExprKind::Ident("a".into()), Span::default())),
//!         rhs: Box::new(Expr::new(ExprKind::Int(1), Span::default())),
//!     },
//!     Span::default(),
//! );
//! let program = vec![Stmt::new(StmtKind::Expr(expr), Span::default())];
//! assert_eq!(env.execute(&program).unwrap(), Value::Int(42));
//! ```

pub mod ast;
pub mod bridge;
pub mod concurrency;
pub mod env;
pub mod error;
mod eval;
mod exec;
pub mod package_registry;
pub mod types;
pub mod value;

pub use concurrency::{ChanHandle, ExecContext};
pub use env::Env;
pub use error::SorrelError;
pub use types::{HostType, TypeDesc};
pub use value::{FnArity, HostObject, MapKey, NativeFn, Value};
