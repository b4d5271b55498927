#![allow(dead_code)]

//! Hand-built AST fragments standing in for the parser collaborator's output.
//! Each helper is one grammar production; the comment on a test shows the
//! surface syntax it encodes.

use sorrel_core::ast::{
    BinaryOp, Expr, ExprKind, Span, Stmt, StmtKind, SwitchCase, TypeExpr, UnaryOp,
};

pub fn e(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::default())
}

pub fn st(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default())
}

pub fn nil() -> Expr {
    e(ExprKind::Nil)
}

pub fn boolean(b: bool) -> Expr {
    e(ExprKind::Bool(b))
}

pub fn int(n: i64) -> Expr {
    e(ExprKind::Int(n))
}

pub fn float(x: f64) -> Expr {
    e(ExprKind::Float(x))
}

pub fn string(s: &str) -> Expr {
    e(ExprKind::Str(s.to_string()))
}

pub fn rune(r: char) -> Expr {
    e(ExprKind::Rune(r))
}

pub fn ident(name: &str) -> Expr {
    e(ExprKind::Ident(name.to_string()))
}

pub fn array(items: Vec<Expr>) -> Expr {
    e(ExprKind::Array(items))
}

pub fn map_lit(pairs: Vec<(&str, Expr)>) -> Expr {
    e(ExprKind::Map(
        pairs
            .into_iter()
            .map(|(key, value)| (string(key), value))
            .collect(),
    ))
}

pub fn member(target: Expr, name: &str) -> Expr {
    e(ExprKind::Member {
        target: Box::new(target),
        name: name.to_string(),
    })
}

pub fn index(target: Expr, key: Expr) -> Expr {
    e(ExprKind::Index {
        target: Box::new(target),
        index: Box::new(key),
    })
}

pub fn slice(target: Expr, begin: Option<Expr>, end: Option<Expr>) -> Expr {
    e(ExprKind::Slice {
        target: Box::new(target),
        begin: begin.map(Box::new),
        end: end.map(Box::new),
    })
}

pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
    e(ExprKind::Unary {
        op,
        expr: Box::new(expr),
    })
}

pub fn addr(expr: Expr) -> Expr {
    e(ExprKind::Addr(Box::new(expr)))
}

pub fn deref(expr: Expr) -> Expr {
    e(ExprKind::Deref(Box::new(expr)))
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    e(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn ternary(cond: Expr, then: Expr, els: Expr) -> Expr {
    e(ExprKind::Ternary {
        cond: Box::new(cond),
        then: Box::new(then),
        els: Box::new(els),
    })
}

/// `lhs = rhs`
pub fn assign(lhs: Expr, rhs: Expr) -> Stmt {
    st(StmtKind::Expr(e(ExprKind::Lets {
        lhs: vec![lhs],
        rhs: vec![rhs],
    })))
}

/// `a, b = x, y`
pub fn assign_many(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
    st(StmtKind::Expr(e(ExprKind::Lets { lhs, rhs })))
}

pub fn op_assign(op: BinaryOp, lhs: Expr, rhs: Expr) -> Stmt {
    st(StmtKind::Expr(e(ExprKind::OpAssign {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })))
}

/// `var a, b = x, y`
pub fn var(names: &[&str], exprs: Vec<Expr>) -> Stmt {
    st(StmtKind::Var {
        names: names.iter().map(|name| name.to_string()).collect(),
        exprs,
    })
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    st(StmtKind::Expr(expr))
}

/// `func name(params) { body }` / `func(params) { body }`
pub fn func(name: Option<&str>, params: &[&str], body: Vec<Stmt>) -> Expr {
    e(ExprKind::Func {
        name: name.map(|name| name.to_string()),
        params: params.iter().map(|param| param.to_string()).collect(),
        variadic: false,
        body,
    })
}

pub fn variadic_func(name: Option<&str>, params: &[&str], body: Vec<Stmt>) -> Expr {
    e(ExprKind::Func {
        name: name.map(|name| name.to_string()),
        params: params.iter().map(|param| param.to_string()).collect(),
        variadic: true,
        body,
    })
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    e(ExprKind::Call {
        callee: Box::new(callee),
        args,
        splat: false,
    })
}

pub fn call_splat(callee: Expr, args: Vec<Expr>) -> Expr {
    e(ExprKind::Call {
        callee: Box::new(callee),
        args,
        splat: true,
    })
}

pub fn call_named(name: &str, args: Vec<Expr>) -> Expr {
    call(ident(name), args)
}

pub fn ret(exprs: Vec<Expr>) -> Stmt {
    st(StmtKind::Return(exprs))
}

/// `ch <- value`
pub fn send(chan: Expr, value: Expr) -> Expr {
    e(ExprKind::Chan {
        lhs: Some(Box::new(chan)),
        rhs: Box::new(value),
    })
}

/// `<- ch`
pub fn recv(chan: Expr) -> Expr {
    e(ExprKind::Chan {
        lhs: None,
        rhs: Box::new(chan),
    })
}

pub fn tname(name: &str) -> TypeExpr {
    TypeExpr::Name(name.to_string())
}

/// `make(chan elem, size)`
pub fn make_chan(elem: &str, size: Option<Expr>) -> Expr {
    e(ExprKind::MakeChan {
        elem: tname(elem),
        size: size.map(Box::new),
    })
}

/// `make(ty)` / `make([]ty, len, cap)`
pub fn make(ty: TypeExpr, len: Option<Expr>, cap: Option<Expr>) -> Expr {
    e(ExprKind::Make {
        ty,
        len: len.map(Box::new),
        cap: cap.map(Box::new),
    })
}

pub fn new_of(ty: TypeExpr) -> Expr {
    e(ExprKind::New(ty))
}

pub fn len_of(expr: Expr) -> Expr {
    e(ExprKind::Len(Box::new(expr)))
}

pub fn delete(target: Expr, arg: Option<Expr>) -> Expr {
    e(ExprKind::Delete {
        target: Box::new(target),
        arg: arg.map(Box::new),
    })
}

pub fn include(item: Expr, list: Expr) -> Expr {
    e(ExprKind::Include {
        item: Box::new(item),
        list: Box::new(list),
    })
}

pub fn if_stmt(cond: Expr, then: Vec<Stmt>, els: Option<Vec<Stmt>>) -> Stmt {
    st(StmtKind::If {
        cond,
        then,
        elifs: Vec::new(),
        els,
    })
}

/// `for { body }` / `for cond { body }`
pub fn while_stmt(cond: Option<Expr>, body: Vec<Stmt>) -> Stmt {
    st(StmtKind::While { cond, body })
}

/// `for v in iter { body }`
pub fn for_in(var: &str, iter: Expr, body: Vec<Stmt>) -> Stmt {
    st(StmtKind::ForIn {
        var: var.to_string(),
        iter,
        body,
    })
}

/// `for init; cond; post { body }`
pub fn c_for(init: Stmt, cond: Expr, post: Stmt, body: Vec<Stmt>) -> Stmt {
    st(StmtKind::CFor {
        init: Some(Box::new(init)),
        cond: Some(cond),
        post: Some(Box::new(post)),
        body,
    })
}

pub fn case(exprs: Vec<Expr>, body: Vec<Stmt>) -> SwitchCase {
    SwitchCase { exprs, body }
}

pub fn default_case(body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        exprs: Vec::new(),
        body,
    }
}

pub fn switch(subject: Expr, cases: Vec<SwitchCase>) -> Stmt {
    st(StmtKind::Switch { subject, cases })
}

pub fn try_catch(
    body: Vec<Stmt>,
    catch_var: Option<&str>,
    catch: Option<Vec<Stmt>>,
    finally: Option<Vec<Stmt>>,
) -> Stmt {
    st(StmtKind::Try {
        body,
        catch_var: catch_var.map(|name| name.to_string()),
        catch,
        finally,
    })
}

pub fn throw(expr: Expr) -> Stmt {
    st(StmtKind::Throw(expr))
}

pub fn module(name: &str, body: Vec<Stmt>) -> Stmt {
    st(StmtKind::Module {
        name: name.to_string(),
        body,
    })
}

pub fn go(call: Expr) -> Stmt {
    st(StmtKind::Go(call))
}

pub fn defer(call: Expr) -> Stmt {
    st(StmtKind::Defer(call))
}
