use std::cmp::Ordering;
use std::sync::Arc;

use im::Vector;

use crate::ast::{BinaryOp, Expr, ExprKind, TypeExpr, UnaryOp};
use crate::bridge;
use crate::env::Env;
use crate::error::SorrelError;
use crate::exec::{return_value, Flow, Interp};
use crate::package_registry;
use crate::types::TypeDesc;
use crate::value::{ArrayHandle, Closure, MapHandle, MapKey, RefHandle, Value};

impl Interp {
    pub(crate) fn eval(&self, expr: &Expr, env: &Env) -> Result<Value, SorrelError> {
        match &expr.kind {
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Rune(r) => Ok(Value::Rune(*r)),
            ExprKind::Ident(name) => env.get(name).map_err(|err| err.with_span(expr.span)),
            ExprKind::Array(items) => {
                let mut values = Vector::new();
                for item in items {
                    values.push_back(self.eval(item, env)?);
                }
                Ok(Value::Array(ArrayHandle::new(values)))
            }
            ExprKind::Map(entries) => {
                let mut map = im::HashMap::new();
                for (key_expr, value_expr) in entries {
                    let key = self.eval_map_key(key_expr, env)?;
                    let value = self.eval(value_expr, env)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(MapHandle::new(map)))
            }
            ExprKind::Paren(inner) => self.eval(inner, env),
            ExprKind::Member { target, name } => {
                let target = self.eval(target, env)?;
                bridge::member(&target, name).map_err(|err| err.with_span(expr.span))
            }
            ExprKind::Index { target, index } => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                bridge::index(&target, &index).map_err(|err| err.with_span(expr.span))
            }
            ExprKind::Slice { target, begin, end } => {
                let target = self.eval(target, env)?;
                let begin = self.eval_bound(begin.as_deref(), env)?;
                let end = self.eval_bound(end.as_deref(), env)?;
                bridge::slice(&target, begin, end).map_err(|err| err.with_span(expr.span))
            }
            ExprKind::Unary { op, expr: inner } => {
                let value = self.eval(inner, env)?;
                eval_unary(*op, value).map_err(|err| err.with_span(expr.span))
            }
            ExprKind::Addr(inner) => {
                let value = match &inner.kind {
                    ExprKind::Ident(name) => env.get(name)?,
                    ExprKind::Member { target, name } => {
                        let target = self.eval(target, env)?;
                        bridge::member(&target, name)?
                    }
                    _ => return Err(SorrelError::invalid_operation().with_span(expr.span)),
                };
                Ok(Value::Ref(RefHandle::new(value)))
            }
            ExprKind::Deref(inner) => {
                let value = match &inner.kind {
                    ExprKind::Ident(name) => env.get(name)?,
                    ExprKind::Member { target, name } => {
                        let target = self.eval(target, env)?;
                        bridge::member(&target, name)?
                    }
                    _ => self.eval(inner, env)?,
                };
                match value {
                    Value::Ref(cell) => Ok(cell.load()),
                    other => Err(SorrelError::invalid_operation_msg(format!(
                        "cannot deref type {}",
                        other.type_name()
                    ))
                    .with_span(expr.span)),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let left = self.eval(lhs, env)?;
                    if !left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval(rhs, env)
                    }
                }
                BinaryOp::Or => {
                    let left = self.eval(lhs, env)?;
                    if left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval(rhs, env)
                    }
                }
                BinaryOp::Eq => {
                    let left = self.eval(lhs, env)?;
                    let right = self.eval(rhs, env)?;
                    Ok(Value::Bool(left == right))
                }
                BinaryOp::Ne => {
                    let left = self.eval(lhs, env)?;
                    let right = self.eval(rhs, env)?;
                    Ok(Value::Bool(left != right))
                }
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let left = self.eval(lhs, env)?;
                    let right = self.eval(rhs, env)?;
                    compare_ordered(*op, &left, &right).map_err(|err| err.with_span(expr.span))
                }
                _ => {
                    let left = self.eval(lhs, env)?;
                    let right = self.eval(rhs, env)?;
                    eval_arith(*op, left, right).map_err(|err| err.with_span(expr.span))
                }
            },
            ExprKind::Ternary { cond, then, els } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(els, env)
                }
            }
            ExprKind::Lets { lhs, rhs } => {
                let mut values = Vec::with_capacity(rhs.len());
                for expr in rhs {
                    values.push(self.eval(expr, env)?);
                }
                // A single array feeding a multi-target left side spreads,
                // which is how multi-value returns fill a tuple.
                if lhs.len() > 1 && values.len() == 1 {
                    if let Value::Array(handle) = &values[0] {
                        values = handle.snapshot().into_iter().collect();
                    }
                }
                for (target, value) in lhs.iter().zip(values.iter()) {
                    self.assign_lvalue(target, value.clone(), env)
                        .map_err(|err| err.with_span(target.span))?;
                }
                Ok(values.last().cloned().unwrap_or(Value::Nil))
            }
            ExprKind::OpAssign { op, lhs, rhs } => {
                let current = self.eval(lhs, env)?;
                let operand = self.eval(rhs, env)?;
                let result = eval_arith(*op, current, operand)
                    .map_err(|err| err.with_span(expr.span))?;
                self.assign_lvalue(lhs, result.clone(), env)?;
                Ok(result)
            }
            ExprKind::PostIncr(lhs) => {
                let current = self.eval(lhs, env)?;
                let result = eval_arith(BinaryOp::Add, current, Value::Int(1))
                    .map_err(|err| err.with_span(expr.span))?;
                self.assign_lvalue(lhs, result.clone(), env)?;
                Ok(result)
            }
            ExprKind::PostDecr(lhs) => {
                let current = self.eval(lhs, env)?;
                let result = eval_arith(BinaryOp::Sub, current, Value::Int(1))
                    .map_err(|err| err.with_span(expr.span))?;
                self.assign_lvalue(lhs, result.clone(), env)?;
                Ok(result)
            }
            ExprKind::Func {
                name,
                params,
                variadic,
                body,
            } => {
                let closure = Value::Func(Arc::new(Closure {
                    name: name.clone(),
                    params: params.clone(),
                    variadic: *variadic,
                    body: body.clone(),
                    env: env.clone(),
                }));
                if let Some(name) = name {
                    env.define(name.clone(), closure.clone());
                }
                Ok(closure)
            }
            ExprKind::Call {
                callee,
                args,
                splat,
            } => {
                let callable = self.eval(callee, env)?;
                let args = self.eval_args(args, *splat, env)?;
                self.call_value(callable, args)
                    .map_err(|err| err.with_span(expr.span))
            }
            ExprKind::Chan { lhs, rhs } => self.eval_chan(lhs.as_deref(), rhs, env, expr),
            ExprKind::New(ty) => {
                let desc = self.resolve_type(ty, env)?;
                Ok(Value::Ref(RefHandle::new(desc.zero())))
            }
            ExprKind::Make { ty, len, cap } => self.eval_make(ty, len.as_deref(), cap.as_deref(), env),
            ExprKind::MakeChan { elem, size } => {
                let elem = self.resolve_type(elem, env)?;
                let size = match size {
                    Some(expr) => match self.eval(expr, env)? {
                        Value::Int(n) if n >= 0 => n as usize,
                        Value::Int(_) => return Err(SorrelError::invalid_operation()),
                        other => {
                            return Err(SorrelError::type_error(format!(
                                "make chan size must be int, got {}",
                                other.type_name()
                            )))
                        }
                    },
                    None => 0,
                };
                Ok(Value::Chan(crate::concurrency::ChanHandle::new(
                    Some(size),
                    Some(elem),
                )))
            }
            ExprKind::MakeType { name, expr: value } => {
                let value = self.eval(value, env)?;
                let desc = TypeDesc::of_value(&value)?;
                env.define_type(name.clone(), desc.clone());
                Ok(Value::Type(desc))
            }
            ExprKind::Len(inner) => {
                let value = self.eval(inner, env)?;
                let len = match &value {
                    Value::Str(s) => s.len(),
                    Value::Array(handle) => handle.len(),
                    Value::Map(handle) => handle.len(),
                    Value::Chan(chan) => chan.len(),
                    other => {
                        return Err(SorrelError::type_error(format!(
                            "type {} does not support len operation",
                            other.type_name()
                        ))
                        .with_span(expr.span))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            ExprKind::Delete { target, arg } => self.eval_delete(target, arg.as_deref(), env),
            ExprKind::Include { item, list } => {
                let item = self.eval(item, env)?;
                match self.eval(list, env)? {
                    Value::Array(handle) => {
                        let found = handle.snapshot().iter().any(|member| *member == item);
                        Ok(Value::Bool(found))
                    }
                    other => Err(SorrelError::type_error(format!(
                        "second argument to include must be array, got {}",
                        other.type_name()
                    ))),
                }
            }
            ExprKind::Import(name) => {
                let name = match self.eval(name, env)? {
                    Value::Str(name) => name,
                    other => {
                        return Err(SorrelError::type_error(format!(
                            "import argument must be string, got {}",
                            other.type_name()
                        )))
                    }
                };
                package_registry::import(env, &name).map_err(|err| err.with_span(expr.span))
            }
        }
    }

    fn eval_map_key(&self, expr: &Expr, env: &Env) -> Result<MapKey, SorrelError> {
        // Bare identifiers in map literal key position are their own name.
        if let ExprKind::Ident(name) = &expr.kind {
            return Ok(MapKey::Str(name.clone()));
        }
        let value = self.eval(expr, env)?;
        MapKey::from_value(&value).map_err(|err| err.with_span(expr.span))
    }

    fn eval_bound(&self, expr: Option<&Expr>, env: &Env) -> Result<Option<i64>, SorrelError> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr, env)? {
                Value::Int(n) => Ok(Some(n)),
                Value::Rune(r) => Ok(Some(r as i64)),
                Value::Float(x) => Ok(Some(x as i64)),
                _ => Err(SorrelError::type_error("index must be a number")),
            },
        }
    }

    fn eval_args(
        &self,
        args: &[Expr],
        splat: bool,
        env: &Env,
    ) -> Result<Vec<Value>, SorrelError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        if splat {
            match values.pop() {
                Some(Value::Array(handle)) => values.extend(handle.snapshot()),
                Some(other) => {
                    return Err(SorrelError::type_error(format!(
                        "cannot expand type {} as arguments",
                        other.type_name()
                    )))
                }
                None => return Err(SorrelError::invalid_operation()),
            }
        }
        Ok(values)
    }

    /// Evaluate a call form's target and arguments without invoking it; used
    /// by `go` and `defer`, which capture at statement time.
    pub(crate) fn prepare_call(
        &self,
        expr: &Expr,
        env: &Env,
    ) -> Result<(Value, Vec<Value>), SorrelError> {
        match &expr.kind {
            ExprKind::Call {
                callee,
                args,
                splat,
            } => {
                let callable = self.eval(callee, env)?;
                let args = self.eval_args(args, *splat, env)?;
                Ok((callable, args))
            }
            _ => Err(SorrelError::invalid_operation().with_span(expr.span)),
        }
    }

    /// Call dispatch: script closures get a fresh activation over a child of
    /// their defining scope; host trampolines go through the bridge.
    pub(crate) fn call_value(
        &self,
        callable: Value,
        args: Vec<Value>,
    ) -> Result<Value, SorrelError> {
        match callable {
            Value::Native(native) => bridge::call_native(&native, args),
            Value::Func(closure) => {
                let call_env = closure.env.new_child();
                bind_params(&closure, args, &call_env)?;
                let activation = self.activation();
                let outcome = activation.run_stmts(&closure.body, &call_env);
                let outcome = activation.settle_defers(outcome);
                match outcome? {
                    Flow::Normal(value) => Ok(value),
                    Flow::Return(values) => Ok(return_value(values)),
                    Flow::Break => Err(SorrelError::invalid_operation_msg(
                        "unexpected break statement",
                    )),
                    Flow::Continue => Err(SorrelError::invalid_operation_msg(
                        "unexpected continue statement",
                    )),
                }
            }
            Value::Ref(cell) => self.call_value(cell.load(), args),
            other => Err(SorrelError::invalid_operation_msg(format!(
                "cannot call type {}",
                other.type_name()
            ))),
        }
    }

    /// Write `value` through an assignable expression: identifier, member,
    /// index, slice, deref, or parenthesized form of one.
    pub(crate) fn assign_lvalue(
        &self,
        target: &Expr,
        value: Value,
        env: &Env,
    ) -> Result<(), SorrelError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                env.assign(name, value);
                Ok(())
            }
            ExprKind::Member {
                target: member_target,
                name,
            } => {
                let object = self.eval(member_target, env)?;
                bridge::member_assign(&object, name, value)
            }
            ExprKind::Index {
                target: index_target,
                index,
            } => {
                let object = self.eval(index_target, env)?;
                let key = self.eval(index, env)?;
                match &object {
                    // Strings rebuild and write back through the same l-value.
                    Value::Str(s) => {
                        let rebuilt = bridge::string_index_assign(s, &key, value)?;
                        self.assign_lvalue(index_target, Value::Str(rebuilt), env)
                    }
                    _ => bridge::index_assign(&object, &key, value),
                }
            }
            ExprKind::Slice {
                target: slice_target,
                begin,
                end,
            } => {
                let object = self.eval(slice_target, env)?;
                let begin = self.eval_bound(begin.as_deref(), env)?;
                let end = self.eval_bound(end.as_deref(), env)?;
                bridge::slice_assign(&object, begin, end, value)
            }
            ExprKind::Deref(inner) => {
                let cell = self.eval(inner, env)?;
                match cell {
                    Value::Ref(cell) => {
                        cell.store(value);
                        Ok(())
                    }
                    other => Err(SorrelError::invalid_operation_msg(format!(
                        "cannot deref type {}",
                        other.type_name()
                    ))),
                }
            }
            ExprKind::Paren(inner) => self.assign_lvalue(inner, value, env),
            _ => Err(SorrelError::invalid_operation().with_span(target.span)),
        }
    }

    fn eval_chan(
        &self,
        lhs: Option<&Expr>,
        rhs: &Expr,
        env: &Env,
        expr: &Expr,
    ) -> Result<Value, SorrelError> {
        match lhs {
            None => {
                let source = self.eval(rhs, env)?;
                match chan_of(&source) {
                    Some(chan) => {
                        let (value, _ok) = bridge::recv_chan(&chan, &self.ctx)?;
                        Ok(value)
                    }
                    None => Err(SorrelError::invalid_operation_msg(
                        "invalid operation for chan",
                    )
                    .with_span(expr.span)),
                }
            }
            Some(lhs) => {
                let lhs_value = match self.eval(lhs, env) {
                    Ok(value) => Some(value),
                    Err(SorrelError::UndefinedSymbol(_)) => None,
                    Err(err) => return Err(err),
                };
                if let Some(chan) = lhs_value.as_ref().and_then(chan_of) {
                    let value = self.eval(rhs, env)?;
                    bridge::send_chan(&chan, value, &self.ctx)?;
                    return Ok(Value::Nil);
                }
                // Left side is not a channel: a channel on the right makes
                // this a receive-assign.
                let source = self.eval(rhs, env)?;
                match chan_of(&source) {
                    Some(chan) => {
                        let (value, _ok) = bridge::recv_chan(&chan, &self.ctx)?;
                        self.assign_lvalue(lhs, value.clone(), env)?;
                        Ok(value)
                    }
                    None => Err(SorrelError::invalid_operation_msg(
                        "invalid operation for chan",
                    )
                    .with_span(expr.span)),
                }
            }
        }
    }

    fn eval_make(
        &self,
        ty: &TypeExpr,
        len: Option<&Expr>,
        cap: Option<&Expr>,
        env: &Env,
    ) -> Result<Value, SorrelError> {
        let desc = self.resolve_type(ty, env)?;
        match &desc {
            TypeDesc::Slice(elem) => {
                let len = self.eval_size(len, env)?.unwrap_or(0);
                let cap = self.eval_size(cap, env)?;
                if let Some(cap) = cap {
                    if len > cap {
                        return Err(SorrelError::invalid_operation_msg("make slice len > cap"));
                    }
                }
                let mut items = Vector::new();
                for _ in 0..len {
                    items.push_back(elem.zero());
                }
                Ok(Value::Array(ArrayHandle::typed(items, (**elem).clone())))
            }
            _ => {
                if len.is_some() || cap.is_some() {
                    return Err(SorrelError::invalid_operation_msg(format!(
                        "make of type {} takes no size",
                        desc.describe()
                    )));
                }
                Ok(desc.zero())
            }
        }
    }

    fn eval_size(&self, expr: Option<&Expr>, env: &Env) -> Result<Option<usize>, SorrelError> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr, env)? {
                Value::Int(n) if n >= 0 => Ok(Some(n as usize)),
                Value::Int(_) => Err(SorrelError::invalid_operation()),
                other => Err(SorrelError::type_error(format!(
                    "make size must be int, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_delete(
        &self,
        target: &Expr,
        arg: Option<&Expr>,
        env: &Env,
    ) -> Result<Value, SorrelError> {
        let subject = self.eval(target, env)?;
        match subject {
            Value::Str(name) => {
                let global = match arg {
                    Some(expr) => self.eval(expr, env)?.is_truthy(),
                    None => false,
                };
                if global {
                    env.delete_global(&name);
                } else {
                    env.delete(&name);
                }
                Ok(Value::Nil)
            }
            Value::Map(map) => {
                let key_expr = arg.ok_or_else(|| {
                    SorrelError::invalid_operation_msg(
                        "second argument to delete cannot be nil for map",
                    )
                })?;
                let key = self.eval(key_expr, env)?;
                let key = match map.key_type() {
                    Some(desc) => bridge::convert(key.clone(), &desc).map_err(|_| {
                        SorrelError::type_error(format!(
                            "cannot use type {} as type {} in delete",
                            key.type_name(),
                            desc.describe()
                        ))
                    })?,
                    None => key,
                };
                map.remove(&MapKey::from_value(&key)?);
                Ok(Value::Nil)
            }
            other => Err(SorrelError::invalid_operation_msg(format!(
                "first argument to delete cannot be type {}",
                other.type_name()
            ))),
        }
    }

    fn resolve_type(&self, ty: &TypeExpr, env: &Env) -> Result<TypeDesc, SorrelError> {
        match ty {
            TypeExpr::Name(name) => match TypeDesc::primitive(name) {
                Some(desc) => Ok(desc),
                None => env.get_type(name),
            },
            TypeExpr::Member(ns, name) => match env.get(ns) {
                Ok(Value::Module(module)) => module.get_exported_type(name),
                _ => Err(SorrelError::type_error(format!(
                    "no namespace called: {}",
                    ns
                ))),
            },
            TypeExpr::Ptr(inner) => Ok(TypeDesc::ptr(self.resolve_type(inner, env)?)),
            TypeExpr::Slice(inner) => Ok(TypeDesc::slice(self.resolve_type(inner, env)?)),
            TypeExpr::Map(key, value) => Ok(TypeDesc::map(
                self.resolve_type(key, env)?,
                self.resolve_type(value, env)?,
            )),
            TypeExpr::Chan(inner) => Ok(TypeDesc::chan(self.resolve_type(inner, env)?)),
        }
    }
}

fn chan_of(value: &Value) -> Option<crate::concurrency::ChanHandle> {
    match value {
        Value::Chan(chan) => Some(chan.clone()),
        Value::Ref(cell) => match cell.load() {
            Value::Chan(chan) => Some(chan),
            _ => None,
        },
        _ => None,
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, SorrelError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Rune(r) => Ok(Value::Int(-(r as i64))),
            other => Err(SorrelError::invalid_operation_msg(format!(
                "cannot negate type {}",
                other.type_name()
            ))),
        },
        UnaryOp::BitNot => match value {
            Value::Int(n) => Ok(Value::Int(!n)),
            Value::Rune(r) => Ok(Value::Int(!(r as i64))),
            other => Err(SorrelError::type_error(format!(
                "bitwise complement requires int, got {}",
                other.type_name()
            ))),
        },
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Rune(r) => Some(*r as i64),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(x) => Some(*x),
        Value::Int(n) => Some(*n as f64),
        Value::Rune(r) => Some(*r as u32 as f64),
        _ => None,
    }
}

fn is_float(value: &Value) -> bool {
    matches!(value, Value::Float(_))
}

fn eval_arith(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SorrelError> {
    match op {
        BinaryOp::Add => eval_add(lhs, rhs),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => eval_numeric(op, lhs, rhs),
        BinaryOp::Mod
        | BinaryOp::Shl
        | BinaryOp::Shr
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor => eval_int_op(op, lhs, rhs),
        _ => Err(SorrelError::invalid_operation()),
    }
}

fn eval_add(lhs: Value, rhs: Value) -> Result<Value, SorrelError> {
    match (&lhs, &rhs) {
        (Value::Str(a), Value::Str(b)) => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::Str(out))
        }
        (Value::Str(a), Value::Rune(b)) => {
            let mut out = a.clone();
            out.push(*b);
            Ok(Value::Str(out))
        }
        (Value::Rune(a), Value::Str(b)) => {
            let mut out = String::with_capacity(b.len() + 4);
            out.push(*a);
            out.push_str(b);
            Ok(Value::Str(out))
        }
        // Array append; right-hand arrays concatenate.
        (Value::Array(a), Value::Array(b)) => {
            let mut items = a.snapshot();
            items.append(b.snapshot());
            Ok(Value::Array(ArrayHandle::new(items)))
        }
        (Value::Array(a), _) => {
            let mut items = a.snapshot();
            items.push_back(rhs);
            Ok(Value::Array(ArrayHandle::new(items)))
        }
        // Map union; right side wins on key collisions.
        (Value::Map(a), Value::Map(b)) => {
            let mut entries = a.snapshot();
            for (key, value) in b.snapshot() {
                entries.insert(key, value);
            }
            Ok(Value::Map(MapHandle::new(entries)))
        }
        _ => eval_numeric(BinaryOp::Add, lhs, rhs),
    }
}

fn eval_numeric(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SorrelError> {
    if is_float(&lhs) || is_float(&rhs) {
        let (a, b) = match (as_float(&lhs), as_float(&rhs)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(arith_type_error(op, &lhs, &rhs)),
        };
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => return Err(arith_type_error(op, &lhs, &rhs)),
        };
        return Ok(Value::Float(result));
    }
    let (a, b) = match (as_int(&lhs), as_int(&rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(arith_type_error(op, &lhs, &rhs)),
    };
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(SorrelError::invalid_operation_msg("integer divide by zero"));
            }
            a.wrapping_div(b)
        }
        _ => return Err(arith_type_error(op, &lhs, &rhs)),
    };
    Ok(Value::Int(result))
}

fn eval_int_op(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SorrelError> {
    let (a, b) = match (as_int(&lhs), as_int(&rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(arith_type_error(op, &lhs, &rhs)),
    };
    let result = match op {
        BinaryOp::Mod => {
            if b == 0 {
                return Err(SorrelError::invalid_operation_msg("integer divide by zero"));
            }
            a.wrapping_rem(b)
        }
        BinaryOp::Shl => {
            if b < 0 {
                return Err(SorrelError::invalid_operation_msg("negative shift amount"));
            }
            if b >= 64 {
                0
            } else {
                a.wrapping_shl(b as u32)
            }
        }
        BinaryOp::Shr => {
            if b < 0 {
                return Err(SorrelError::invalid_operation_msg("negative shift amount"));
            }
            if b >= 64 {
                if a < 0 {
                    -1
                } else {
                    0
                }
            } else {
                a.wrapping_shr(b as u32)
            }
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        _ => return Err(arith_type_error(op, &lhs, &rhs)),
    };
    Ok(Value::Int(result))
}

fn arith_type_error(op: BinaryOp, lhs: &Value, rhs: &Value) -> SorrelError {
    SorrelError::invalid_operation_msg(format!(
        "invalid operation {} between {} and {}",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn compare_ordered(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, SorrelError> {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Greater),
            _ => {
                return Err(SorrelError::invalid_operation_msg(format!(
                    "cannot compare types {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        },
    };
    let result = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return Err(SorrelError::invalid_operation()),
    };
    Ok(Value::Bool(result))
}

fn bind_params(closure: &Closure, args: Vec<Value>, env: &Env) -> Result<(), SorrelError> {
    if closure.variadic {
        let fixed = closure.params.len().saturating_sub(1);
        if args.len() < fixed {
            return Err(SorrelError::invalid_operation_msg(format!(
                "function wants {}+ arguments but received {}",
                fixed,
                args.len()
            )));
        }
        let mut args = args;
        let tail: Vec<Value> = args.split_off(fixed);
        for (name, value) in closure.params.iter().take(fixed).zip(args) {
            env.define(name.clone(), value);
        }
        if let Some(rest) = closure.params.last() {
            env.define(rest.clone(), Value::array_from(tail));
        }
        Ok(())
    } else {
        if args.len() != closure.params.len() {
            return Err(SorrelError::invalid_operation_msg(format!(
                "function wants {} arguments but received {}",
                closure.params.len(),
                args.len()
            )));
        }
        for (name, value) in closure.params.iter().zip(args) {
            env.define(name.clone(), value);
        }
        Ok(())
    }
}
