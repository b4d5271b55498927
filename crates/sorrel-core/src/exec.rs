use std::sync::{Arc, Mutex};
use std::thread;

use crate::ast::{Stmt, StmtKind};
use crate::bridge;
use crate::concurrency::{call_guarded, ExecContext};
use crate::env::Env;
use crate::error::{debug_enabled, SorrelError};
use crate::value::Value;

/// Control signal of one statement. Throws are not represented here: they ride
/// the error channel as `SorrelError::Thrown` so `try/catch` can take them.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal(Value),
    Break,
    Continue,
    Return(Vec<Value>),
}

pub(crate) struct Deferred {
    pub callable: Value,
    pub args: Vec<Value>,
}

/// One interpreter activation: the shared execution context plus the defer
/// stack of the current function invocation. Function calls and goroutines run
/// under a fresh activation; the context is inherited.
pub(crate) struct Interp {
    pub(crate) ctx: Arc<ExecContext>,
    defers: Mutex<Vec<Deferred>>,
}

impl Interp {
    pub(crate) fn new(ctx: Arc<ExecContext>) -> Interp {
        Interp {
            ctx,
            defers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn activation(&self) -> Interp {
        Interp::new(Arc::clone(&self.ctx))
    }

    /// Top-level entry: run the program, then the program's own defers, and
    /// collapse the final signal into a value.
    pub(crate) fn run_program(&self, stmts: &[Stmt], env: &Env) -> Result<Value, SorrelError> {
        let outcome = self.run_stmts(stmts, env);
        let outcome = self.settle_defers(outcome);
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

    pub(crate) fn run_stmts(&self, stmts: &[Stmt], env: &Env) -> Result<Flow, SorrelError> {
        let mut last = Value::Nil;
        for stmt in stmts {
            self.ctx.check()?;
            match self.run_stmt(stmt, env)? {
                Flow::Normal(value) => last = value,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn run_stmt(&self, stmt: &Stmt, env: &Env) -> Result<Flow, SorrelError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => Ok(Flow::Normal(self.eval(expr, env)?)),
            StmtKind::Var { names, exprs } => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.eval(expr, env)?);
                }
                // A single array right-hand side feeds a multi-name target,
                // which is how multi-value returns arrive.
                if names.len() > 1 && values.len() == 1 {
                    if let Value::Array(handle) = &values[0] {
                        values = handle.snapshot().into_iter().collect();
                    }
                }
                for (name, value) in names.iter().zip(values.iter()) {
                    env.define(name.clone(), value.clone());
                }
                Ok(Flow::Normal(values.last().cloned().unwrap_or(Value::Nil)))
            }
            StmtKind::If {
                cond,
                then,
                elifs,
                els,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    return self.run_stmts(then, &env.new_child());
                }
                for (elif_cond, elif_body) in elifs {
                    if self.eval(elif_cond, env)?.is_truthy() {
                        return self.run_stmts(elif_body, &env.new_child());
                    }
                }
                match els {
                    Some(body) => self.run_stmts(body, &env.new_child()),
                    None => Ok(Flow::Normal(Value::Nil)),
                }
            }
            StmtKind::While { cond, body } => {
                loop {
                    self.ctx.check()?;
                    if let Some(cond) = cond {
                        if !self.eval(cond, env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.run_stmts(body, &env.new_child())? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            StmtKind::ForIn { var, iter, body } => self.run_for_in(var, iter, body, env),
            StmtKind::CFor {
                init,
                cond,
                post,
                body,
            } => {
                let loop_env = env.new_child();
                if let Some(init) = init {
                    match self.run_stmt(init, &loop_env)? {
                        Flow::Normal(_) => {}
                        other => return Ok(other),
                    }
                }
                loop {
                    self.ctx.check()?;
                    if let Some(cond) = cond {
                        if !self.eval(cond, &loop_env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.run_stmts(body, &loop_env.new_child())? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if let Some(post) = post {
                        match self.run_stmt(post, &loop_env)? {
                            Flow::Normal(_) => {}
                            other => return Ok(other),
                        }
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            StmtKind::Switch { subject, cases } => {
                let subject = self.eval(subject, env)?;
                let mut default = None;
                for case in cases {
                    if case.exprs.is_empty() {
                        default = Some(&case.body);
                        continue;
                    }
                    for expr in &case.exprs {
                        if self.eval(expr, env)? == subject {
                            return self.run_case_body(&case.body, env);
                        }
                    }
                }
                match default {
                    Some(body) => self.run_case_body(body, env),
                    None => Ok(Flow::Normal(Value::Nil)),
                }
            }
            StmtKind::Try {
                body,
                catch_var,
                catch,
                finally,
            } => {
                let mut outcome = self.run_stmts(body, &env.new_child());
                if let Err(err) = &outcome {
                    if err.is_catchable() {
                        if let Some(catch_body) = catch {
                            let catch_env = env.new_child();
                            if let Some(var) = catch_var {
                                catch_env.define(var.clone(), err.catch_value());
                            }
                            outcome = self.run_stmts(catch_body, &catch_env);
                        }
                    }
                }
                if let Some(finally_body) = finally {
                    match self.run_stmts(finally_body, &env.new_child()) {
                        // Only a throw or return from finally overrides the
                        // prior outcome; break/continue leave it alone, so a
                        // pending throw or interrupt still propagates.
                        Ok(Flow::Normal(_) | Flow::Break | Flow::Continue) => {}
                        ret @ Ok(Flow::Return(_)) => outcome = ret,
                        Err(err) => outcome = Err(err),
                    }
                }
                outcome
            }
            StmtKind::Module { name, body } => {
                let module_env = env.new_module(name);
                match self.run_stmts(body, &module_env)? {
                    Flow::Normal(_) => Ok(Flow::Normal(Value::Nil)),
                    Flow::Return(_) => Err(SorrelError::invalid_operation_msg(
                        "unexpected return statement",
                    )),
                    Flow::Break => Err(SorrelError::invalid_operation_msg(
                        "unexpected break statement",
                    )),
                    Flow::Continue => Err(SorrelError::invalid_operation_msg(
                        "unexpected continue statement",
                    )),
                }
            }
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, env)?;
                Err(SorrelError::thrown(value).with_span(stmt.span))
            }
            StmtKind::Return(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.eval(expr, env)?);
                }
                Ok(Flow::Return(values))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Go(call) => {
                // Target and arguments are evaluated on this task so captured
                // values are well defined before the goroutine starts.
                let (callable, args) = self.prepare_call(call, env)?;
                let routine = self.activation();
                thread::spawn(move || {
                    let result = call_guarded(|| routine.call_value(callable, args));
                    if let Err(err) = result {
                        // Goroutine errors never propagate to the spawner.
                        if debug_enabled() && !matches!(err, SorrelError::Interrupt) {
                            eprintln!("goroutine error: {}", err);
                        }
                    }
                });
                Ok(Flow::Normal(Value::Nil))
            }
            StmtKind::Defer(call) => {
                let (callable, args) = self.prepare_call(call, env)?;
                self.defers.lock().unwrap().push(Deferred { callable, args });
                Ok(Flow::Normal(Value::Nil))
            }
        }
    }

    fn run_case_body(&self, body: &[Stmt], env: &Env) -> Result<Flow, SorrelError> {
        match self.run_stmts(body, &env.new_child())? {
            Flow::Break => Ok(Flow::Normal(Value::Nil)),
            other => Ok(other),
        }
    }

    fn run_for_in(
        &self,
        var: &str,
        iter: &crate::ast::Expr,
        body: &[Stmt],
        env: &Env,
    ) -> Result<Flow, SorrelError> {
        let iterable = self.eval(iter, env)?;
        match iterable {
            Value::Array(handle) => {
                for item in handle.snapshot() {
                    match self.run_iteration(var, item, body, env)? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            Value::Str(s) => {
                for rune in s.chars() {
                    match self.run_iteration(var, Value::Rune(rune), body, env)? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            Value::Map(handle) => {
                for key in handle.keys() {
                    match self.run_iteration(var, key.to_value(), body, env)? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            Value::Chan(chan) => loop {
                self.ctx.check()?;
                let (value, ok) = bridge::recv_chan(&chan, &self.ctx)?;
                if !ok {
                    return Ok(Flow::Normal(Value::Nil));
                }
                match self.run_iteration(var, value, body, env)? {
                    Flow::Break => return Ok(Flow::Normal(Value::Nil)),
                    Flow::Normal(_) | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            },
            other => Err(SorrelError::type_error(format!(
                "for cannot loop over type {}",
                other.type_name()
            ))),
        }
    }

    fn run_iteration(
        &self,
        var: &str,
        value: Value,
        body: &[Stmt],
        env: &Env,
    ) -> Result<Flow, SorrelError> {
        self.ctx.check()?;
        let iter_env = env.new_child();
        iter_env.define(var, value);
        self.run_stmts(body, &iter_env)
    }

    /// Run the activation's defers in LIFO order and merge their outcome with
    /// the body's. A failing deferred call abandons the rest and its error
    /// wins, mirroring a panic during unwinding.
    pub(crate) fn settle_defers(
        &self,
        outcome: Result<Flow, SorrelError>,
    ) -> Result<Flow, SorrelError> {
        loop {
            let deferred = self.defers.lock().unwrap().pop();
            let deferred = match deferred {
                Some(deferred) => deferred,
                None => return outcome,
            };
            if let Err(err) = self.call_value(deferred.callable, deferred.args) {
                self.defers.lock().unwrap().clear();
                return Err(err);
            }
        }
    }
}

/// Collapse explicit return values into one: none is nil, one is itself, many
/// become an array.
pub(crate) fn return_value(values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Nil,
        1 => values.into_iter().next().unwrap(),
        _ => Value::array_from(values),
    }
}
