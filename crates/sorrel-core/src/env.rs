use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ast::Stmt;
use crate::concurrency::ExecContext;
use crate::error::SorrelError;
use crate::exec::Interp;
use crate::types::TypeDesc;
use crate::value::{FnArity, Value};

/// A lexical scope. Cloning the handle shares the scope; scopes form a tree
/// through parent links and every scope of one tree shares the execution
/// context cell.
#[derive(Clone)]
pub struct Env {
    data: Arc<RwLock<EnvData>>,
    ctx_cell: Arc<RwLock<Arc<ExecContext>>>,
}

struct EnvData {
    values: HashMap<String, Value>,
    types: HashMap<String, TypeDesc>,
    parent: Option<Env>,
    module: bool,
}

impl EnvData {
    fn empty(parent: Option<Env>, module: bool) -> Self {
        Self {
            values: HashMap::new(),
            types: HashMap::new(),
            parent,
            module,
        }
    }
}

impl Env {
    /// A root environment with the builtin callables installed.
    pub fn new() -> Env {
        let env = Env {
            data: Arc::new(RwLock::new(EnvData::empty(None, false))),
            ctx_cell: Arc::new(RwLock::new(ExecContext::new())),
        };
        install_builtins(&env);
        env
    }

    /// Transparent child scope sharing the execution context.
    pub fn new_child(&self) -> Env {
        Env {
            data: Arc::new(RwLock::new(EnvData::empty(Some(self.clone()), false))),
            ctx_cell: Arc::clone(&self.ctx_cell),
        }
    }

    /// Module-boundary child, bound under `name` in this scope.
    pub fn new_module(&self, name: &str) -> Env {
        let module = Env {
            data: Arc::new(RwLock::new(EnvData::empty(Some(self.clone()), true))),
            ctx_cell: Arc::clone(&self.ctx_cell),
        };
        self.define(name, Value::Module(module.clone()));
        module
    }

    /// Detached module used by `import` to expose registry entries.
    pub(crate) fn new_detached_module(&self) -> Env {
        Env {
            data: Arc::new(RwLock::new(EnvData::empty(None, true))),
            ctx_cell: Arc::clone(&self.ctx_cell),
        }
    }

    pub fn is_module(&self) -> bool {
        self.data.read().unwrap().module
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Bind in this scope. Overwriting an existing same-scope binding is fine.
    pub fn define(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.data
            .write()
            .unwrap()
            .values
            .insert(name.into(), value.into());
    }

    pub fn define_type(&self, name: impl Into<String>, desc: TypeDesc) {
        self.data.write().unwrap().types.insert(name.into(), desc);
    }

    pub fn get(&self, name: &str) -> Result<Value, SorrelError> {
        let mut current = self.clone();
        loop {
            let next = {
                let guard = current.data.read().unwrap();
                if let Some(value) = guard.values.get(name) {
                    return Ok(value.clone());
                }
                guard.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(SorrelError::undefined_symbol(name)),
            }
        }
    }

    pub fn get_type(&self, name: &str) -> Result<TypeDesc, SorrelError> {
        let mut current = self.clone();
        loop {
            let next = {
                let guard = current.data.read().unwrap();
                if let Some(desc) = guard.types.get(name) {
                    return Ok(desc.clone());
                }
                guard.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(SorrelError::undefined_type(name)),
            }
        }
    }

    /// Update the nearest ancestor binding of `name`. Fails when no scope in
    /// the chain binds it.
    pub fn set(&self, name: &str, value: Value) -> Result<(), SorrelError> {
        let mut current = self.clone();
        loop {
            let next = {
                let mut guard = current.data.write().unwrap();
                if let Some(slot) = guard.values.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                guard.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(SorrelError::undefined_symbol(name)),
            }
        }
    }

    /// Assignment rule: write the nearest ancestor binding, or create one in
    /// this scope when nothing in the chain binds `name`.
    pub fn assign(&self, name: &str, value: Value) {
        if self.set(name, value.clone()).is_err() {
            self.define(name, value);
        }
    }

    /// Remove the binding from this scope only. Missing bindings are ignored.
    pub fn delete(&self, name: &str) {
        self.data.write().unwrap().values.remove(name);
    }

    /// Remove the binding from the nearest scope in the chain that holds it.
    pub fn delete_global(&self, name: &str) {
        let mut current = self.clone();
        loop {
            let next = {
                let mut guard = current.data.write().unwrap();
                if guard.values.remove(name).is_some() {
                    return;
                }
                guard.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return,
            }
        }
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.data.read().unwrap().values.contains_key(name)
    }

    /// Member lookup used for module access: local bindings only, and
    /// `_`-prefixed names are invisible from outside.
    pub fn get_exported(&self, name: &str) -> Result<Value, SorrelError> {
        if name.starts_with('_') {
            return Err(SorrelError::undefined_symbol(name));
        }
        let guard = self.data.read().unwrap();
        guard
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| SorrelError::undefined_symbol(name))
    }

    pub fn get_exported_type(&self, name: &str) -> Result<TypeDesc, SorrelError> {
        if name.starts_with('_') {
            return Err(SorrelError::undefined_type(name));
        }
        let guard = self.data.read().unwrap();
        guard
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| SorrelError::undefined_type(name))
    }

    /// Snapshot of this scope's own bindings.
    pub fn values(&self) -> Vec<(String, Value)> {
        self.data
            .read()
            .unwrap()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.data.read().unwrap().types.keys().cloned().collect()
    }

    /// Cooperative teardown: drop this scope's bindings so closure↔scope
    /// reference cycles are broken. Call on the root when discarding an
    /// embedding.
    pub fn clear(&self) {
        let mut guard = self.data.write().unwrap();
        guard.values.clear();
        guard.types.clear();
    }

    /// The execution context currently installed for this scope tree.
    pub fn context(&self) -> Arc<ExecContext> {
        self.ctx_cell.read().unwrap().clone()
    }

    fn install_context(&self, ctx: Arc<ExecContext>) {
        *self.ctx_cell.write().unwrap() = ctx;
    }

    /// Run a program with a fresh, never-cancelled context.
    pub fn execute(&self, stmts: &[Stmt]) -> Result<Value, SorrelError> {
        let ctx = ExecContext::new();
        self.install_context(Arc::clone(&ctx));
        Interp::new(ctx).run_program(stmts, self)
    }

    /// Run a program under a host-supplied cancellation context. A context
    /// that was already cancelled fails immediately.
    pub fn execute_with_context(
        &self,
        ctx: &Arc<ExecContext>,
        stmts: &[Stmt],
    ) -> Result<Value, SorrelError> {
        ctx.check()?;
        self.install_context(Arc::clone(ctx));
        Interp::new(Arc::clone(ctx)).run_program(stmts, self)
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

fn install_builtins(env: &Env) {
    env.define(
        "close",
        Value::native_fn_with_name("close", FnArity::exact(1), |args| {
            match &args[0] {
                Value::Chan(chan) => {
                    chan.close()?;
                    Ok(Value::Nil)
                }
                Value::Ref(cell) => match cell.load() {
                    Value::Chan(chan) => {
                        chan.close()?;
                        Ok(Value::Nil)
                    }
                    other => Err(SorrelError::channel(format!(
                        "type cannot be {} for close",
                        other.type_name()
                    ))),
                },
                other => Err(SorrelError::channel(format!(
                    "type cannot be {} for close",
                    other.type_name()
                ))),
            }
        }),
    );

    env.define(
        "keys",
        Value::native_fn_with_name("keys", FnArity::exact(1), |args| match &args[0] {
            Value::Map(map) => Ok(Value::array_from(
                map.keys().iter().map(|key| key.to_value()),
            )),
            other => Err(SorrelError::type_error(format!(
                "type {} does not support keys operation",
                other.type_name()
            ))),
        }),
    );

    env.define(
        "toString",
        Value::native_fn_with_name("toString", FnArity::exact(1), |args| {
            Ok(Value::Str(args[0].to_string()))
        }),
    );

    env.define(
        "typeOf",
        Value::native_fn_with_name("typeOf", FnArity::exact(1), |args| {
            Ok(Value::Str(args[0].type_name().to_string()))
        }),
    );
}
