use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::env::Env;
use crate::error::SorrelError;
use crate::types::TypeDesc;
use crate::value::Value;

/// One registered host package: flat symbol and type tables exposed to
/// scripts through `import(name)`.
#[derive(Clone, Default)]
pub struct Package {
    pub symbols: HashMap<String, Value>,
    pub types: HashMap<String, TypeDesc>,
}

static REGISTRY: Lazy<RwLock<HashMap<String, Package>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or replace) a package. Process-global; read-only from scripts.
pub fn register_package(
    name: impl Into<String>,
    symbols: HashMap<String, Value>,
    types: HashMap<String, TypeDesc>,
) {
    REGISTRY
        .write()
        .unwrap()
        .insert(name.into(), Package { symbols, types });
}

pub fn lookup(name: &str) -> Option<Package> {
    REGISTRY.read().unwrap().get(name).cloned()
}

pub fn package_names() -> Vec<String> {
    REGISTRY.read().unwrap().keys().cloned().collect()
}

/// Materialize a package as a module value for `import(name)`.
pub(crate) fn import(env: &Env, name: &str) -> Result<Value, SorrelError> {
    let package = lookup(name).ok_or_else(|| {
        SorrelError::invalid_operation_msg(format!("package not found '{}'", name))
    })?;
    let module = env.new_detached_module();
    for (symbol, value) in package.symbols {
        module.define(symbol, value);
    }
    for (type_name, desc) in package.types {
        module.define_type(type_name, desc);
    }
    Ok(Value::Module(module))
}
