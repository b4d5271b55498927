use im::Vector;

use crate::concurrency::{ChanHandle, ExecContext};
use crate::error::SorrelError;
use crate::types::TypeDesc;
use crate::value::{ArrayHandle, MapHandle, MapKey, NativeFn, Value};

/// Assignment-compatible conversion of `value` toward `target`. Numeric kinds
/// convert freely (float→int truncates); nil becomes the target's zero;
/// string↔rune is never implicit.
pub fn convert(value: Value, target: &TypeDesc) -> Result<Value, SorrelError> {
    match target {
        TypeDesc::Any => Ok(value),
        _ if matches!(value, Value::Nil) => Ok(target.zero()),
        TypeDesc::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => Err(SorrelError::cannot_assign(other.type_name(), "bool")),
        },
        TypeDesc::Int => match value {
            Value::Int(_) => Ok(value),
            Value::Float(x) => Ok(Value::Int(x as i64)),
            Value::Rune(r) => Ok(Value::Int(r as i64)),
            other => Err(SorrelError::cannot_assign(other.type_name(), "int")),
        },
        TypeDesc::Float => match value {
            Value::Float(_) => Ok(value),
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Rune(r) => Ok(Value::Float(r as u32 as f64)),
            other => Err(SorrelError::cannot_assign(other.type_name(), "float")),
        },
        TypeDesc::Rune => match value {
            Value::Rune(_) => Ok(value),
            Value::Int(n) => u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .map(Value::Rune)
                .ok_or_else(|| SorrelError::cannot_assign("int", "rune")),
            other => Err(SorrelError::cannot_assign(other.type_name(), "rune")),
        },
        TypeDesc::Str => match value {
            Value::Str(_) => Ok(value),
            other => Err(SorrelError::cannot_assign(other.type_name(), "string")),
        },
        TypeDesc::Ptr(inner) => match value {
            Value::Ref(cell) => {
                // Convert the pointee eagerly so a mismatched cell fails here.
                let converted = convert(cell.load(), inner)?;
                cell.store(converted);
                Ok(Value::Ref(cell))
            }
            other => Err(SorrelError::cannot_assign(
                other.type_name(),
                &target.describe(),
            )),
        },
        TypeDesc::Slice(inner) => match value {
            Value::Array(handle) => {
                let mut items = Vector::new();
                for item in handle.snapshot() {
                    items.push_back(convert(item, inner)?);
                }
                Ok(Value::Array(ArrayHandle::typed(items, (**inner).clone())))
            }
            other => Err(SorrelError::cannot_assign(
                other.type_name(),
                &target.describe(),
            )),
        },
        TypeDesc::Map(key_ty, value_ty) => match value {
            Value::Map(handle) => {
                let mut entries = im::HashMap::new();
                for (key, item) in handle.snapshot() {
                    let key = MapKey::from_value(&convert(key.to_value(), key_ty)?)?;
                    entries.insert(key, convert(item, value_ty)?);
                }
                Ok(Value::Map(MapHandle::typed(
                    entries,
                    (**key_ty).clone(),
                    (**value_ty).clone(),
                )))
            }
            other => Err(SorrelError::cannot_assign(
                other.type_name(),
                &target.describe(),
            )),
        },
        TypeDesc::Chan(_) => match value {
            Value::Chan(_) => Ok(value),
            other => Err(SorrelError::cannot_assign(
                other.type_name(),
                &target.describe(),
            )),
        },
        TypeDesc::Host(host) => match value {
            Value::Host(obj) if obj.type_name() == host.name() => Ok(Value::Host(obj)),
            other => Err(SorrelError::cannot_assign(other.type_name(), host.name())),
        },
    }
}

/// Field/method/namespace member read.
pub fn member(target: &Value, name: &str) -> Result<Value, SorrelError> {
    match target {
        Value::Map(map) => Ok(map
            .get(&MapKey::Str(name.to_string()))
            .unwrap_or(Value::Nil)),
        Value::Module(env) => env.get_exported(name),
        Value::Host(host) => host.get(name).ok_or_else(|| {
            SorrelError::type_error(format!(
                "no member named '{}' for type {}",
                name,
                host.type_name()
            ))
        }),
        Value::Ref(cell) => member(&cell.load(), name),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support member operation",
            other.type_name()
        ))),
    }
}

pub fn member_assign(target: &Value, name: &str, value: Value) -> Result<(), SorrelError> {
    match target {
        Value::Map(map) => {
            let converted = match map.value_type() {
                Some(desc) => convert(value, &desc)?,
                None => value,
            };
            map.insert(MapKey::Str(name.to_string()), converted);
            Ok(())
        }
        Value::Module(env) => {
            if name.starts_with('_') {
                return Err(SorrelError::undefined_symbol(name));
            }
            env.define(name, value);
            Ok(())
        }
        Value::Host(host) => host.set(name, value),
        Value::Ref(cell) => member_assign(&cell.load(), name, value),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support member operation",
            other.type_name()
        ))),
    }
}

fn index_to_int(index: &Value) -> Result<i64, SorrelError> {
    match index {
        Value::Int(n) => Ok(*n),
        Value::Rune(r) => Ok(*r as i64),
        Value::Float(x) => Ok(*x as i64),
        _ => Err(SorrelError::type_error("index must be a number")),
    }
}

pub fn index(target: &Value, key: &Value) -> Result<Value, SorrelError> {
    match target {
        Value::Array(handle) => {
            let i = index_to_int(key)?;
            if i < 0 || i as usize >= handle.len() {
                return Err(SorrelError::index_out_of_range());
            }
            Ok(handle.get(i as usize).unwrap_or(Value::Nil))
        }
        Value::Str(s) => {
            let i = index_to_int(key)?;
            if i < 0 || i as usize >= s.len() {
                return Err(SorrelError::index_out_of_range());
            }
            let byte = s.as_bytes()[i as usize];
            Ok(Value::Str(
                String::from_utf8_lossy(&[byte]).into_owned(),
            ))
        }
        Value::Map(map) => {
            let key = match map.key_type() {
                Some(desc) => convert(key.clone(), &desc)?,
                None => key.clone(),
            };
            Ok(map
                .get(&MapKey::from_value(&key)?)
                .unwrap_or(Value::Nil))
        }
        Value::Ref(cell) => index(&cell.load(), key),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support index operation",
            other.type_name()
        ))),
    }
}

/// In-place index assignment for arrays and maps. Strings are handled by
/// `string_index_assign` since they rebuild the value.
pub fn index_assign(target: &Value, key: &Value, value: Value) -> Result<(), SorrelError> {
    match target {
        Value::Array(handle) => {
            let i = index_to_int(key)?;
            let len = handle.len();
            if i < 0 || i as usize > len {
                return Err(SorrelError::index_out_of_range());
            }
            let converted = match handle.elem_type() {
                Some(desc) => convert(value, &desc)?,
                None => value,
            };
            if i as usize == len {
                handle.push(converted);
            } else {
                handle.set(i as usize, converted);
            }
            Ok(())
        }
        Value::Map(map) => {
            let key = match map.key_type() {
                Some(desc) => convert(key.clone(), &desc)?,
                None => key.clone(),
            };
            let converted = match map.value_type() {
                Some(desc) => convert(value, &desc)?,
                None => value,
            };
            map.insert(MapKey::from_value(&key)?, converted);
            Ok(())
        }
        Value::Ref(cell) => index_assign(&cell.load(), key, value),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support index operation",
            other.type_name()
        ))),
    }
}

/// `s[i] = v` over a logically immutable string: rebuild from prefix, the
/// written element, and suffix. Writing at `len(s)` appends; nil removes the
/// byte; ints/runes encode; strings splice.
pub fn string_index_assign(s: &str, key: &Value, value: Value) -> Result<String, SorrelError> {
    let i = index_to_int(key)?;
    let len = s.len();
    if i < 0 || i as usize > len {
        return Err(SorrelError::index_out_of_range());
    }
    let i = i as usize;
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(len + 4);
    out.extend_from_slice(&bytes[..i]);
    match value {
        Value::Nil => {}
        Value::Str(insert) => out.extend_from_slice(insert.as_bytes()),
        Value::Int(n) => {
            let byte = u8::try_from(n)
                .map_err(|_| SorrelError::cannot_assign("int", "string"))?;
            out.push(byte);
        }
        Value::Rune(r) => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(r.encode_utf8(&mut buf).as_bytes());
        }
        other => {
            return Err(SorrelError::cannot_assign(other.type_name(), "string"));
        }
    }
    if i < len {
        out.extend_from_slice(&bytes[i + 1..]);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn slice_bounds(
    begin: Option<i64>,
    end: Option<i64>,
    len: usize,
) -> Result<(usize, usize), SorrelError> {
    let begin = begin.unwrap_or(0);
    let end = end.unwrap_or(len as i64);
    if begin < 0 || end < 0 || begin > end || end > len as i64 {
        return Err(SorrelError::index_out_of_range());
    }
    Ok((begin as usize, end as usize))
}

/// Half-open slice over strings and arrays; `0 <= begin <= end <= len`.
pub fn slice(
    target: &Value,
    begin: Option<i64>,
    end: Option<i64>,
) -> Result<Value, SorrelError> {
    match target {
        Value::Str(s) => {
            let (begin, end) = slice_bounds(begin, end, s.len())?;
            Ok(Value::Str(
                String::from_utf8_lossy(&s.as_bytes()[begin..end]).into_owned(),
            ))
        }
        Value::Array(handle) => {
            let snapshot = handle.snapshot();
            let (begin, end) = slice_bounds(begin, end, snapshot.len())?;
            let items: Vector<Value> = snapshot
                .iter()
                .skip(begin)
                .take(end - begin)
                .cloned()
                .collect();
            Ok(match handle.elem_type() {
                Some(desc) => Value::Array(ArrayHandle::typed(items, desc)),
                None => Value::Array(ArrayHandle::new(items)),
            })
        }
        Value::Ref(cell) => slice(&cell.load(), begin, end),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support slice operation",
            other.type_name()
        ))),
    }
}

/// Replace `target[begin:end]` with the elements of `value` (arrays only).
pub fn slice_assign(
    target: &Value,
    begin: Option<i64>,
    end: Option<i64>,
    value: Value,
) -> Result<(), SorrelError> {
    match target {
        Value::Array(handle) => {
            let snapshot = handle.snapshot();
            let (begin, end) = slice_bounds(begin, end, snapshot.len())?;
            let replacement = match value {
                Value::Array(other) => other.snapshot(),
                other => {
                    return Err(SorrelError::cannot_assign(other.type_name(), "array"));
                }
            };
            let mut items: Vector<Value> =
                snapshot.iter().take(begin).cloned().collect();
            for item in replacement {
                let converted = match handle.elem_type() {
                    Some(desc) => convert(item, &desc)?,
                    None => item,
                };
                items.push_back(converted);
            }
            items.extend(snapshot.iter().skip(end).cloned());
            handle.replace(items);
            Ok(())
        }
        Value::Str(_) => Err(SorrelError::type_error(
            "type string does not support slice operation for assignment",
        )),
        Value::Ref(cell) => slice_assign(&cell.load(), begin, end, value),
        other => Err(SorrelError::type_error(format!(
            "type {} does not support slice operation",
            other.type_name()
        ))),
    }
}

/// Invoke a host trampoline: arity check, declared-parameter conversion, and
/// variadic tail absorption into a slice.
pub fn call_native(native: &NativeFn, args: Vec<Value>) -> Result<Value, SorrelError> {
    if !native.arity.accepts(args.len()) {
        return Err(SorrelError::invalid_operation_msg(format!(
            "function wants {} arguments but received {}",
            native.arity,
            args.len()
        )));
    }
    let args = convert_native_args(native, args)?;
    native.invoke(&args)
}

fn convert_native_args(native: &NativeFn, args: Vec<Value>) -> Result<Vec<Value>, SorrelError> {
    let params = match &native.params {
        Some(params) => params,
        None => return Ok(args),
    };
    let mut converted = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    for desc in params {
        match iter.next() {
            Some(arg) => converted.push(convert(arg, desc)?),
            None => break,
        }
    }
    let tail: Vec<Value> = iter.collect();
    if let Some(elem) = &native.variadic_elem {
        let mut items = Vector::new();
        for arg in tail {
            items.push_back(convert(arg, elem)?);
        }
        converted.push(Value::Array(ArrayHandle::typed(items, elem.clone())));
    } else {
        converted.extend(tail);
    }
    Ok(converted)
}

/// Channel send with element conversion; conversion failures get the channel
/// wording.
pub fn send_chan(chan: &ChanHandle, value: Value, ctx: &ExecContext) -> Result<(), SorrelError> {
    let value = match chan.elem_type() {
        Some(desc) => convert(value.clone(), &desc).map_err(|err| match err {
            SorrelError::Type(_) => SorrelError::channel(format!(
                "cannot use type {} as type {} to send to chan",
                value.type_name(),
                desc.describe()
            )),
            other => other,
        })?,
        None => value,
    };
    chan.send(value, ctx)
}

pub fn recv_chan(chan: &ChanHandle, ctx: &ExecContext) -> Result<(Value, bool), SorrelError> {
    chan.recv(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FnArity;

    #[test]
    fn numeric_conversions() {
        assert_eq!(
            convert(Value::Int(3), &TypeDesc::Float).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            convert(Value::Float(3.9), &TypeDesc::Int).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            convert(Value::Nil, &TypeDesc::Int).unwrap(),
            Value::Int(0)
        );
        assert!(convert(Value::Int(1), &TypeDesc::Bool).is_err());
        assert!(convert(Value::Str("a".into()), &TypeDesc::Rune).is_err());
        assert!(convert(Value::Rune('a'), &TypeDesc::Str).is_err());
    }

    #[test]
    fn round_trip_preserves_value() {
        for (value, desc) in [
            (Value::Int(5), TypeDesc::Int),
            (Value::Float(1.5), TypeDesc::Float),
            (Value::Str("s".into()), TypeDesc::Str),
            (Value::Bool(true), TypeDesc::Bool),
        ] {
            assert_eq!(convert(value.clone(), &desc).unwrap(), value);
        }
    }

    #[test]
    fn string_index_read_is_one_byte() {
        let s = Value::Str("test".into());
        assert_eq!(index(&s, &Value::Int(0)).unwrap(), Value::Str("t".into()));
        assert_eq!(index(&s, &Value::Int(3)).unwrap(), Value::Str("t".into()));
        assert!(index(&s, &Value::Int(4)).is_err());
        assert!(index(&s, &Value::Int(-1)).is_err());
        assert!(index(&s, &Value::Str("a".into())).is_err());
    }

    #[test]
    fn string_index_assign_splices() {
        assert_eq!(
            string_index_assign("abc", &Value::Int(1), Value::Str("x".into())).unwrap(),
            "axc"
        );
        assert_eq!(
            string_index_assign("abc", &Value::Int(3), Value::Str("x".into())).unwrap(),
            "abcx"
        );
        assert_eq!(
            string_index_assign("abc", &Value::Int(1), Value::Int(120)).unwrap(),
            "axc"
        );
        assert_eq!(
            string_index_assign("abc", &Value::Int(1), Value::Nil).unwrap(),
            "ac"
        );
        assert!(string_index_assign("abc", &Value::Int(4), Value::Str("x".into())).is_err());
        assert_eq!(
            string_index_assign("abc", &Value::Int(1), Value::Bool(true))
                .unwrap_err()
                .to_string(),
            "type bool cannot be assigned to type string"
        );
        assert_eq!(
            string_index_assign("abc", &Value::Int(1), Value::Float(2.2))
                .unwrap_err()
                .to_string(),
            "type float cannot be assigned to type string"
        );
    }

    #[test]
    fn rewrite_in_place_is_identity() {
        let s = "sorrel";
        for i in 0..s.len() {
            let current = index(&Value::Str(s.into()), &Value::Int(i as i64)).unwrap();
            assert_eq!(string_index_assign(s, &Value::Int(i as i64), current).unwrap(), s);
        }
    }

    #[test]
    fn slice_bounds_rules() {
        let s = Value::Str("test data".into());
        assert_eq!(
            slice(&s, Some(0), Some(9)).unwrap(),
            Value::Str("test data".into())
        );
        assert_eq!(slice(&s, Some(1), Some(3)).unwrap(), Value::Str("es".into()));
        assert_eq!(slice(&s, None, Some(2)).unwrap(), Value::Str("te".into()));
        assert_eq!(slice(&s, Some(7), None).unwrap(), Value::Str("ta".into()));
        assert!(slice(&s, Some(1), Some(0)).is_err());
        assert!(slice(&s, Some(-1), Some(2)).is_err());
        assert!(slice(&s, Some(0), Some(10)).is_err());
    }

    #[test]
    fn typed_array_write_converts() {
        let handle = ArrayHandle::typed(
            [Value::Int(0)].into_iter().collect(),
            TypeDesc::Int,
        );
        let target = Value::Array(handle.clone());
        index_assign(&target, &Value::Int(0), Value::Float(2.5)).unwrap();
        assert_eq!(handle.get(0), Some(Value::Int(2)));
        assert!(index_assign(&target, &Value::Int(0), Value::Str("x".into())).is_err());
    }

    #[test]
    fn array_index_append_at_len() {
        let target = Value::Array(ArrayHandle::new(Vector::new()));
        index_assign(&target, &Value::Int(0), Value::Int(1)).unwrap();
        assert_eq!(index(&target, &Value::Int(0)).unwrap(), Value::Int(1));
        assert!(index_assign(&target, &Value::Int(2), Value::Int(1)).is_err());
    }

    #[test]
    fn member_on_primitive_fails() {
        let err = member(&Value::Int(1), "b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type int does not support member operation"
        );
    }

    #[test]
    fn native_variadic_absorbs_tail() {
        let native = NativeFn::with_name(FnArity::at_least(1), "join", |args| {
            let mut out = String::new();
            if let Value::Str(sep) = &args[0] {
                if let Value::Array(rest) = &args[1] {
                    let parts: Vec<String> =
                        rest.snapshot().iter().map(|v| v.to_string()).collect();
                    out = parts.join(sep);
                }
            }
            Ok(Value::Str(out))
        })
        .with_params(vec![TypeDesc::Str])
        .with_variadic(TypeDesc::Str);

        let result = call_native(
            &native,
            vec![
                Value::Str("-".into()),
                Value::Str("a".into()),
                Value::Str("b".into()),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::Str("a-b".into()));
    }

    #[test]
    fn native_arity_mismatch() {
        let native = NativeFn::new(FnArity::exact(2), |_| Ok(Value::Nil));
        let err = call_native(&native, vec![Value::Nil]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "function wants 2 arguments but received 1"
        );
    }

    #[test]
    fn typed_chan_send_conversion_error_wording() {
        let ctx = ExecContext::new();
        let chan = ChanHandle::new(Some(2), Some(TypeDesc::Bool));
        let err = send_chan(&chan, Value::Int(1), &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot use type int as type bool to send to chan"
        );
    }
}
