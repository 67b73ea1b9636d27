use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::script::ast::FunctionDef;
use crate::script::interp::Interpreter;

const MAX_JSON_LEN: usize = 64 * 1024;

pub type NativeFn = dyn Fn(&mut Interpreter, &[Value]) -> Result<Value, ScriptError>;

/// Host function exposed to scripts.
pub struct Native {
    pub name: String,
    pub func: Box<NativeFn>,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[native {}]", self.name)
    }
}

/// A script function together with the scope it closed over.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    // the captured scope may refer back to this closure
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[function {}]", self.def.name.as_deref().unwrap_or("anonymous"))
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Rc<Closure>),
    Native(Rc<Native>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Object(Rc::new(RefCell::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn string(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Interpreter, &[Value]) -> Result<Value, ScriptError> + 'static,
    {
        Self::Native(Rc::new(Native {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Function(_) | Self::Native(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) | Self::Object(_) => "object",
            Self::Function(_) | Self::Native(_) => "function",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Non-negative integral number usable as an index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    /// Field lookup on an object; `Undefined` for anything else.
    pub fn field(&self, key: &str) -> Value {
        match self {
            Self::Object(map) => map.borrow().get(key).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Strict equality: identity for reference types, value for the rest.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Loose equality: like strict, but `null == undefined`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        matches!(
            (self, other),
            (Self::Null | Self::Undefined, Self::Null | Self::Undefined)
        ) || self.strict_eq(other)
    }

    /// JSON-ish rendering used by `JSON.stringify` and console output.
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0);
        out
    }

    fn write_json(&self, out: &mut String, depth: usize) {
        if depth > 32 || out.len() > MAX_JSON_LEN {
            out.push_str("null");
            return;
        }
        match self {
            Self::Str(s) => {
                out.push('"');
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_json(out, depth + 1);
                }
                out.push(']');
            }
            Self::Object(map) => {
                out.push('{');
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    Value::string(key).write_json(out, depth + 1);
                    out.push(':');
                    value.write_json(out, depth + 1);
                }
                out.push('}');
            }
            Self::Undefined | Self::Function(_) | Self::Native(_) => out.push_str("null"),
            other => out.push_str(&other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => {
                if n.is_nan() {
                    f.write_str("NaN")
                } else if n.is_infinite() {
                    f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Str(s) => f.write_str(s),
            Self::Array(_) | Self::Object(_) => f.write_str(&self.to_json()),
            Self::Function(c) => write!(
                f,
                "[function {}]",
                c.def.name.as_deref().unwrap_or("anonymous")
            ),
            Self::Native(n) => write!(f, "[native {}]", n.name),
        }
    }
}

#[derive(Debug)]
struct Binding {
    value: Value,
    mutable: bool,
}

/// One lexical scope. Scopes chain to their parent up to the globals.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Env>,
}

pub type Env = Rc<Scope>;

impl Scope {
    pub fn root() -> Env {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(ScriptError::ConstAssign(name.to_string()));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(ScriptError::Reference(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
        assert!(Value::string("0").is_truthy());
    }

    #[test]
    fn equality_distinguishes_identity_from_value() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);

        assert!(a.strict_eq(&a.clone()));
        assert!(!a.strict_eq(&b));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
    }

    #[test]
    fn json_rendering_is_stable() {
        let value = Value::object([
            ("row", Value::Number(2.0)),
            ("col", Value::Number(3.5)),
            ("tag", Value::string("a\"b")),
        ]);

        assert_eq!(value.to_json(), r#"{"col":3.5,"row":2,"tag":"a\"b"}"#);
    }

    #[test]
    fn scopes_shadow_and_reject_const_assignment() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), false);
        let inner = Scope::child(&root);
        inner.declare("y", Value::Number(2.0), true);

        assert_eq!(inner.lookup("x").and_then(|v| v.as_number()), Some(1.0));
        assert!(matches!(
            inner.assign("x", Value::Null),
            Err(ScriptError::ConstAssign(_))
        ));
        assert!(matches!(
            inner.assign("z", Value::Null),
            Err(ScriptError::Reference(_))
        ));
        inner.assign("y", Value::Number(5.0)).unwrap();
        assert_eq!(inner.lookup("y").and_then(|v| v.as_number()), Some(5.0));
    }
}
