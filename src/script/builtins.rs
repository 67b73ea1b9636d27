//! Host-provided globals (`Math`, `console`, `JSON`, ...) and array methods.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::script::interp::Interpreter;
use crate::script::value::{Env, Value};

type Items = Rc<RefCell<Vec<Value>>>;

pub(crate) fn install(globals: &Env) {
    globals.declare("Infinity", Value::Number(f64::INFINITY), false);
    globals.declare("NaN", Value::Number(f64::NAN), false);
    globals.declare("print", Value::native("print", print), false);
    globals.declare(
        "console",
        Value::object([("log", Value::native("console.log", print))]),
        false,
    );
    globals.declare("Math", math(), false);
    globals.declare(
        "JSON",
        Value::object([(
            "stringify",
            Value::native("JSON.stringify", |interp, args| {
                interp.make_string(arg(args, 0).to_json())
            }),
        )]),
        false,
    );
    globals.declare(
        "Object",
        Value::object([(
            "keys",
            Value::native("Object.keys", |_, args| match arg(args, 0) {
                Value::Object(map) => Ok(Value::array(
                    map.borrow().keys().map(|k| Value::string(k)).collect(),
                )),
                other => Err(ScriptError::Type(format!(
                    "Object.keys on {}",
                    other.type_name()
                ))),
            }),
        )]),
        false,
    );
    globals.declare(
        "Array",
        Value::object([(
            "isArray",
            Value::native("Array.isArray", |_, args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
            }),
        )]),
        false,
    );
}

fn print(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptError> {
    let line = args
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    interp.print(line);
    Ok(Value::Undefined)
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn number_arg(args: &[Value], i: usize, what: &str) -> Result<f64, ScriptError> {
    arg(args, i)
        .as_number()
        .ok_or_else(|| ScriptError::Type(format!("{what} expects a number")))
}

fn unary_math(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (
        name,
        Value::native(format!("Math.{name}"), move |_, args| {
            Ok(Value::Number(f(number_arg(args, 0, name)?)))
        }),
    )
}

fn math() -> Value {
    Value::object([
        unary_math("floor", f64::floor),
        unary_math("ceil", f64::ceil),
        unary_math("round", |n| (n + 0.5).floor()),
        unary_math("abs", f64::abs),
        unary_math("sqrt", f64::sqrt),
        unary_math("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
        ("PI", Value::Number(std::f64::consts::PI)),
        (
            "pow",
            Value::native("Math.pow", |_, args| {
                Ok(Value::Number(
                    number_arg(args, 0, "pow")?.powf(number_arg(args, 1, "pow")?),
                ))
            }),
        ),
        (
            "max",
            Value::native("Math.max", |_, args| {
                let mut best = f64::NEG_INFINITY;
                for i in 0..args.len() {
                    best = best.max(number_arg(args, i, "max")?);
                }
                Ok(Value::Number(best))
            }),
        ),
        (
            "min",
            Value::native("Math.min", |_, args| {
                let mut best = f64::INFINITY;
                for i in 0..args.len() {
                    best = best.min(number_arg(args, i, "min")?);
                }
                Ok(Value::Number(best))
            }),
        ),
        (
            "random",
            Value::native("Math.random", |interp, _| Ok(Value::Number(interp.random()))),
        ),
    ])
}

/// Returns `items.<name>` bound to the array, if it is a known method.
pub(crate) fn array_method(items: &Items, name: &str) -> Option<Value> {
    let items = Rc::clone(items);
    let label = format!("Array.{name}");
    let method = match name {
        "push" => Value::native(label, move |interp, args| {
            let len = items.borrow().len() + args.len();
            interp.check_array_len(len)?;
            items.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Number(len as f64))
        }),
        "pop" => Value::native(label, move |_, _| {
            Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        "slice" => Value::native(label, move |interp, args| {
            let snapshot = items.borrow();
            let len = snapshot.len() as f64;
            let clamp = |v: Value, default: f64| -> usize {
                let n = v.as_number().unwrap_or(default);
                let n = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
                n as usize
            };
            let start = clamp(arg(args, 0), 0.0);
            let end = clamp(arg(args, 1), len);
            if start >= end {
                return Ok(Value::array(Vec::new()));
            }
            interp.charge((end - start) as u64)?;
            Ok(Value::array(snapshot[start..end].to_vec()))
        }),
        "indexOf" => Value::native(label, move |interp, args| {
            let needle = arg(args, 0);
            for (i, item) in items.borrow().iter().enumerate() {
                interp.tick()?;
                if item.strict_eq(&needle) {
                    return Ok(Value::Number(i as f64));
                }
            }
            Ok(Value::Number(-1.0))
        }),
        "includes" => Value::native(label, move |interp, args| {
            let needle = arg(args, 0);
            for item in items.borrow().iter() {
                interp.tick()?;
                if item.strict_eq(&needle) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "join" => Value::native(label, move |interp, args| {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_string(),
            };
            let max = interp.limits().max_string_len;
            let mut joined = String::new();
            for (i, item) in items.borrow().iter().enumerate() {
                interp.tick()?;
                let piece = item.to_string();
                let sep_len = if i > 0 { sep.len() } else { 0 };
                if joined.len() + sep_len + piece.len() > max {
                    return Err(ScriptError::ResourceLimit(format!(
                        "string longer than {max} bytes"
                    )));
                }
                if i > 0 {
                    joined.push_str(&sep);
                }
                joined.push_str(&piece);
            }
            interp.make_string(joined)
        }),
        "concat" => Value::native(label, move |interp, args| {
            let total = args.iter().fold(items.borrow().len(), |n, extra| match extra {
                Value::Array(more) => n.saturating_add(more.borrow().len()),
                _ => n.saturating_add(1),
            });
            interp.check_array_len(total)?;
            interp.charge(total as u64)?;
            let mut out = Vec::with_capacity(total);
            out.extend(items.borrow().iter().cloned());
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::array(out))
        }),
        "map" => Value::native(label, move |interp, args| {
            let f = arg(args, 0);
            let snapshot = items.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(interp.call(&f, &[item, Value::Number(i as f64)])?);
            }
            Ok(Value::array(out))
        }),
        "filter" => Value::native(label, move |interp, args| {
            let f = arg(args, 0);
            let snapshot = items.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                if interp
                    .call(&f, &[item.clone(), Value::Number(i as f64)])?
                    .is_truthy()
                {
                    out.push(item);
                }
            }
            Ok(Value::array(out))
        }),
        "forEach" => Value::native(label, move |interp, args| {
            let f = arg(args, 0);
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                interp.call(&f, &[item, Value::Number(i as f64)])?;
            }
            Ok(Value::Undefined)
        }),
        "find" => Value::native(label, move |interp, args| {
            let f = arg(args, 0);
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                if interp
                    .call(&f, &[item.clone(), Value::Number(i as f64)])?
                    .is_truthy()
                {
                    return Ok(item);
                }
            }
            Ok(Value::Undefined)
        }),
        "some" | "every" => {
            let want_all = name == "every";
            Value::native(label, move |interp, args| {
                let f = arg(args, 0);
                let snapshot = items.borrow().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let hit = interp
                        .call(&f, &[item, Value::Number(i as f64)])?
                        .is_truthy();
                    if hit != want_all {
                        return Ok(Value::Bool(!want_all));
                    }
                }
                Ok(Value::Bool(want_all))
            })
        }
        "reduce" => Value::native(label, move |interp, args| {
            let f = arg(args, 0);
            let snapshot = items.borrow().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(ScriptError::Type(
                            "reduce of empty array with no initial value".into(),
                        ));
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, &[acc, item, Value::Number(i as f64)])?;
            }
            Ok(acc)
        }),
        "sort" => Value::native(label, move |interp, args| {
            let cmp = arg(args, 0);
            let snapshot = items.borrow().clone();
            let sorted = merge_sort(interp, snapshot, &cmp)?;
            *items.borrow_mut() = sorted;
            Ok(Value::Array(Rc::clone(&items)))
        }),
        _ => return None,
    };
    Some(method)
}

/// Stable bottom-up merge sort. Every comparison is a step, and a
/// comparator error aborts the sort with the array left untouched.
fn merge_sort(
    interp: &mut Interpreter,
    items: Vec<Value>,
    cmp: &Value,
) -> Result<Vec<Value>, ScriptError> {
    let len = items.len();
    let mut src = items;
    let mut width = 1;
    while width < len {
        let mut dst = Vec::with_capacity(len);
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if compare(interp, cmp, &src[i], &src[j])? <= 0.0 {
                    dst.push(src[i].clone());
                    i += 1;
                } else {
                    dst.push(src[j].clone());
                    j += 1;
                }
            }
            dst.extend_from_slice(&src[i..mid]);
            dst.extend_from_slice(&src[j..end]);
            start = end;
        }
        src = dst;
        width *= 2;
    }
    Ok(src)
}

fn compare(
    interp: &mut Interpreter,
    cmp: &Value,
    a: &Value,
    b: &Value,
) -> Result<f64, ScriptError> {
    if cmp.is_callable() {
        let order = interp.call(cmp, &[a.clone(), b.clone()])?;
        return Ok(order.as_number().unwrap_or(0.0));
    }
    interp.tick()?;
    Ok(default_order(a, b))
}

fn default_order(a: &Value, b: &Value) -> f64 {
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => return x - y,
            _ => a.to_string().cmp(&b.to_string()),
        },
    };
    match ordering {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use web_time::Instant;

    use crate::error::ScriptError;
    use crate::script::interp::{Interpreter, Limits};
    use crate::script::lexer::Lexer;
    use crate::script::parser::Parser;

    fn eval_global(src: &str, name: &str) -> String {
        let mut interp = Interpreter::new(Limits::default(), 3);
        exec(&mut interp, src).unwrap();
        interp.global(name).unwrap().to_string()
    }

    fn exec(interp: &mut Interpreter, src: &str) -> Result<(), ScriptError> {
        let program = Parser::parse(Lexer::tokenize(src).unwrap()).unwrap();
        interp.run(&program)
    }

    /// Interpreter holding `var a = [n, n-1, ..., 1]`.
    fn with_descending(n: usize) -> Interpreter {
        let mut interp = Interpreter::new(Limits::default(), 3);
        exec(
            &mut interp,
            &format!("var a = []; for (let i = {n}; i > 0; i--) a.push(i);"),
        )
        .unwrap();
        interp
    }

    #[test]
    fn math_helpers_behave() {
        assert_eq!(
            eval_global("var r = [Math.floor(2.7), Math.max(1, 5, 3), Math.abs(-4), Math.round(2.5)]", "r"),
            "[2,5,4,3]"
        );
    }

    #[test]
    fn sort_accepts_comparator_and_sorts_in_place() {
        assert_eq!(
            eval_global("var a = [3, 1, 2]; a.sort((x, y) => y - x);", "a"),
            "[3,2,1]"
        );
        assert_eq!(eval_global("var a = [3, 1, 2].sort()", "a"), "[1,2,3]");
    }

    #[test]
    fn slice_handles_negative_bounds() {
        assert_eq!(
            eval_global("var s = [1, 2, 3, 4].slice(-2)", "s"),
            "[3,4]"
        );
        assert_eq!(eval_global("var s = [1, 2, 3].slice(2, 1)", "s"), "[]");
    }

    #[test]
    fn reduce_some_every_find() {
        assert_eq!(
            eval_global(
                "var xs = [1, 2, 3];
                 var r = [xs.reduce((a, b) => a + b, 0), xs.some(x => x > 2), xs.every(x => x > 2), xs.find(x => x > 1), xs.indexOf(3)]",
                "r"
            ),
            "[6,true,false,2,2]"
        );
    }

    #[test]
    fn object_keys_and_json() {
        assert_eq!(
            eval_global("var k = JSON.stringify(Object.keys({b: 1, a: 2}))", "k"),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn default_sort_is_stable_and_orders_strings_by_code_unit() {
        assert_eq!(
            eval_global(
                "var r = [{k: 1, t: 'a'}, {k: 0, t: 'b'}, {k: 1, t: 'c'}, {k: 0, t: 'd'}]
                    .sort((x, y) => x.k - y.k).map(x => x.t).join('')",
                "r"
            ),
            "bdac"
        );
        assert_eq!(
            eval_global("var r = ['b', 'B', 'a'].sort().join()", "r"),
            "B,a,b"
        );
    }

    #[test]
    fn large_sort_finishes_without_a_deadline() {
        let mut interp = with_descending(30_000);

        exec(&mut interp, "a.sort(); var first = a[0]; var last = a[29999];").unwrap();

        assert_eq!(interp.global("first").unwrap().to_string(), "1");
        assert_eq!(interp.global("last").unwrap().to_string(), "30000");
    }

    #[test]
    fn sorting_counts_against_the_deadline() {
        let mut interp = with_descending(30_000);
        interp.set_deadline(Some(Instant::now()));

        let started = Instant::now();
        let err = exec(&mut interp, "a.sort()").unwrap_err();

        assert_eq!(err, ScriptError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn searching_and_joining_count_against_the_deadline() {
        for src in ["a.indexOf(-1)", "a.includes(-1)", "a.join('-')", "a.concat(a)", "a.map(x => x)"] {
            let mut interp = with_descending(20_000);
            interp.set_deadline(Some(Instant::now()));

            assert_eq!(exec(&mut interp, src), Err(ScriptError::Timeout), "{src}");
        }
    }

    #[test]
    fn join_stops_at_the_string_limit() {
        let limits = Limits {
            max_string_len: 1_000,
            ..Limits::default()
        };
        let mut interp = Interpreter::new(limits, 3);
        exec(&mut interp, "var a = []; for (let i = 0; i < 200; i++) a.push('abcdefgh');").unwrap();

        let err = exec(&mut interp, "var s = a.join('')").unwrap_err();

        assert!(matches!(err, ScriptError::ResourceLimit(_)));
        exec(&mut interp, "var ok = a.slice(0, 100).join('')").unwrap();
        assert_eq!(interp.global("ok").unwrap().to_string().len(), 800);
    }

    #[test]
    fn concat_respects_the_array_limit() {
        let limits = Limits {
            max_array_len: 100,
            ..Limits::default()
        };
        let mut interp = Interpreter::new(limits, 3);
        exec(&mut interp, "var a = []; for (let i = 0; i < 60; i++) a.push(i);").unwrap();

        let err = exec(&mut interp, "var b = a.concat(a)").unwrap_err();

        assert!(matches!(err, ScriptError::ResourceLimit(_)));
    }
}
