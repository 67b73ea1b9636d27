use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use web_time::Instant;

use crate::error::ScriptError;
use crate::script::ast::{
    BinaryOp, DeclKind, Expr, FunctionBody, LogicalOp, Program, Stmt, UnaryOp,
};
use crate::script::builtins;
use crate::script::value::{Closure, Env, Scope, Value};

/// The deadline is consulted once every this many steps.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Deepest combined statement/expression recursion across all active
/// calls. Bounds native stack use independently of `max_call_depth`.
const MAX_EVAL_DEPTH: usize = 200;

/// Hard caps a script cannot raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub max_call_depth: usize,
    pub max_array_len: usize,
    pub max_string_len: usize,
    pub max_output_lines: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_array_len: 100_000,
            max_string_len: 1 << 20,
            max_output_lines: 200,
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Tree-walking evaluator with host-enforced step, depth and size limits.
///
/// The interpreter owns the global scope, so closures created by one run
/// keep their state across later calls on the same instance.
pub struct Interpreter {
    globals: Env,
    limits: Limits,
    deadline: Option<Instant>,
    steps: u64,
    depth: usize,
    nesting: usize,
    output: Vec<String>,
    suppressed: usize,
    rng: Pcg64Mcg,
}

impl Interpreter {
    pub fn new(limits: Limits, seed: u64) -> Self {
        let interp = Self {
            globals: Scope::root(),
            limits,
            deadline: None,
            steps: 0,
            depth: 0,
            nesting: 0,
            output: Vec::new(),
            suppressed: 0,
            rng: Pcg64Mcg::seed_from_u64(seed),
        };
        builtins::install(&interp.globals);
        interp
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lookup(name)
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
        self.steps = 0;
    }

    /// Runs top-level statements in the global scope.
    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        let globals = Rc::clone(&self.globals);
        self.exec_block(&program.body, &globals).map(|_| ())
    }

    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, ScriptError> {
        self.tick()?;
        match callee {
            Value::Native(native) => {
                let native = Rc::clone(native);
                (native.func)(self, args)
            }
            Value::Function(closure) => {
                if self.depth >= self.limits.max_call_depth {
                    return Err(ScriptError::StackOverflow);
                }
                let closure = Rc::clone(closure);
                self.depth += 1;
                let result = self.call_closure(&closure, args);
                self.depth -= 1;
                result
            }
            other => Err(ScriptError::NotCallable(other.to_string())),
        }
    }

    /// Records one line of script output. Lines beyond the limit are
    /// counted, not kept.
    pub fn print(&mut self, line: String) {
        if self.output.len() < self.limits.max_output_lines {
            self.output.push(line);
        } else {
            self.suppressed += 1;
        }
    }

    pub fn take_output(&mut self) -> Vec<String> {
        let mut lines = std::mem::take(&mut self.output);
        if self.suppressed > 0 {
            lines.push(format!("... {} more line(s) suppressed", self.suppressed));
            self.suppressed = 0;
        }
        lines
    }

    pub fn random(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    pub fn check_array_len(&self, len: usize) -> Result<(), ScriptError> {
        if len > self.limits.max_array_len {
            return Err(ScriptError::ResourceLimit(format!(
                "array longer than {}",
                self.limits.max_array_len
            )));
        }
        Ok(())
    }

    pub fn make_string(&self, s: String) -> Result<Value, ScriptError> {
        if s.len() > self.limits.max_string_len {
            return Err(ScriptError::ResourceLimit(format!(
                "string longer than {} bytes",
                self.limits.max_string_len
            )));
        }
        Ok(Value::Str(Rc::from(s)))
    }

    pub(crate) fn tick(&mut self) -> Result<(), ScriptError> {
        self.charge(1)
    }

    /// Counts `cost` steps of work, including host-side work done inside
    /// builtins, against the deadline.
    pub(crate) fn charge(&mut self, cost: u64) -> Result<(), ScriptError> {
        let before = self.steps / DEADLINE_CHECK_INTERVAL;
        self.steps = self.steps.saturating_add(cost);
        if self.steps / DEADLINE_CHECK_INTERVAL != before
            && let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ScriptError::Timeout);
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(ScriptError::StackOverflow);
        }
        self.nesting += 1;
        Ok(())
    }

    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> Result<Value, ScriptError> {
        let scope = Scope::child(&closure.env);
        for (i, param) in closure.def.params.iter().enumerate() {
            scope.declare(param, args.get(i).cloned().unwrap_or(Value::Undefined), true);
        }
        match &closure.def.body {
            FunctionBody::Block(body) => match self.exec_block(body, &scope)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
        for stmt in body {
            if let Stmt::Function(def) = stmt
                && let Some(name) = &def.name
            {
                let closure = Closure {
                    def: Rc::clone(def),
                    env: Rc::clone(env),
                };
                env.declare(name, Value::Function(Rc::new(closure)), true);
            }
        }
        for stmt in body {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        self.enter()?;
        let flow = self.exec_inner(stmt, env);
        self.nesting -= 1;
        flow
    }

    fn exec_inner(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Decl(kind, bindings) => {
                for (name, init) in bindings {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::Undefined,
                    };
                    env.declare(name, value, *kind != DeclKind::Const);
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::If(cond, then, otherwise) => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(cond, body) => {
                while self.eval(cond, env)?.is_truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.exec(init, &scope)?;
                }
                loop {
                    if let Some(cond) = cond
                        && !self.eval(cond, &scope)?.is_truthy()
                    {
                        break;
                    }
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                name,
                iter,
                body,
            } => {
                let items = match self.eval(iter, env)? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::string(&c.to_string())).collect(),
                    other => {
                        return Err(ScriptError::Type(format!(
                            "{} is not iterable",
                            other.type_name()
                        )));
                    }
                };
                for item in items {
                    let scope = Scope::child(env);
                    scope.declare(name, item, *kind != DeclKind::Const);
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_block(body, &Scope::child(env)),
            Stmt::Try {
                body,
                param,
                handler,
            } => match self.exec_block(body, &Scope::child(env)) {
                Ok(flow) => Ok(flow),
                Err(err) if is_catchable(&err) => {
                    let scope = Scope::child(env);
                    if let Some(param) = param {
                        let message = match err {
                            ScriptError::Thrown(message) => message,
                            other => other.to_string(),
                        };
                        scope.declare(param, Value::string(&message), true);
                    }
                    self.exec_block(handler, &scope)
                }
                Err(err) => Err(err),
            },
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                Err(ScriptError::Thrown(value.to_string()))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        self.enter()?;
        let value = self.eval_inner(expr, env);
        self.nesting -= 1;
        value
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Rc::clone(s))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => env
                .lookup(name)
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            Expr::Array(items) => {
                self.check_array_len(items.len())?;
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(values))
            }
            Expr::Object(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    values.push((key.clone(), self.eval(value, env)?));
                }
                Ok(Value::object(values))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: Rc::clone(def),
                env: Rc::clone(env),
            }))),
            Expr::Unary(UnaryOp::TypeOf, operand) => {
                let value = match operand.as_ref() {
                    Expr::Ident(name) => env.lookup(name).unwrap_or(Value::Undefined),
                    other => self.eval(other, env)?,
                };
                Ok(Value::string(value.type_name()))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg | UnaryOp::Plus => {
                        let n = value.as_number().ok_or_else(|| {
                            ScriptError::Type(format!(
                                "unary operator on {}",
                                value.type_name()
                            ))
                        })?;
                        Ok(Value::Number(if *op == UnaryOp::Neg { -n } else { n }))
                    }
                    UnaryOp::TypeOf => Ok(Value::string(value.type_name())),
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional(cond, then, otherwise) => {
                if self.eval(cond, env)?.is_truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let rhs = self.eval(value, env)?;
                let value = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self.eval(target, env)?;
                        self.binary(*op, &current, &rhs)?
                    }
                };
                self.store(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::Update {
                delta,
                prefix,
                target,
            } => {
                let old = self.eval(target, env)?.as_number().ok_or_else(|| {
                    ScriptError::Type("increment of a non-number".into())
                })?;
                let new = old + delta;
                self.store(target, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, env)?;
                self.member(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.index(&object, &index)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, env)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&callee, &args)
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
        match op {
            BinaryOp::Eq => return Ok(Value::Bool(left.loose_eq(right))),
            BinaryOp::Ne => return Ok(Value::Bool(!left.loose_eq(right))),
            BinaryOp::StrictEq => return Ok(Value::Bool(left.strict_eq(right))),
            BinaryOp::StrictNe => return Ok(Value::Bool(!left.strict_eq(right))),
            _ => {}
        }
        if op == BinaryOp::Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)))
        {
            return self.make_string(format!("{left}{right}"));
        }
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            let ordering = a.cmp(b);
            return match op {
                BinaryOp::Lt => Ok(Value::Bool(ordering.is_lt())),
                BinaryOp::Le => Ok(Value::Bool(ordering.is_le())),
                BinaryOp::Gt => Ok(Value::Bool(ordering.is_gt())),
                BinaryOp::Ge => Ok(Value::Bool(ordering.is_ge())),
                _ => Err(ScriptError::Type("arithmetic on strings".into())),
            };
        }
        let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
            return Err(ScriptError::Type(format!(
                "cannot apply {op:?} to {} and {}",
                left.type_name(),
                right.type_name()
            )));
        };
        Ok(match op {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => Value::Number(a / b),
            BinaryOp::Rem => Value::Number(a % b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Ge => Value::Bool(a >= b),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::StrictEq | BinaryOp::StrictNe => {
                unreachable!("equality handled above")
            }
        })
    }

    fn member(&self, object: &Value, name: &str) -> Result<Value, ScriptError> {
        match object {
            Value::Array(items) => {
                if name == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                Ok(builtins::array_method(items, name).unwrap_or(Value::Undefined))
            }
            Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Object(_) => Ok(object.field(name)),
            Value::Null | Value::Undefined => Err(ScriptError::Type(format!(
                "cannot read property `{name}` of {object}"
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    fn index(&self, object: &Value, index: &Value) -> Result<Value, ScriptError> {
        match (object, index) {
            (Value::Array(items), Value::Number(_)) => Ok(index
                .as_index()
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined)),
            (Value::Str(s), Value::Number(_)) => Ok(index
                .as_index()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(&c.to_string()))
                .unwrap_or(Value::Undefined)),
            (Value::Null | Value::Undefined, _) => Err(ScriptError::Type(format!(
                "cannot read index {index} of {object}"
            ))),
            (_, Value::Str(key)) => self.member(object, key),
            (Value::Object(_), key) => Ok(object.field(&key.to_string())),
            _ => Ok(Value::Undefined),
        }
    }

    fn store(&mut self, target: &Expr, value: Value, env: &Env) -> Result<(), ScriptError> {
        match target {
            Expr::Ident(name) => env.assign(name, value),
            Expr::Member(object, name) => {
                let object = self.eval(object, env)?;
                self.store_field(&object, name.clone(), value)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                match (&object, index.as_index()) {
                    (Value::Array(items), Some(i)) => {
                        let mut items = items.borrow_mut();
                        if i >= items.len() {
                            self.check_array_len(i + 1)?;
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value;
                        Ok(())
                    }
                    (Value::Array(_), None) => {
                        Err(ScriptError::Type(format!("invalid array index {index}")))
                    }
                    _ => self.store_field(&object, index.to_string(), value),
                }
            }
            _ => Err(ScriptError::Type("invalid assignment target".into())),
        }
    }

    fn store_field(&self, object: &Value, key: String, value: Value) -> Result<(), ScriptError> {
        match object {
            Value::Object(map) => {
                map.borrow_mut().insert(key, value);
                Ok(())
            }
            other => Err(ScriptError::Type(format!(
                "cannot set property `{key}` on {}",
                other.type_name()
            ))),
        }
    }
}

/// Host-enforced limits cannot be swallowed by `try`/`catch`.
fn is_catchable(err: &ScriptError) -> bool {
    !matches!(
        err,
        ScriptError::Timeout | ScriptError::StackOverflow | ScriptError::ResourceLimit(_)
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::script::lexer::Lexer;
    use crate::script::parser::Parser;

    fn run(src: &str) -> Interpreter {
        let mut interp = Interpreter::new(Limits::default(), 7);
        let program = Parser::parse(Lexer::tokenize(src).unwrap()).unwrap();
        interp.run(&program).unwrap();
        interp
    }

    fn try_run(src: &str) -> Result<Interpreter, ScriptError> {
        let mut interp = Interpreter::new(Limits::default(), 7);
        let program = Parser::parse(Lexer::tokenize(src).unwrap()).unwrap();
        interp.run(&program)?;
        Ok(interp)
    }

    fn num(interp: &Interpreter, name: &str) -> f64 {
        interp.global(name).and_then(|v| v.as_number()).unwrap()
    }

    #[test]
    fn evaluates_arithmetic_and_control_flow() {
        let interp = run("
            var total = 0;
            for (let i = 0; i < 10; i++) {
                if (i % 2 === 0) continue;
                if (i > 7) break;
                total += i;
            }
            var w = 0;
            while (w < 5) { w = w + 2 }
        ");

        assert_eq!(num(&interp, "total"), 1.0 + 3.0 + 5.0 + 7.0);
        assert_eq!(num(&interp, "w"), 6.0);
    }

    #[test]
    fn closures_keep_state_between_calls() {
        let mut interp = run("
            function counter() {
                let n = 0;
                return () => { n += 1; return n; };
            }
            var next = counter();
        ");
        let next = interp.global("next").unwrap();

        interp.call(&next, &[]).unwrap();
        let second = interp.call(&next, &[]).unwrap();

        assert_eq!(second.as_number(), Some(2.0));
    }

    #[test]
    fn functions_are_hoisted() {
        let interp = run("var r = twice(4); function twice(x) { return x * 2 }");

        assert_eq!(num(&interp, "r"), 8.0);
    }

    #[test]
    fn arrays_and_objects_support_member_access_and_mutation() {
        let interp = run("
            var moves = [{row: 1, col: 2}, {row: 3, col: 4}];
            moves.push({row: 5, col: 6});
            moves[0].row = 9;
            var o = {};
            o['k'] = moves.length;
            var picked = moves.filter(m => m.row > 2).map(m => m.col);
            var total = 0;
            for (const c of picked) total += c;
        ");

        assert_eq!(num(&interp, "total"), 2.0 + 4.0 + 6.0);
        assert_eq!(
            interp.global("o").unwrap().field("k").as_number(),
            Some(3.0)
        );
    }

    #[test]
    fn const_bindings_reject_reassignment() {
        let err = try_run("const x = 1; x = 2;").err().unwrap();

        assert!(matches!(err, ScriptError::ConstAssign(_)));
    }

    #[test]
    fn try_catch_recovers_from_thrown_values() {
        let interp = run("
            var msg = '';
            try { throw 'boom'; } catch (e) { msg = e; }
            try { undefinedThing(); } catch (e) { msg = msg + '|ref'; }
        ");

        assert_eq!(interp.global("msg").unwrap().to_string(), "boom|ref");
    }

    #[test]
    fn infinite_loop_is_reclaimed_at_deadline() {
        let mut interp = Interpreter::new(Limits::default(), 1);
        let program = Parser::parse(Lexer::tokenize("while (true) {}").unwrap()).unwrap();
        interp.set_deadline(Some(Instant::now() + Duration::from_millis(20)));

        let started = Instant::now();
        let err = interp.run(&program).unwrap_err();

        assert_eq!(err, ScriptError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn timeout_cannot_be_caught() {
        let mut interp = Interpreter::new(Limits::default(), 1);
        let program = Parser::parse(
            Lexer::tokenize("try { while (true) {} } catch (e) { var caught = 1 }").unwrap(),
        )
        .unwrap();
        interp.set_deadline(Some(Instant::now() + Duration::from_millis(10)));

        assert_eq!(interp.run(&program).unwrap_err(), ScriptError::Timeout);
    }

    #[test]
    fn runaway_recursion_hits_depth_limit() {
        let err = try_run("function f(n) { return f(n + 1) } f(0)").err().unwrap();

        assert_eq!(err, ScriptError::StackOverflow);
    }

    #[test]
    fn deep_expressions_inside_recursion_overflow_cleanly() {
        let src = "
            function f(n) {
                if (n <= 0) return 0;
                return (1 + (1 + (1 + (1 + (1 + (1 + (1 + (1 + (1 + (1 + f(n - 1)))))))))));
            }
            var r = f(62);";
        let mut interp = Interpreter::new(Limits::default(), 7);
        let program = Parser::parse(Lexer::tokenize(src).unwrap()).unwrap();

        assert_eq!(interp.run(&program).unwrap_err(), ScriptError::StackOverflow);

        let again = Parser::parse(Lexer::tokenize("var ok = f(5)").unwrap()).unwrap();
        interp.run(&again).unwrap();
        assert_eq!(num(&interp, "ok"), 50.0);
    }

    #[test]
    fn moderate_recursion_still_runs() {
        let interp = run("function f(n) { if (n <= 0) return 0; return 1 + f(n - 1) } var r = f(40);");

        assert_eq!(num(&interp, "r"), 40.0);
    }

    #[test]
    fn huge_arrays_hit_resource_limit() {
        let err = try_run("var a = []; a[200000] = 1;").err().unwrap();

        assert!(matches!(err, ScriptError::ResourceLimit(_)));
    }

    #[test]
    fn console_output_is_captured_not_printed() {
        let mut interp = run("console.log('hello', 1 + 1); print([1, 2]);");

        assert_eq!(interp.take_output(), vec!["hello 2", "[1,2]"]);
        assert!(interp.take_output().is_empty());
    }

    #[test]
    fn output_beyond_limit_is_summarised() {
        let limits = Limits {
            max_output_lines: 2,
            ..Limits::default()
        };
        let mut interp = Interpreter::new(limits, 1);
        let program =
            Parser::parse(Lexer::tokenize("for (let i = 0; i < 5; i++) print(i)").unwrap())
                .unwrap();
        interp.run(&program).unwrap();

        assert_eq!(
            interp.take_output(),
            vec!["0", "1", "... 3 more line(s) suppressed"]
        );
    }

    #[test]
    fn type_errors_are_reported() {
        assert!(matches!(
            try_run("var x = null; x.y").err().unwrap(),
            ScriptError::Type(_)
        ));
        assert!(matches!(
            try_run("var f = 3; f()").err().unwrap(),
            ScriptError::NotCallable(_)
        ));
        assert!(matches!(
            try_run("var q = {} - 1").err().unwrap(),
            ScriptError::Type(_)
        ));
    }

    #[test]
    fn math_random_is_deterministic_per_seed() {
        let a = num(&run("var r = Math.random()"), "r");
        let b = num(&run("var r = Math.random()"), "r");

        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }
}
