use std::rc::Rc;

use crate::error::{ParseError, Span};
use crate::script::ast::{
    BinaryOp, DeclKind, Expr, FunctionBody, FunctionDef, LogicalOp, Program, Stmt, UnaryOp,
};
use crate::script::lexer::{Tok, Token};

const RESERVED: &[&str] = &[
    "let", "const", "var", "function", "return", "if", "else", "while", "for", "of", "break",
    "continue", "true", "false", "null", "undefined", "throw", "try", "catch", "typeof", "new",
    "class", "this", "import", "export", "do", "switch", "in",
];

/// Deepest statement/expression nesting accepted. Keeps both parsing and
/// evaluation recursion well inside the host stack.
const MAX_NESTING: usize = 100;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let mut body = Vec::new();
        while !parser.at_eof() {
            body.push(parser.statement()?);
        }
        Ok(Program { body })
    }

    // ---- token helpers ----

    fn current(&self) -> &Token {
        // the lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn nth(&self, ahead: usize) -> &Tok {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].tok
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().tok, Tok::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.current().tok, Tok::Punct(q) if *q == p)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(&self.current().tok, Tok::Word(q) if q == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.is_word(w) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{p}`")))
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<(), ParseError> {
        if self.eat_word(w) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{w}`")))
        }
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        let found = match &self.current().tok {
            Tok::Number(n) => format!("number {n}"),
            Tok::Str(s) => format!("string {s:?}"),
            Tok::Word(w) => format!("`{w}`"),
            Tok::Punct(p) => format!("`{p}`"),
            Tok::Eof => "end of input".to_string(),
        };
        ParseError {
            span: self.span(),
            message: format!("expected {wanted}, found {found}"),
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match &self.current().tok {
            Tok::Word(w) if !RESERVED.contains(&w.as_str()) => {
                let name = w.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn nest(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError {
                span: self.span(),
                message: "nesting too deep".into(),
            });
        }
        Ok(())
    }

    fn end_statement(&mut self) {
        // semicolons are optional
        self.eat_punct(";");
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let saved = self.depth;
        self.nest()?;
        let stmt = self.statement_inner();
        self.depth = saved;
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if let Some(kind) = self.decl_kind() {
            self.advance();
            let stmt = self.declaration(kind)?;
            self.end_statement();
            return Ok(stmt);
        }
        if self.is_word("function") && matches!(self.nth(1), Tok::Word(_)) {
            self.advance();
            let def = self.function_rest(true)?;
            return Ok(Stmt::Function(Rc::new(def)));
        }
        if self.eat_word("if") {
            self.expect_punct("(")?;
            let cond = self.expression()?;
            self.expect_punct(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_word("else") {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Stmt::If(cond, then, otherwise));
        }
        if self.eat_word("while") {
            self.expect_punct("(")?;
            let cond = self.expression()?;
            self.expect_punct(")")?;
            return Ok(Stmt::While(cond, Box::new(self.statement()?)));
        }
        if self.eat_word("for") {
            return self.for_statement();
        }
        if self.eat_word("return") {
            let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() {
                None
            } else {
                Some(self.expression()?)
            };
            self.end_statement();
            return Ok(Stmt::Return(value));
        }
        if self.eat_word("throw") {
            let value = self.expression()?;
            self.end_statement();
            return Ok(Stmt::Throw(value));
        }
        if self.eat_word("break") {
            self.end_statement();
            return Ok(Stmt::Break);
        }
        if self.eat_word("continue") {
            self.end_statement();
            return Ok(Stmt::Continue);
        }
        if self.eat_word("try") {
            let body = self.block()?;
            self.expect_word("catch")?;
            let param = if self.eat_punct("(") {
                let name = self.identifier()?;
                self.expect_punct(")")?;
                Some(name)
            } else {
                None
            };
            let handler = self.block()?;
            return Ok(Stmt::Try {
                body,
                param,
                handler,
            });
        }
        let expr = self.expression()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    fn decl_kind(&self) -> Option<DeclKind> {
        match &self.current().tok {
            Tok::Word(w) if w == "let" => Some(DeclKind::Let),
            Tok::Word(w) if w == "const" => Some(DeclKind::Const),
            Tok::Word(w) if w == "var" => Some(DeclKind::Var),
            _ => None,
        }
    }

    fn declaration(&mut self, kind: DeclKind) -> Result<Stmt, ParseError> {
        let mut bindings = Vec::new();
        loop {
            let name = self.identifier()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            bindings.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl(kind, bindings))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("`}`"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.expect_punct("(")?;

        if let Some(kind) = self.decl_kind()
            && matches!(self.nth(1), Tok::Word(_))
            && matches!(self.nth(2), Tok::Word(w) if w == "of")
        {
            self.advance();
            let name = self.identifier()?;
            self.expect_word("of")?;
            let iter = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForOf {
                kind,
                name,
                iter,
                body,
            });
        }

        let init = if self.is_punct(";") {
            None
        } else if let Some(kind) = self.decl_kind() {
            self.advance();
            Some(Box::new(self.declaration(kind)?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let cond = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    /// Parses the part after the `function` keyword.
    fn function_rest(&mut self, named: bool) -> Result<FunctionDef, ParseError> {
        let name = if named || matches!(self.current().tok, Tok::Word(_)) {
            Some(self.identifier()?)
        } else {
            None
        };
        let params = self.params()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(FunctionDef { name, params, body })
    }

    fn params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            params.push(self.identifier()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        self.nest()?;
        let expr = self.assignment_inner();
        self.depth = saved;
        expr
    }

    fn assignment_inner(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }

        let target = self.conditional()?;
        let op = match &self.current().tok {
            Tok::Punct("=") => None,
            Tok::Punct("+=") => Some(BinaryOp::Add),
            Tok::Punct("-=") => Some(BinaryOp::Sub),
            Tok::Punct("*=") => Some(BinaryOp::Mul),
            Tok::Punct("/=") => Some(BinaryOp::Div),
            Tok::Punct("%=") => Some(BinaryOp::Rem),
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            return Err(ParseError {
                span: self.span(),
                message: "invalid assignment target".into(),
            });
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Recognises `x => ...` and `(a, b) => ...`.
    fn try_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let single = matches!(self.current().tok, Tok::Word(_))
            && matches!(self.nth(1), Tok::Punct("=>"));
        let params = if single {
            vec![self.identifier()?]
        } else if self.is_punct("(") {
            let Some(close) = self.matching_paren() else {
                return Ok(None);
            };
            if !matches!(self.tokens.get(close + 1).map(|t| &t.tok), Some(Tok::Punct("=>"))) {
                return Ok(None);
            }
            self.params()?
        } else {
            return Ok(None);
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        }))))
    }

    fn matching_paren(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(self.pos) {
            match token.tok {
                Tok::Punct("(") => depth += 1,
                Tok::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                Tok::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut left = self.logical_and()?;
        while self.eat_punct("||") {
            self.nest()?;
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            self.nest()?;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut left = next(self)?;
        'outer: loop {
            for &(punct, op) in table {
                if self.eat_punct(punct) {
                    self.nest()?;
                    let right = next(self)?;
                    left = Expr::Binary(op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            self.depth = saved;
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        self.nest()?;
        let expr = self.unary_inner();
        self.depth = saved;
        expr
    }

    fn unary_inner(&mut self) -> Result<Expr, ParseError> {
        let op = if self.eat_punct("!") {
            UnaryOp::Not
        } else if self.eat_punct("-") {
            UnaryOp::Neg
        } else if self.eat_punct("+") {
            UnaryOp::Plus
        } else if self.eat_word("typeof") {
            UnaryOp::TypeOf
        } else if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.eat_punct("++") {
                1.0
            } else {
                self.advance();
                -1.0
            };
            let target = self.unary()?;
            return self.update(delta, true, target);
        } else {
            return self.postfix();
        };
        let operand = self.unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn update(&self, delta: f64, prefix: bool, target: Expr) -> Result<Expr, ParseError> {
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            return Err(ParseError {
                span: self.span(),
                message: "invalid increment target".into(),
            });
        }
        Ok(Expr::Update {
            delta,
            prefix,
            target: Box::new(target),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let saved = self.depth;
        let mut expr = self.primary()?;
        loop {
            if self.is_punct(".") || self.is_punct("[") || self.is_punct("(") {
                self.nest()?;
            }
            if self.eat_punct(".") {
                let name = match &self.current().tok {
                    Tok::Word(w) => w.clone(),
                    _ => return Err(self.unexpected("property name")),
                };
                self.advance();
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_punct("(") {
                let mut args = Vec::new();
                while !self.is_punct(")") {
                    args.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.is_punct("++") || self.is_punct("--") {
                let delta = if self.eat_punct("++") {
                    1.0
                } else {
                    self.advance();
                    -1.0
                };
                expr = self.update(delta, false, expr)?;
            } else {
                self.depth = saved;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        match token.tok {
            Tok::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(Rc::from(s.as_str())))
            }
            Tok::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            Tok::Punct("{") => self.object_literal(),
            Tok::Word(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined)
                }
                "function" => {
                    self.advance();
                    let def = self.function_rest(false)?;
                    Ok(Expr::Function(Rc::new(def)))
                }
                _ => Ok(Expr::Ident(self.identifier()?)),
            },
            _ => Err(self.unexpected("expression")),
        }
    }

    fn object_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect_punct("{")?;
        let mut fields = Vec::new();
        while !self.is_punct("}") {
            let key = match &self.current().tok {
                Tok::Word(w) => w.clone(),
                Tok::Str(s) => s.clone(),
                Tok::Number(n) => n.to_string(),
                _ => return Err(self.unexpected("property name")),
            };
            let shorthand = matches!(self.current().tok, Tok::Word(_));
            self.advance();
            let value = if self.eat_punct(":") {
                self.assignment()?
            } else if shorthand {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected("`:`"));
            };
            fields.push((key, value));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(fields))
    }
}
