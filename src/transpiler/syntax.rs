//! Typed syntax tree for the authoring language and a recursive-descent parser.
//!
//! The grammar is the JavaScript subset people actually write in shader
//! functions. Statement terminators are optional; a newline, `}` or end of
//! input closes a statement, and a missing `}` at end of input closes the block.

use anyhow::{Result, bail};

use super::lexer::{LexKind, Lexeme, lex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Var,
    Const,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    /// Source text of the whole parameter, default included.
    pub raw: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Decl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    Expr(Expr),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Break,
    Continue,
    Function(FunctionDecl),
    /// `trailing` comments sit on the same line as the previous statement.
    Comment {
        text: String,
        trailing: bool,
    },
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Raw literal text, typed suffix included.
    Number(String),
    /// Raw literal text, quotes included.
    Str(String),
    Bool(bool),
    Ident(String),
    Array(Vec<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    Update {
        op: String,
        prefix: bool,
        operand: Box<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Paren(Box<Expr>),
    Function(Box<FunctionDecl>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Name of a plain `name(...)` call.
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Expr::Call { callee, .. } => callee.as_ident(),
            _ => None,
        }
    }

    /// Peel parentheses.
    pub fn unparen(&self) -> &Expr {
        match self {
            Expr::Paren(inner) => inner.unparen(),
            other => other,
        }
    }

    pub fn is_numeric_literal(&self) -> bool {
        match self.unparen() {
            Expr::Number(_) => true,
            Expr::Unary { op, operand } if op == "-" || op == "+" => operand.is_numeric_literal(),
            _ => false,
        }
    }

    /// Numeric value of a literal, sign included.
    pub fn number_value(&self) -> Option<f64> {
        match self.unparen() {
            Expr::Number(text) => parse_number_literal(text),
            Expr::Unary { op, operand } if op == "-" => operand.number_value().map(|v| -v),
            Expr::Unary { op, operand } if op == "+" => operand.number_value(),
            _ => None,
        }
    }
}

/// Parse a numeric literal's value, ignoring typed suffixes and separators.
pub fn parse_number_literal(text: &str) -> Option<f64> {
    let t: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        let hex = hex.trim_end_matches(['u', 'i', 'n']);
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    let t = t.trim_end_matches(['u', 'i', 'f', 'h', 'n']);
    t.parse::<f64>().ok()
}

pub fn is_float_literal(text: &str) -> bool {
    if text.starts_with("0x") || text.starts_with("0X") {
        return false;
    }
    text.contains('.')
        || text.contains(['e', 'E'])
        || text.ends_with('f')
        || text.ends_with('h')
}

const ASSIGN_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=",
    "||=", "??=",
];

fn binary_prec(op: &str) -> Option<u8> {
    Some(match op {
        "??" | "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" | "===" | "!==" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" | ">>>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        "**" => 11,
        _ => return None,
    })
}

struct Parser<'a> {
    src: &'a str,
    lx: Vec<Lexeme>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            lx: lex(src),
            pos: 0,
        }
    }

    fn from_lexemes(src: &'a str, lx: Vec<Lexeme>) -> Self {
        Self { src, lx, pos: 0 }
    }

    fn peek_index(&self, mut n: usize) -> Option<usize> {
        let mut i = self.pos;
        while i < self.lx.len() {
            if !self.lx[i].is_comment() {
                if n == 0 {
                    return Some(i);
                }
                n -= 1;
            }
            i += 1;
        }
        None
    }

    fn peek(&self) -> Option<&Lexeme> {
        self.peek_index(0).map(|i| &self.lx[i])
    }

    fn peek_nth(&self, n: usize) -> Option<&Lexeme> {
        self.peek_index(n).map(|i| &self.lx[i])
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let i = self.peek_index(0)?;
        self.pos = i + 1;
        Some(self.lx[i].clone())
    }

    fn at_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|l| l.is_punct(p))
    }

    fn at_ident(&self, word: &str) -> bool {
        self.peek().is_some_and(|l| l.is_ident(word))
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.lx.last())
            .map_or(1, |l| l.line)
    }

    fn fail<T>(&self, what: &str) -> Result<T> {
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_string(), |l| format!("`{}`", l.text));
        bail!("line {}: expected {what}, found {found}", self.line())
    }

    fn expect_punct(&mut self, p: &str) -> Result<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            self.fail(&format!("`{p}`"))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(l) if l.kind == LexKind::Ident => {
                let text = l.text.clone();
                self.bump();
                Ok(text)
            }
            _ => self.fail("identifier"),
        }
    }

    fn end_statement(&mut self) {
        self.eat_punct(";");
    }

    // ---- statements ----

    /// Statements up to a closing `}` (consumed) or end of input.
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while let Some(l) = self.lx.get(self.pos) {
                if !l.is_comment() {
                    break;
                }
                stmts.push(Stmt::Comment {
                    text: l.text.clone(),
                    trailing: !l.newline_before && !stmts.is_empty(),
                });
                self.pos += 1;
            }
            match self.peek() {
                None => break,
                Some(l) if l.is_punct("}") => {
                    self.bump();
                    break;
                }
                _ => stmts.push(self.parse_statement()?),
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let Some(tok) = self.peek().cloned() else {
            return self.fail("statement");
        };
        if tok.kind == LexKind::Punct {
            match tok.text.as_str() {
                "{" => {
                    self.bump();
                    return Ok(Stmt::Block(self.parse_block_body()?));
                }
                ";" => {
                    self.bump();
                    return Ok(Stmt::Empty);
                }
                _ => {}
            }
        }
        if tok.kind == LexKind::Ident {
            match tok.text.as_str() {
                "let" | "var" | "const" => {
                    let stmt = self.parse_decl()?;
                    self.end_statement();
                    return Ok(stmt);
                }
                "async" if self.peek_nth(1).is_some_and(|l| l.is_ident("function")) => {
                    self.bump();
                    return self.parse_statement();
                }
                "function" => {
                    self.bump();
                    let f = self.parse_function_rest(tok.line)?;
                    return Ok(Stmt::Function(f));
                }
                "if" => return self.parse_if(),
                "for" => return self.parse_for(),
                "while" => {
                    self.bump();
                    self.expect_punct("(")?;
                    let test = self.parse_expr()?;
                    self.expect_punct(")")?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::While { test, body });
                }
                "do" => {
                    self.bump();
                    let body = Box::new(self.parse_statement()?);
                    if !self.at_ident("while") {
                        return self.fail("`while`");
                    }
                    self.bump();
                    self.expect_punct("(")?;
                    let test = self.parse_expr()?;
                    self.expect_punct(")")?;
                    self.end_statement();
                    return Ok(Stmt::DoWhile { body, test });
                }
                "return" => {
                    self.bump();
                    let value = match self.peek() {
                        Some(l) if !l.newline_before && !l.is_punct(";") && !l.is_punct("}") => {
                            Some(self.parse_expr()?)
                        }
                        _ => None,
                    };
                    self.end_statement();
                    return Ok(Stmt::Return(value));
                }
                "break" => {
                    self.bump();
                    self.end_statement();
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.bump();
                    self.end_statement();
                    return Ok(Stmt::Continue);
                }
                _ => {}
            }
        }
        let expr = self.parse_expr()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    fn parse_decl(&mut self) -> Result<Stmt> {
        let kind = match self.bump().map(|l| l.text) {
            Some(k) if k == "let" => DeclKind::Let,
            Some(k) if k == "var" => DeclKind::Var,
            _ => DeclKind::Const,
        };
        let mut declarators = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assign()?)
            } else {
                None
            };
            declarators.push(Declarator { name, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        // `const f = (a) => { ... }` declares a helper function.
        if let [Declarator {
            name,
            init: Some(Expr::Function(f)),
        }] = declarators.as_slice()
        {
            let mut f = (**f).clone();
            f.name = Some(name.clone());
            return Ok(Stmt::Function(f));
        }
        Ok(Stmt::Decl { kind, declarators })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.bump();
        self.expect_punct("(")?;
        let test = self.parse_expr()?;
        self.expect_punct(")")?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.at_ident("else") {
            self.bump();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.bump();
        self.expect_punct("(")?;
        let init = if self.at_punct(";") {
            None
        } else if self.at_ident("let") || self.at_ident("var") || self.at_ident("const") {
            Some(Box::new(self.parse_decl()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expr()?)))
        };
        if self.at_ident("of") || self.at_ident("in") {
            bail!("line {}: for-of and for-in loops are not supported", self.line());
        }
        self.expect_punct(";")?;
        let test = if self.at_punct(";") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    // ---- functions ----

    /// After `function`: optional name, parameters and body.
    fn parse_function_rest(&mut self, line: u32) -> Result<FunctionDecl> {
        let name = match self.peek() {
            Some(l) if l.kind == LexKind::Ident => {
                let n = l.text.clone();
                self.bump();
                Some(n)
            }
            _ => None,
        };
        let params = self.parse_params()?;
        if !self.eat_punct("{") {
            return self.fail("`{`");
        }
        let body = self.parse_block_body()?;
        Ok(FunctionDecl {
            name,
            params,
            body,
            line,
        })
    }

    /// Body of an arrow function, after `=>`.
    fn parse_arrow_body(&mut self, params: Vec<Param>, line: u32) -> Result<FunctionDecl> {
        let body = if self.eat_punct("{") {
            self.parse_block_body()?
        } else {
            vec![Stmt::Return(Some(self.parse_assign()?))]
        };
        Ok(FunctionDecl {
            name: None,
            params,
            body,
            line,
        })
    }

    /// Raw index of the lexeme closing the bracket at `open`, if balanced.
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for (i, l) in self.lx.iter().enumerate().skip(open) {
            if l.kind != LexKind::Punct {
                continue;
            }
            match l.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// `( a, b = 1, c = vec3(1, 2, 3) )`; unbalanced input runs to end of input.
    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let Some(open) = self.peek_index(0).filter(|i| self.lx[*i].is_punct("(")) else {
            return self.fail("`(`");
        };
        let close = self.matching_close(open);
        let end = close.unwrap_or(self.lx.len());
        let inner: Vec<Lexeme> = self.lx[open + 1..end]
            .iter()
            .filter(|l| !l.is_comment())
            .cloned()
            .collect();
        self.pos = close.map_or(self.lx.len(), |c| c + 1);

        let mut params = Vec::new();
        for slice in split_lexemes(&inner) {
            if let Some(param) = self.param_from(slice) {
                params.push(param);
            }
        }
        Ok(params)
    }

    fn param_from(&self, slice: &[Lexeme]) -> Option<Param> {
        let first = slice.first()?;
        let last = slice.last()?;
        let raw = self
            .src
            .get(first.span.start..last.span.end)
            .unwrap_or_default()
            .to_string();
        let name_lex = slice.iter().find(|l| l.kind == LexKind::Ident)?;
        let default = match slice {
            [name, eq, rest @ ..] if name.kind == LexKind::Ident && eq.is_punct("=") => {
                let mut sub = Parser::from_lexemes(self.src, rest.to_vec());
                sub.parse_assign().ok()
            }
            _ => None,
        };
        Some(Param {
            name: name_lex.text.clone(),
            default,
            raw,
        })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let target = self.parse_conditional()?;
        if let Some(op) = self
            .peek()
            .filter(|l| l.kind == LexKind::Punct && ASSIGN_OPS.contains(&l.text.as_str()))
            .map(|l| l.text.clone())
        {
            self.bump();
            let value = self.parse_assign()?;
            return Ok(Expr::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        Ok(target)
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(1)?;
        if self.eat_punct("?") {
            let then = self.parse_assign()?;
            self.expect_punct(":")?;
            let otherwise = self.parse_assign()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(test)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, prec)) = self
                .peek()
                .filter(|l| l.kind == LexKind::Punct)
                .and_then(|l| binary_prec(&l.text).map(|p| (l.text.clone(), p)))
            else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.bump();
            // `**` is right associative.
            let next_min = if op == "**" { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(tok) = self.peek().filter(|l| l.kind == LexKind::Punct).cloned() {
            match tok.text.as_str() {
                "-" | "+" | "!" | "~" => {
                    self.bump();
                    let operand = self.parse_unary()?;
                    return Ok(Expr::Unary {
                        op: tok.text,
                        operand: Box::new(operand),
                    });
                }
                "++" | "--" => {
                    self.bump();
                    let operand = self.parse_unary()?;
                    return Ok(Expr::Update {
                        op: tok.text,
                        prefix: true,
                        operand: Box::new(operand),
                    });
                }
                _ => {}
            }
        }
        let expr = self.parse_call_member()?;
        match self.peek().cloned() {
            Some(tok) if (tok.is_punct("++") || tok.is_punct("--")) && !tok.newline_before => {
                self.bump();
                Ok(Expr::Update {
                    op: tok.text,
                    prefix: false,
                    operand: Box::new(expr),
                })
            }
            _ => Ok(expr),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.peek().is_none() {
                // Unbalanced call at end of input.
                break;
            }
            args.push(self.parse_assign()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_member_tail(&mut self, mut expr: Expr, allow_calls: bool) -> Result<Expr> {
        loop {
            let Some(tok) = self.peek().cloned() else {
                break;
            };
            if tok.is_punct(".") || tok.is_punct("?.") {
                self.bump();
                let property = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if tok.is_punct("[") && !tok.newline_before {
                self.bump();
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if allow_calls && tok.is_punct("(") && !tok.newline_before {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        self.parse_member_tail(primary, true)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(tok) = self.peek().cloned() else {
            return self.fail("expression");
        };
        match tok.kind {
            LexKind::Number => {
                self.bump();
                Ok(Expr::Number(tok.text))
            }
            LexKind::Str => {
                self.bump();
                Ok(Expr::Str(tok.text))
            }
            LexKind::Ident => match tok.text.as_str() {
                "true" | "false" => {
                    self.bump();
                    Ok(Expr::Bool(tok.text == "true"))
                }
                "new" => {
                    self.bump();
                    let callee = self.parse_primary()?;
                    let callee = self.parse_member_tail(callee, false)?;
                    let args = if self.at_punct("(") {
                        self.parse_args()?
                    } else {
                        Vec::new()
                    };
                    Ok(Expr::New {
                        callee: Box::new(callee),
                        args,
                    })
                }
                "function" => {
                    self.bump();
                    let f = self.parse_function_rest(tok.line)?;
                    Ok(Expr::Function(Box::new(f)))
                }
                _ if self.peek_nth(1).is_some_and(|l| l.is_punct("=>")) => {
                    self.bump();
                    self.bump();
                    let params = vec![Param {
                        name: tok.text.clone(),
                        default: None,
                        raw: tok.text.clone(),
                    }];
                    let f = self.parse_arrow_body(params, tok.line)?;
                    Ok(Expr::Function(Box::new(f)))
                }
                _ => {
                    self.bump();
                    Ok(Expr::Ident(tok.text))
                }
            },
            LexKind::Punct if tok.text == "(" => {
                if self.is_arrow_head() {
                    let params = self.parse_params()?;
                    self.expect_punct("=>")?;
                    let f = self.parse_arrow_body(params, tok.line)?;
                    return Ok(Expr::Function(Box::new(f)));
                }
                self.bump();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            LexKind::Punct if tok.text == "[" => {
                self.bump();
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    if self.peek().is_none() {
                        break;
                    }
                    items.push(self.parse_assign()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            _ => self.fail("expression"),
        }
    }

    fn is_arrow_head(&self) -> bool {
        let Some(open) = self.peek_index(0) else {
            return false;
        };
        let Some(close) = self.matching_close(open) else {
            return false;
        };
        self.lx[close + 1..]
            .iter()
            .find(|l| !l.is_comment())
            .is_some_and(|l| l.is_punct("=>"))
    }
}

/// Split lexemes on commas at bracket depth zero.
fn split_lexemes(lx: &[Lexeme]) -> Vec<&[Lexeme]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, l) in lx.iter().enumerate() {
        if l.kind != LexKind::Punct {
            continue;
        }
        match l.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            "," if depth == 0 => {
                out.push(&lx[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < lx.len() {
        out.push(&lx[start..]);
    }
    out.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Parse a function in any of the accepted shapes: `function f(..) {..}`,
/// `function (..) {..}`, `(..) => ..`, `x => ..`, `f(..) {..}` and
/// `const f = (..) => {..}`.
pub fn parse_function(src: &str) -> Result<FunctionDecl> {
    let mut p = Parser::new(src);
    if p.at_ident("async") {
        p.bump();
    }
    let Some(tok) = p.peek().cloned() else {
        bail!("line 1: expected function, found end of input");
    };
    if tok.kind == LexKind::Ident {
        match tok.text.as_str() {
            "function" => {
                p.bump();
                return p.parse_function_rest(tok.line);
            }
            "const" | "let" | "var" => {
                if let Stmt::Function(f) = p.parse_decl()? {
                    return Ok(f);
                }
                bail!("line {}: expected function declaration", tok.line);
            }
            _ if p.peek_nth(1).is_some_and(|l| l.is_punct("=>")) => {
                if let Expr::Function(f) = p.parse_primary()? {
                    return Ok(*f);
                }
            }
            _ if p.peek_nth(1).is_some_and(|l| l.is_punct("(")) => {
                p.bump();
                let params = p.parse_params()?;
                if p.eat_punct("=>") {
                    let mut f = p.parse_arrow_body(params, tok.line)?;
                    f.name = Some(tok.text);
                    return Ok(f);
                }
                if !p.eat_punct("{") {
                    return p.fail("`{`");
                }
                let body = p.parse_block_body()?;
                return Ok(FunctionDecl {
                    name: Some(tok.text),
                    params,
                    body,
                    line: tok.line,
                });
            }
            _ => {}
        }
    }
    if tok.is_punct("(") && p.is_arrow_head() {
        if let Expr::Function(f) = p.parse_primary()? {
            return Ok(*f);
        }
    }
    p.fail("function")
}

/// Parse a standalone statement list (helper sources, tests).
pub fn parse_statements(src: &str) -> Result<Vec<Stmt>> {
    Parser::new(src).parse_block_body()
}

pub fn parse_expression(src: &str) -> Result<Expr> {
    let mut p = Parser::new(src);
    let expr = p.parse_expr()?;
    if p.peek().is_some() {
        return p.fail("end of expression");
    }
    Ok(expr)
}

/// Visit `expr` and every sub-expression, pre-order. Function bodies are not entered.
pub fn visit_expr<'a, F: FnMut(&'a Expr)>(expr: &'a Expr, f: &mut F) {
    f(expr);
    match expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Ident(_) | Expr::Function(_) => {}
        Expr::Array(items) => items.iter().for_each(|e| visit_expr(e, f)),
        Expr::Member { object, .. } => visit_expr(object, f),
        Expr::Index { object, index } => {
            visit_expr(object, f);
            visit_expr(index, f);
        }
        Expr::Call { callee, args } | Expr::New { callee, args } => {
            visit_expr(callee, f);
            args.iter().for_each(|e| visit_expr(e, f));
        }
        Expr::Unary { operand, .. } | Expr::Update { operand, .. } => visit_expr(operand, f),
        Expr::Binary { left, right, .. } => {
            visit_expr(left, f);
            visit_expr(right, f);
        }
        Expr::Assign { target, value, .. } => {
            visit_expr(target, f);
            visit_expr(value, f);
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            visit_expr(test, f);
            visit_expr(then, f);
            visit_expr(otherwise, f);
        }
        Expr::Paren(inner) => visit_expr(inner, f),
    }
}

/// Visit every statement, pre-order, without entering nested functions.
pub fn walk_stmts<'a, F: FnMut(&'a Stmt)>(stmts: &'a [Stmt], f: &mut F) {
    for stmt in stmts {
        walk_stmt(stmt, f);
    }
}

fn walk_stmt<'a, F: FnMut(&'a Stmt)>(stmt: &'a Stmt, f: &mut F) {
    f(stmt);
    match stmt {
        Stmt::If {
            then, otherwise, ..
        } => {
            walk_stmt(then, f);
            if let Some(o) = otherwise {
                walk_stmt(o, f);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(i) = init {
                walk_stmt(i, f);
            }
            walk_stmt(body, f);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => walk_stmt(body, f),
        Stmt::Block(inner) => walk_stmts(inner, f),
        _ => {}
    }
}

/// Expressions directly owned by one statement (not its children statements).
pub fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::Decl { declarators, .. } => {
            declarators.iter().filter_map(|d| d.init.as_ref()).collect()
        }
        Stmt::Expr(e) => vec![e],
        Stmt::If { test, .. } | Stmt::While { test, .. } | Stmt::DoWhile { test, .. } => {
            vec![test]
        }
        Stmt::For { test, update, .. } => test.iter().chain(update.iter()).collect(),
        Stmt::Return(Some(e)) => vec![e],
        _ => Vec::new(),
    }
}

/// Visit every expression in a statement list, without entering nested functions.
pub fn walk_exprs<'a, F: FnMut(&'a Expr)>(stmts: &'a [Stmt], f: &mut F) {
    walk_stmts(stmts, &mut |stmt| {
        for e in stmt_exprs(stmt) {
            visit_expr(e, f);
        }
    });
}
