//! Restricted expression evaluation for the `eval` built-in.
//!
//! The grammar is a closed, enumerated set of safe primitives; there is no
//! host access, no variables, and no way to extend the operation set from a
//! document:
//!
//! ```text
//! expr       := additive (("==" | "!=" | "<" | "<=" | ">" | ">=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := "-" unary | primary
//! primary    := number | "(" expr ")" | ("min" | "max" | "abs") "(" args ")"
//! ```
//!
//! Integers stay integers through `+ - * %`; `/` always produces a float.
//! Comparisons yield booleans. Anything else, including unknown
//! identifiers, is rejected.

use crate::document::Document;

/// Evaluates a restricted expression to a document scalar.
///
/// # Errors
///
/// Fails on syntax errors, unknown identifiers, division by zero, and
/// comparison chains (`a < b < c` is not part of the grammar).
pub fn evaluate(expression: &str) -> anyhow::Result<Document> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        anyhow::bail!("unexpected trailing input in expression '{expression}'");
    }
    Ok(match value {
        Value::Int(i) => Document::from(i),
        Value::Float(f) => Document::from(f),
        Value::Bool(b) => Document::from(b),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    fn as_float(self) -> anyhow::Result<f64> {
        match self {
            Self::Int(i) => Ok(i as f64),
            Self::Float(f) => Ok(f),
            Self::Bool(_) => anyhow::bail!("expected a number, found a boolean"),
        }
    }

    fn numeric(self) -> anyhow::Result<Self> {
        match self {
            Self::Bool(_) => anyhow::bail!("expected a number, found a boolean"),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(source: &str) -> anyhow::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = if text.contains('.') {
                    Value::Float(
                        text.parse()
                            .map_err(|_| anyhow::anyhow!("invalid number '{text}'"))?,
                    )
                } else {
                    Value::Int(
                        text.parse()
                            .map_err(|_| anyhow::anyhow!("invalid number '{text}'"))?,
                    )
                };
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.peek() == Some(&'=');
                if followed_by_eq {
                    chars.next();
                }
                tokens.push(match (c, followed_by_eq) {
                    ('=', true) => Token::Eq,
                    ('!', true) => Token::Ne,
                    ('<', true) => Token::Le,
                    ('<', false) => Token::Lt,
                    ('>', true) => Token::Ge,
                    ('>', false) => Token::Gt,
                    _ => anyhow::bail!("unexpected character '{c}' in expression"),
                });
            }
            other => anyhow::bail!("unexpected character '{other}' in expression"),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: &Token) -> anyhow::Result<()> {
        match self.next() {
            Some(found) if &found == token => Ok(()),
            Some(found) => anyhow::bail!("expected {token:?}, found {found:?}"),
            None => anyhow::bail!("unexpected end of expression, expected {token:?}"),
        }
    }

    fn expr(&mut self) -> anyhow::Result<Value> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge) => {
                self.next()
            }
            _ => return Ok(left),
        };
        let right = self.additive()?;
        let (l, r) = (left.as_float()?, right.as_float()?);
        let result = match op {
            Some(Token::Eq) => l == r,
            Some(Token::Ne) => l != r,
            Some(Token::Lt) => l < r,
            Some(Token::Le) => l <= r,
            Some(Token::Gt) => l > r,
            Some(Token::Ge) => l >= r,
            _ => unreachable!("comparison operator checked above"),
        };
        Ok(Value::Bool(result))
    }

    fn additive(&mut self) -> anyhow::Result<Value> {
        let mut value = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus | Token::Minus) => self.next(),
                _ => return Ok(value),
            };
            let right = self.term()?;
            value = match (op, value.numeric()?, right.numeric()?) {
                (Some(Token::Plus), Value::Int(a), Value::Int(b)) => Value::Int(
                    a.checked_add(b)
                        .ok_or_else(|| anyhow::anyhow!("integer overflow"))?,
                ),
                (Some(Token::Minus), Value::Int(a), Value::Int(b)) => Value::Int(
                    a.checked_sub(b)
                        .ok_or_else(|| anyhow::anyhow!("integer overflow"))?,
                ),
                (Some(Token::Plus), a, b) => Value::Float(a.as_float()? + b.as_float()?),
                (Some(Token::Minus), a, b) => Value::Float(a.as_float()? - b.as_float()?),
                _ => unreachable!("additive operator checked above"),
            };
        }
    }

    fn term(&mut self) -> anyhow::Result<Value> {
        let mut value = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star | Token::Slash | Token::Percent) => self.next(),
                _ => return Ok(value),
            };
            let right = self.unary()?;
            value = match (op, value.numeric()?, right.numeric()?) {
                (Some(Token::Star), Value::Int(a), Value::Int(b)) => Value::Int(
                    a.checked_mul(b)
                        .ok_or_else(|| anyhow::anyhow!("integer overflow"))?,
                ),
                (Some(Token::Star), a, b) => Value::Float(a.as_float()? * b.as_float()?),
                (Some(Token::Slash), a, b) => {
                    let divisor = b.as_float()?;
                    if divisor == 0.0 {
                        anyhow::bail!("division by zero");
                    }
                    Value::Float(a.as_float()? / divisor)
                }
                (Some(Token::Percent), Value::Int(a), Value::Int(b)) => Value::Int(
                    a.checked_rem(b)
                        .ok_or_else(|| anyhow::anyhow!("division by zero"))?,
                ),
                (Some(Token::Percent), a, b) => {
                    let divisor = b.as_float()?;
                    if divisor == 0.0 {
                        anyhow::bail!("division by zero");
                    }
                    Value::Float(a.as_float()? % divisor)
                }
                _ => unreachable!("term operator checked above"),
            };
        }
    }

    fn unary(&mut self) -> anyhow::Result<Value> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            return Ok(match self.unary()?.numeric()? {
                Value::Int(i) => Value::Int(
                    i.checked_neg()
                        .ok_or_else(|| anyhow::anyhow!("integer overflow"))?,
                ),
                Value::Float(f) => Value::Float(-f),
                Value::Bool(_) => unreachable!("numeric() rejects booleans"),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> anyhow::Result<Value> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => self.call(&name),
            Some(other) => anyhow::bail!("unexpected {other:?} in expression"),
            None => anyhow::bail!("unexpected end of expression"),
        }
    }

    fn call(&mut self, name: &str) -> anyhow::Result<Value> {
        if !matches!(name, "min" | "max" | "abs") {
            anyhow::bail!("unknown identifier '{name}' (allowed: min, max, abs)");
        }
        self.expect(&Token::LParen)?;
        let mut args = vec![self.expr()?.numeric()?];
        while self.peek() == Some(&Token::Comma) {
            self.next();
            args.push(self.expr()?.numeric()?);
        }
        self.expect(&Token::RParen)?;

        match name {
            "abs" => {
                if args.len() != 1 {
                    anyhow::bail!("abs takes exactly one argument");
                }
                Ok(match args[0] {
                    Value::Int(i) => Value::Int(i.abs()),
                    Value::Float(f) => Value::Float(f.abs()),
                    Value::Bool(_) => unreachable!("numeric() rejects booleans"),
                })
            }
            _ => {
                if args.len() < 2 {
                    anyhow::bail!("{name} takes at least two arguments");
                }
                let mut best = args[0];
                for &arg in &args[1..] {
                    let replace = if name == "min" {
                        arg.as_float()? < best.as_float()?
                    } else {
                        arg.as_float()? > best.as_float()?
                    };
                    if replace {
                        best = arg;
                    }
                }
                Ok(best)
            }
        }
    }
}
