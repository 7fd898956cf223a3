//! Text notation for sets.
//!
//! ```text
//! [n, m] -> { [i, j] : 0 <= i < n and 0 <= j < m and i < j }
//! ```
//!
//! Comparisons may be chained and each side may be a comma-separated list, so
//! `0 <= i, j < n` bounds both `i` and `j`. Coefficients must be integer
//! constants. Names that are not dimensions are parameters, declared or not.

use snafu::ensure;

use crate::affine::{Constraint, LinExpr};
use crate::error::{ParseSnafu, Result};
use crate::set::BasicSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Arrow,
    Plus,
    Minus,
    Star,
    Cmp(Cmp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Cmp {
    fn apply(self, lhs: LinExpr, rhs: LinExpr) -> Constraint {
        match self {
            Cmp::Lt => lhs.less_than(rhs),
            Cmp::Le => lhs.at_most(rhs),
            Cmp::Gt => lhs.greater_than(rhs),
            Cmp::Ge => lhs.at_least(rhs),
            Cmp::Eq => lhs.equals(rhs),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos] as char;
        let two = text.get(pos..pos + 2).unwrap_or("");
        let (token, width) = match c {
            c if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            c if c.is_ascii_digit() => {
                let end = text[pos..].find(|ch: char| !ch.is_ascii_digit()).map_or(text.len(), |n| pos + n);
                let value = text[pos..end]
                    .parse()
                    .map_err(|_| ParseSnafu { position: pos, message: "integer literal out of range" }.build())?;
                (Token::Int(value), end - pos)
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = text[pos..]
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '\''))
                    .map_or(text.len(), |n| pos + n);
                (Token::Ident(text[pos..end].to_string()), end - pos)
            }
            _ if two == "->" => (Token::Arrow, 2),
            _ if two == "<=" => (Token::Cmp(Cmp::Le), 2),
            _ if two == ">=" => (Token::Cmp(Cmp::Ge), 2),
            _ if two == "==" => (Token::Cmp(Cmp::Eq), 2),
            '<' => (Token::Cmp(Cmp::Lt), 1),
            '>' => (Token::Cmp(Cmp::Gt), 1),
            '=' => (Token::Cmp(Cmp::Eq), 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '{' => (Token::LBrace, 1),
            '}' => (Token::RBrace, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            ':' => (Token::Colon, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            other => return ParseSnafu { position: pos, message: format!("unexpected character '{other}'") }.fail(),
        };
        tokens.push((token, start));
        pos += width;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self { tokens: tokenize(text)?, pos: 0, end: text.len() })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, p)| *p)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        ParseSnafu { position: self.offset(), message: message.into() }.fail()
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) { Ok(()) } else { self.error(format!("expected {what}")) }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error("expected identifier"),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// `[a, b, c]`
    fn name_list(&mut self) -> Result<Vec<String>> {
        self.expect(&Token::LBracket, "'['")?;
        let mut names = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(names);
        }
        loop {
            let name = self.ident()?;
            if names.contains(&name) {
                return self.error(format!("duplicate name '{name}'"));
            }
            names.push(name);
            if self.eat(&Token::RBracket) {
                return Ok(names);
            }
            self.expect(&Token::Comma, "',' or ']'")?;
        }
    }

    /// `chain (and chain)*`
    fn conjunction(&mut self) -> Result<Vec<Constraint>> {
        let mut out = self.chain()?;
        while self.eat_keyword("and") {
            out.extend(self.chain()?);
        }
        Ok(out)
    }

    /// `list (cmp list)+`
    fn chain(&mut self) -> Result<Vec<Constraint>> {
        let mut lhs = self.list()?;
        let mut out = Vec::new();
        while let Some(Token::Cmp(cmp)) = self.peek() {
            let cmp = *cmp;
            self.pos += 1;
            let rhs = self.list()?;
            for l in &lhs {
                for r in &rhs {
                    out.push(cmp.apply(l.clone(), r.clone()));
                }
            }
            lhs = rhs;
        }
        if out.is_empty() {
            return self.error("expected comparison");
        }
        Ok(out)
    }

    fn list(&mut self) -> Result<Vec<LinExpr>> {
        let mut out = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            out.push(self.expr()?);
        }
        Ok(out)
    }

    fn expr(&mut self) -> Result<LinExpr> {
        let mut acc = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                acc = acc + self.term()?;
            } else if self.eat(&Token::Minus) {
                acc = acc - self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<LinExpr> {
        let mut acc = self.factor()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.factor()?;
                acc = self.product(acc, rhs)?;
            } else if matches!(self.peek(), Some(Token::Ident(name)) if name != "and") && acc.is_constant() {
                // `2i`
                let rhs = self.factor()?;
                acc = self.product(acc, rhs)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn product(&self, lhs: LinExpr, rhs: LinExpr) -> Result<LinExpr> {
        match (lhs.is_constant(), rhs.is_constant()) {
            (true, _) => Ok(rhs * lhs.constant_term()),
            (_, true) => Ok(lhs * rhs.constant_term()),
            _ => self.error("non-affine product"),
        }
    }

    fn factor(&mut self) -> Result<LinExpr> {
        match self.peek().cloned() {
            Some(Token::Int(value)) => {
                self.pos += 1;
                Ok(LinExpr::constant(value))
            }
            Some(Token::Ident(name)) if name != "and" => {
                self.pos += 1;
                Ok(LinExpr::var(name))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => self.error("expected expression"),
        }
    }
}

pub(crate) fn parse_set(text: &str) -> Result<BasicSet> {
    let mut parser = Parser::new(text)?;
    let params = if parser.peek() == Some(&Token::LBracket) {
        let params = parser.name_list()?;
        parser.expect(&Token::Arrow, "'->'")?;
        params
    } else {
        Vec::new()
    };
    parser.expect(&Token::LBrace, "'{'")?;
    let dims = parser.name_list()?;
    if let Some(clash) = dims.iter().find(|d| params.contains(d)) {
        return parser.error(format!("'{clash}' is both a parameter and a dimension"));
    }
    let constraints = if parser.eat(&Token::Colon) { parser.conjunction()? } else { Vec::new() };
    parser.expect(&Token::RBrace, "'}'")?;
    ensure!(parser.at_end(), ParseSnafu { position: parser.offset(), message: "trailing input" });
    Ok(BasicSet::universe(dims).with_params(params).add_constraints(constraints))
}

/// Parses a bare conjunction such as `"n, m >= 1 and n <= 1024"`.
pub fn parse_constraints(text: &str) -> Result<Vec<Constraint>> {
    let mut parser = Parser::new(text)?;
    if parser.at_end() {
        return Ok(Vec::new());
    }
    let constraints = parser.conjunction()?;
    ensure!(parser.at_end(), ParseSnafu { position: parser.offset(), message: "trailing input" });
    Ok(constraints)
}
