//! Band-math expressions for the processing product.
//!
//! An expression such as `(b1-b2)/(b1+b2)` is parsed once per request and
//! evaluated pixel by pixel against the bands it references. Several
//! comma-separated expressions yield one output band each.

use ndarray::{Array2, Array3};
use std::fmt;

use crate::error::{Result, TilerError};
use crate::raster::RasterTile;

const PARAM: &str = "ratio";

/// Deepest allowed nesting of parentheses and unary signs
pub const MAX_NESTING: usize = 64;

/// Longest allowed expression, in tokens; bounds the depth of operator chains
pub const MAX_TOKENS: usize = 1024;

/// Most comma-separated expressions; the encoder takes at most four bands
pub const MAX_EXPRESSIONS: usize = 4;

fn syntax_error(message: impl Into<String>) -> TilerError {
    TilerError::invalid(PARAM, message)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Band(usize),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed arithmetic over band references
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// 1-based band index
    Band(usize),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate with `bands[i]` holding the value of band `i` (index 0 unused)
    fn eval(&self, bands: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Band(i) => bands[*i],
            Expr::Neg(inner) => -inner.eval(bands),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(bands), rhs.eval(bands));
                match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                }
            }
        }
    }

    fn collect_bands(&self, out: &mut Vec<usize>) {
        match self {
            Expr::Number(_) => {}
            Expr::Band(i) => out.push(*i),
            Expr::Neg(inner) => inner.collect_bands(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_bands(out);
                rhs.collect_bands(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Band(i) => write!(f, "b{}", i),
            Expr::Neg(inner) => write!(f, "-({})", inner),
            Expr::Binary(op, lhs, rhs) => {
                let symbol = match op {
                    Op::Add => "+",
                    Op::Sub => "-",
                    Op::Mul => "*",
                    Op::Div => "/",
                };
                write!(f, "({} {} {})", lhs, symbol, rhs)
            }
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Band(parse_band(&word)?));
            }
            other => {
                return Err(syntax_error(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )))
            }
        }
    }
    Ok(tokens)
}

/// `b3` / `B3` to band 3
fn parse_band(word: &str) -> Result<usize> {
    let index = word
        .strip_prefix(&['b', 'B'][..])
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| syntax_error(format!("unknown identifier '{}'", word)))?;
    if index == 0 {
        return Err(syntax_error("band references start at b1"));
    }
    Ok(index)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(syntax_error(format!(
                "expression nests deeper than {} levels",
                MAX_NESTING
            )));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(token @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            let op = if token == Token::Plus { Op::Add } else { Op::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(token @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = if token == Token::Star { Op::Mul } else { Op::Div };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.ascend();
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.ascend();
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::Band(i)) => Ok(Expr::Band(i)),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.expression()?;
                self.ascend();
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax_error("missing closing parenthesis")),
                }
            }
            Some(token) => Err(syntax_error(format!("unexpected token {:?}", token))),
            None => Err(syntax_error("unexpected end of expression")),
        }
    }
}

/// Parse a single arithmetic expression
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(syntax_error("expression is empty"));
    }
    if tokens.len() > MAX_TOKENS {
        return Err(syntax_error(format!(
            "expression is longer than {} tokens",
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(syntax_error(format!("unexpected token {:?}", token)));
    }
    Ok(expr)
}

/// One or more band-math expressions, one output band each.
#[derive(Debug, Clone, PartialEq)]
pub struct BandMath {
    expressions: Vec<Expr>,
}

impl BandMath {
    /// Parse a comma-separated list of expressions
    pub fn parse(input: &str) -> Result<Self> {
        if input.split(',').count() > MAX_EXPRESSIONS {
            return Err(syntax_error(format!(
                "at most {} expressions are allowed",
                MAX_EXPRESSIONS
            )));
        }
        let expressions = input
            .split(',')
            .map(parse_expression)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { expressions })
    }

    pub fn expressions(&self) -> &[Expr] {
        &self.expressions
    }

    /// Sorted, de-duplicated 1-based band indexes referenced anywhere
    pub fn bands(&self) -> Vec<usize> {
        let mut bands = Vec::new();
        for expr in &self.expressions {
            expr.collect_bands(&mut bands);
        }
        bands.sort_unstable();
        bands.dedup();
        bands
    }

    /// Evaluate against a tile whose band `k` holds source band `bands[k]`.
    ///
    /// Non-finite results mark the pixel invalid.
    pub fn evaluate(&self, tile: &RasterTile, bands: &[usize]) -> Result<RasterTile> {
        if bands.len() != tile.bands() {
            return Err(TilerError::raster(format!(
                "expected {} bands for the expression, got {}",
                bands.len(),
                tile.bands()
            )));
        }
        let max_band = bands.iter().copied().max().unwrap_or(0);
        let (height, width) = (tile.height(), tile.width());
        let mut data = Array3::<f32>::zeros((self.expressions.len(), height, width));
        let mut mask = Array2::from_elem((height, width), false);
        let mut values = vec![f64::NAN; max_band + 1];
        let mut results = vec![0f32; self.expressions.len()];

        for r in 0..height {
            for c in 0..width {
                if !tile.mask[[r, c]] {
                    continue;
                }
                for (k, &band) in bands.iter().enumerate() {
                    values[band] = f64::from(tile.data[[k, r, c]]);
                }
                let mut finite = true;
                for (e, expr) in self.expressions.iter().enumerate() {
                    let v = expr.eval(&values) as f32;
                    finite &= v.is_finite();
                    results[e] = v;
                }
                if finite {
                    for (e, &v) in results.iter().enumerate() {
                        data[[e, r, c]] = v;
                    }
                    mask[[r, c]] = true;
                }
            }
        }

        RasterTile::new(data, mask)
    }
}
