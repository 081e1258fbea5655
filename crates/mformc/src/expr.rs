//! Integer expressions for `#if` conditions and `range(...)` bounds.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      = and ( "||" and )*
//! and     = eq ( "&&" eq )*
//! eq      = rel ( ("===" | "!==" | "==" | "!=") rel )*
//! rel     = add ( ("<=" | ">=" | "<" | ">") add )*
//! add     = mul ( ("+" | "-") mul )*
//! mul     = unary ( ("*" | "/" | "%") unary )*
//! unary   = ("-" | "!") unary | primary
//! primary = INT | "(" or ")"
//! ```
//!
//! Booleans are `1`/`0`; a value is truthy when non-zero.

use std::fmt;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
}

impl ExprError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ExprError {}

pub fn eval_int(src: &str) -> Result<i64, ExprError> {
    let mut p = Parser {
        src: src.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let v = p.parse_or()?;
    p.skip_ws();
    if p.pos != p.src.len() {
        return Err(ExprError::new("unexpected trailing input", p.pos));
    }
    Ok(v)
}

pub fn eval_bool(src: &str) -> Result<bool, ExprError> {
    eval_int(src).map(|v| v != 0)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, tok: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(tok.as_bytes()) {
            self.pos += tok.len();
            true
        } else {
            false
        }
    }

    /// First of `toks` present at the cursor; longer tokens must come first.
    fn eat_any(&mut self, toks: &[&'static str]) -> Option<&'static str> {
        toks.iter().copied().find(|t| self.eat(t))
    }

    fn overflow(&self) -> ExprError {
        ExprError::new("integer overflow", self.pos)
    }

    fn parse_or(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat("||") {
            let rhs = self.parse_and()?;
            lhs = i64::from(lhs != 0 || rhs != 0);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_eq()?;
        while self.eat("&&") {
            let rhs = self.parse_eq()?;
            lhs = i64::from(lhs != 0 && rhs != 0);
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_rel()?;
        while let Some(op) = self.eat_any(&["===", "!==", "==", "!="]) {
            let rhs = self.parse_rel()?;
            lhs = match op {
                "===" | "==" => i64::from(lhs == rhs),
                _ => i64::from(lhs != rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_add()?;
        while let Some(op) = self.eat_any(&["<=", ">=", "<", ">"]) {
            let rhs = self.parse_add()?;
            lhs = i64::from(match op {
                "<=" => lhs <= rhs,
                ">=" => lhs >= rhs,
                "<" => lhs < rhs,
                _ => lhs > rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            self.skip_ws();
            let op = match self.src.get(self.pos) {
                Some(b'+') => b'+',
                Some(b'-') => b'-',
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = if op == b'+' {
                lhs.checked_add(rhs)
            } else {
                lhs.checked_sub(rhs)
            }
            .ok_or_else(|| self.overflow())?;
        }
    }

    fn parse_mul(&mut self) -> Result<i64, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            let op = match self.src.get(self.pos) {
                Some(&c) if matches!(c, b'*' | b'/' | b'%') => c,
                _ => return Ok(lhs),
            };
            let op_pos = self.pos;
            self.pos += 1;
            let rhs = self.parse_unary()?;
            if op != b'*' && rhs == 0 {
                return Err(ExprError::new("division by zero", op_pos));
            }
            lhs = match op {
                b'*' => lhs.checked_mul(rhs),
                b'/' => lhs.checked_div(rhs),
                _ => lhs.checked_rem(rhs),
            }
            .ok_or_else(|| self.overflow())?;
        }
    }

    fn parse_unary(&mut self) -> Result<i64, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::new("expression nested too deeply", self.pos));
        }
        let v = self.parse_unary_inner();
        self.depth -= 1;
        v
    }

    fn parse_unary_inner(&mut self) -> Result<i64, ExprError> {
        self.skip_ws();
        match self.src.get(self.pos) {
            Some(b'-') => {
                self.pos += 1;
                let v = self.parse_unary()?;
                v.checked_neg().ok_or_else(|| self.overflow())
            }
            Some(b'!') if self.src.get(self.pos + 1) != Some(&b'=') => {
                self.pos += 1;
                let v = self.parse_unary()?;
                Ok(i64::from(v == 0))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64, ExprError> {
        self.skip_ws();
        let start = self.pos;
        match self.src.get(self.pos) {
            Some(b'(') => {
                self.pos += 1;
                let v = self.parse_or()?;
                if !self.eat(")") {
                    return Err(ExprError::new("expected `)`", self.pos));
                }
                Ok(v)
            }
            Some(c) if c.is_ascii_digit() => {
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let digits = std::str::from_utf8(&self.src[start..self.pos])
                    .map_err(|_| ExprError::new("invalid digits", start))?;
                digits
                    .parse::<i64>()
                    .map_err(|_| ExprError::new("integer literal out of range", start))
            }
            Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {
                Err(ExprError::new("unknown identifier", start))
            }
            Some(_) => Err(ExprError::new("unexpected character", start)),
            None => Err(ExprError::new("unexpected end of expression", start)),
        }
    }
}
