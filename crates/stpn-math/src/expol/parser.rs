//! Textual round-trip for expolynomials.
//!
//! ```text
//! expolynomial := exmonomial ('+' exmonomial)*
//! exmonomial   := term ('*' term)*
//! term         := <decimal> | ident | ident '^' <int> | 'Exp[' <decimal> ident ']'
//! ```

use super::exmonomial::{AtomicTerm, Exmonomial};
use super::expolynomial::Expolynomial;
use super::variable::Variable;
use crate::exact::ExactReal;
use stpn_core::{Error, Result};

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Cursor { input, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::Validation(format!(
            "expolynomial parse error at offset {}: {}",
            self.pos, message
        ))
    }

    fn decimal(&mut self) -> Result<ExactReal> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some('-') || self.peek() == Some('+') {
            self.bump();
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.bump();
        }
        // Optional exponent part.
        if self.peek() == Some('e') || self.peek() == Some('E') {
            let mark = self.pos;
            self.bump();
            if self.peek() == Some('-') || self.peek() == Some('+') {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.input[start..self.pos];
        ExactReal::from_decimal_str(text)
            .ok_or_else(|| self.error(format!("invalid decimal '{text}'")))
    }

    fn ident(&mut self) -> Result<Variable> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        // A trailing '*' belongs to the name (the ground variable `t*`)
        // only when it is not the multiplication separator.
        if self.peek() == Some('*') {
            let after = self.input[self.pos + 1..].chars().next();
            if !after.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                self.bump();
            }
        }
        Ok(Variable::new(&self.input[start..self.pos]))
    }

    fn integer(&mut self) -> Result<u32> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected an integer exponent"))
    }

    fn term(&mut self, into: &mut Exmonomial) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let value = self.decimal()?;
                *into = into.scale(&value);
                Ok(())
            }
            Some('E') if self.input[self.pos..].starts_with("Exp[") => {
                self.pos += "Exp[".len();
                let rate = self.decimal()?;
                let variable = self.ident()?;
                self.expect(']')?;
                let rate = rate
                    .rational()
                    .cloned()
                    .ok_or_else(|| self.error("infinite exponential rate"))?;
                into.multiply_term(&AtomicTerm::Exponential { variable, rate });
                Ok(())
            }
            Some(c) if c.is_alphabetic() => {
                let variable = self.ident()?;
                let exponent = if self.eat('^') { self.integer()? } else { 1 };
                into.multiply_term(&AtomicTerm::Monomial { variable, exponent });
                Ok(())
            }
            _ => Err(self.error("expected a term")),
        }
    }

    fn exmonomial(&mut self) -> Result<Exmonomial> {
        let mut m = Exmonomial::constant(ExactReal::one());
        self.term(&mut m)?;
        while self.eat('*') {
            self.term(&mut m)?;
        }
        Ok(m)
    }
}

/// Parse the textual form of an expolynomial.
pub fn parse_expolynomial(input: &str) -> Result<Expolynomial> {
    let mut cursor = Cursor::new(input);
    let mut terms = vec![cursor.exmonomial()?];
    while cursor.eat('+') {
        terms.push(cursor.exmonomial()?);
    }
    cursor.skip_ws();
    if cursor.pos != cursor.input.len() {
        return Err(cursor.error("trailing input"));
    }
    Ok(Expolynomial::from_terms(terms))
}

impl std::str::FromStr for Expolynomial {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_expolynomial(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parses_constants_and_monomials() {
        let e = parse_expolynomial("2.5 * x^2 + 3").unwrap();
        let mut a = BTreeMap::new();
        a.insert(Variable::new("x"), 2.0);
        assert!((e.evaluate(&a).unwrap() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn parses_exponentials() {
        let e = parse_expolynomial("Exp[1.0 x]").unwrap();
        let mut a = BTreeMap::new();
        a.insert(Variable::new("x"), 1.0);
        assert!((e.evaluate(&a).unwrap() - (-1.0_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn round_trips_through_display() {
        let cases = ["0.5 * x * Exp[0.5 x]", "2 * x^3 + 1 * y", "3"];
        for case in cases {
            let parsed = parse_expolynomial(case).unwrap();
            let reparsed = parse_expolynomial(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "case {case}");
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_expolynomial("x + ").is_err());
        assert!(parse_expolynomial("Exp[1.0 x").is_err());
    }
}
