//! Coverage computation over fault-status counts.
//!
//! Coverage formulas are arithmetic expressions over two-letter status codes
//! and status-group names, e.g. `(DD + DN)/(NA + DA + DN + DD + SU)`. The
//! engine counts statuses over the whole fault list (equivalents included),
//! derives group counts, binds identifiers that match neither to zero, and
//! evaluates the expression with a dedicated evaluator — never a host
//! language `eval`. Allowed tokens: `+ - * / ** ( )`, non-negative integer
//! literals, and `[A-Z]{2}` identifiers.

use std::collections::BTreeMap;

use crate::common::error::{Error, Result};
use crate::fault::report::TxtFaultReport;

/// Decimal places coverage values are rounded to.
const PRECISION: u32 = 4;

/// Rounds to the standard coverage precision.
fn round_coverage(value: f64) -> f64 {
    let factor = 10f64.powi(PRECISION as i32);
    (value * factor).round() / factor
}

impl TxtFaultReport {
    /// Counts fault statuses over the whole fault list.
    ///
    /// # Errors
    ///
    /// [`Error::Report`] when the report has no `FaultList` section.
    pub fn status_counts(&self) -> Result<BTreeMap<String, usize>> {
        let fault_list = self
            .fault_list
            .as_ref()
            .ok_or_else(|| Error::Report("FaultList section not found".into()))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for fault in fault_list {
            *counts.entry(fault.fault_status.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Evaluates every coverage formula of the report.
    ///
    /// Group counts are the sums of their member status counts; identifiers
    /// matching neither a status nor a group are bound to zero. Values are
    /// rounded to four decimals. Without a `Coverage` section the fallback is
    /// the per-status ratio map `{status: count / total}`.
    pub fn compute_coverage(&self) -> Result<Vec<(String, f64)>> {
        let status_counts = self.status_counts()?;

        let mut bindings: BTreeMap<String, f64> = status_counts
            .iter()
            .map(|(status, count)| (status.clone(), *count as f64))
            .collect();

        if let Some(groups) = &self.status_groups {
            for (group, members) in groups {
                let total: usize = members
                    .iter()
                    .filter_map(|status| status_counts.get(status))
                    .sum();
                let _ = bindings.insert(group.clone(), total as f64);
            }
        }

        let Some(formulas) = &self.coverage else {
            let total: usize = status_counts.values().sum();
            if total == 0 {
                return Err(Error::Report("fault list is empty".into()));
            }
            return Ok(status_counts
                .into_iter()
                .map(|(status, count)| (status, round_coverage(count as f64 / total as f64)))
                .collect());
        };

        formulas
            .iter()
            .map(|(name, body)| {
                let value = evaluate_formula(body, &bindings)
                    .map_err(|e| Error::Formula(format!("{name}: {e}")))?;
                Ok((name.clone(), round_coverage(value)))
            })
            .collect()
    }

    /// Evaluates one coverage formula (or fallback ratio) by name.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownFormula`] when no formula of that name exists.
    pub fn coverage_value(&self, requested_formula: &str) -> Result<f64> {
        self.compute_coverage()?
            .into_iter()
            .find(|(name, _)| name == requested_formula)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::UnknownFormula(requested_formula.to_string()))
    }
}

/// Expression token.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    LParen,
    RParen,
}

/// Tokenizes a formula body; anything outside the allowed alphabet fails.
fn tokenize(body: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                let _ = chars.next();
            }
            '+' => {
                let _ = chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                let _ = chars.next();
                tokens.push(Token::Minus);
            }
            '/' => {
                let _ = chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                let _ = chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                let _ = chars.next();
                tokens.push(Token::RParen);
            }
            '*' => {
                let _ = chars.next();
                if chars.peek() == Some(&'*') {
                    let _ = chars.next();
                    tokens.push(Token::DoubleStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '0'..='9' => {
                let mut literal = String::new();
                while let Some(&digit) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    literal.push(digit);
                    let _ = chars.next();
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| Error::Formula(format!("bad integer literal {literal:?}")))?;
                tokens.push(Token::Number(value));
            }
            'A'..='Z' => {
                let mut ident = String::new();
                while let Some(&letter) = chars.peek() {
                    if !letter.is_ascii_uppercase() {
                        break;
                    }
                    ident.push(letter);
                    let _ = chars.next();
                }
                if ident.len() != 2 {
                    return Err(Error::Formula(format!(
                        "identifier {ident:?} is not a two-letter status or group"
                    )));
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::Formula(format!("unexpected character {other:?}")));
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over the token stream.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    bindings: &'a BTreeMap<String, f64>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// `expr := term (('+'|'-') term)*`
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    let _ = self.bump();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    let _ = self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    /// `term := power (('*'|'/') power)*`
    fn term(&mut self) -> Result<f64> {
        let mut value = self.power()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    let _ = self.bump();
                    value *= self.power()?;
                }
                Some(Token::Slash) => {
                    let _ = self.bump();
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err(Error::Formula("division by zero".into()));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    /// `power := atom ('**' power)?` — right-associative.
    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if matches!(self.peek(), Some(Token::DoubleStar)) {
            let _ = self.bump();
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    /// `atom := number | ident | '(' expr ')'`
    fn atom(&mut self) -> Result<f64> {
        match self.bump().cloned() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Ident(name)) => {
                // Identifiers matching neither a status nor a group count 0.
                Ok(self.bindings.get(&name).copied().unwrap_or(0.0))
            }
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(Error::Formula("expected ')'".into())),
                }
            }
            other => Err(Error::Formula(format!("unexpected token {other:?}"))),
        }
    }
}

/// Evaluates a formula body against status and group counts.
///
/// # Errors
///
/// [`Error::Formula`] on any token outside the allowed alphabet, on
/// malformed expressions, and on division by zero.
pub fn evaluate_formula(body: &str, bindings: &BTreeMap<String, f64>) -> Result<f64> {
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(Error::Formula("empty formula".into()));
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        bindings,
    };
    let value = parser.expr()?;

    if parser.pos != tokens.len() {
        return Err(Error::Formula("trailing tokens in formula".into()));
    }
    Ok(value)
}
