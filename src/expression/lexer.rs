//! Single-pass tokenizer for arithmetic expressions.
//!
//! Operator glyphs and parentheses are emitted on their own; every other run of
//! characters is coalesced into one literal and then classified as a number or a
//! variable reference.

use std::fmt;

use crate::errors::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            '^' => Some(Self::Pow),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Pow => '^',
        }
    }

    /// Applies the operator. Infinite results are folded into NaN so callers only have
    /// to filter one kind of non-finite value.
    pub fn apply(self, left: f64, right: f64) -> f64 {
        let result = match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
            Self::Pow => left.powf(right),
        };
        if result.is_infinite() {
            f64::NAN
        } else {
            result
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Variable(String),
    Operator(Operator),
    LParen,
    RParen,
}

impl Token {
    /// Numbers and variables: the tokens that can stand alone as an operand.
    pub fn is_operand(&self) -> bool {
        matches!(self, Token::Number(_) | Token::Variable(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "{}", value),
            Token::Variable(name) => write!(f, "{}", name),
            Token::Operator(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// Splits an expression (already stripped of whitespace) into tokens.
pub fn tokenize(expression: &str) -> Result<Vec<Token>, ProtocolError> {
    let mut tokens = Vec::new();
    let mut literal_start: Option<usize> = None;

    for (index, c) in expression.char_indices() {
        let standalone = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => Operator::from_char(c).map(Token::Operator),
        };

        match standalone {
            Some(token) => {
                if let Some(start) = literal_start.take() {
                    tokens.push(classify(&expression[start..index])?);
                }
                tokens.push(token);
            }
            None => {
                if literal_start.is_none() {
                    literal_start = Some(index);
                }
            }
        }
    }

    if let Some(start) = literal_start {
        tokens.push(classify(&expression[start..])?);
    }

    Ok(tokens)
}

fn classify(literal: &str) -> Result<Token, ProtocolError> {
    if is_number_literal(literal) {
        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ProtocolError::malformed_expression())
    } else if is_identifier(literal) {
        Ok(Token::Variable(literal.to_string()))
    } else {
        Err(ProtocolError::malformed_expression())
    }
}

/// `[0-9]+(\.[0-9]+)?`
pub fn is_number_literal(literal: &str) -> bool {
    let (integer, fraction) = match literal.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (literal, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    all_digits(integer) && fraction.map_or(true, all_digits)
}

/// `[a-z][a-z0-9]*`, shared by domain names and variable references.
pub fn is_identifier(literal: &str) -> bool {
    let mut bytes = literal.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() => {
            bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_operators_and_parentheses() {
        let tokens = tokenize("(x1+2.5)*y^3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Variable("x1".into()),
                Token::Operator(Operator::Add),
                Token::Number(2.5),
                Token::RParen,
                Token::Operator(Operator::Mul),
                Token::Variable("y".into()),
                Token::Operator(Operator::Pow),
                Token::Number(3.0),
            ]
        );
    }

    #[test]
    fn single_letter_variables_are_accepted() {
        assert_eq!(tokenize("x").unwrap(), vec![Token::Variable("x".into())]);
    }

    #[test]
    fn rejects_malformed_literals() {
        for bad in ["2x", "1.", ".5", "1.2.3", "X1", "x_1"] {
            assert!(tokenize(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn number_literal_grammar() {
        assert!(is_number_literal("0"));
        assert!(is_number_literal("12.75"));
        assert!(!is_number_literal(""));
        assert!(!is_number_literal("-1"));
        assert!(!is_number_literal("1e5"));
    }

    #[test]
    fn identifier_grammar() {
        assert!(is_identifier("x"));
        assert!(is_identifier("abc12"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("aB"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn infinite_results_become_nan() {
        assert!(Operator::Div.apply(1.0, 0.0).is_nan());
        assert!(Operator::Pow.apply(10.0, 400.0).is_nan());
        assert!(Operator::Div.apply(0.0, 0.0).is_nan());
        assert_eq!(Operator::Sub.apply(1.0, 3.0), -2.0);
    }
}
