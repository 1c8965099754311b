//! Precedence normalization by token-stream rewriting.
//!
//! The raw token list carries no precedence. Three sweeps run from the tightest tier to
//! the loosest, and each one brackets every `left op right` span of its tier that is not
//! already bracketed. Once a tier is done its subexpressions are atomic groups, so the
//! looser tiers bind around them correctly and chains of one tier bind left to right.

use super::lexer::{Operator, Token};
use crate::errors::ProtocolError;

const TIERS: [&[Operator]; 3] = [
    &[Operator::Pow],
    &[Operator::Mul, Operator::Div],
    &[Operator::Add, Operator::Sub],
];

pub fn normalize(tokens: &mut Vec<Token>) -> Result<(), ProtocolError> {
    check_balanced(tokens)?;
    for tier in TIERS {
        bracket_tier(tokens, tier)?;
    }
    Ok(())
}

fn check_balanced(tokens: &[Token]) -> Result<(), ProtocolError> {
    let mut depth: usize = 0;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(ProtocolError::malformed_expression)?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ProtocolError::malformed_expression())
    }
}

fn bracket_tier(tokens: &mut Vec<Token>, tier: &[Operator]) -> Result<(), ProtocolError> {
    let mut index = 0;
    while index < tokens.len() {
        let in_tier = matches!(&tokens[index], Token::Operator(op) if tier.contains(op));
        if !in_tier {
            index += 1;
            continue;
        }

        let (start, end) = operand_span(tokens, index)?;
        if is_bracketed(tokens, start, end) {
            index += 1;
        } else {
            tokens.insert(end + 1, Token::RParen);
            tokens.insert(start, Token::LParen);
            // the operator moved one slot right
            index += 2;
        }
    }
    Ok(())
}

/// Inclusive bounds of `left op right` around the operator at `index`.
fn operand_span(tokens: &[Token], index: usize) -> Result<(usize, usize), ProtocolError> {
    let start = match index.checked_sub(1).map(|i| (i, &tokens[i])) {
        Some((i, token)) if token.is_operand() => i,
        Some((i, Token::RParen)) => matching_open(tokens, i)?,
        _ => return Err(ProtocolError::malformed_expression()),
    };

    let end = match tokens.get(index + 1) {
        Some(token) if token.is_operand() => index + 1,
        Some(Token::LParen) => matching_close(tokens, index + 1)?,
        _ => return Err(ProtocolError::malformed_expression()),
    };

    Ok((start, end))
}

fn matching_close(tokens: &[Token], open: usize) -> Result<usize, ProtocolError> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(ProtocolError::malformed_expression())
}

fn matching_open(tokens: &[Token], close: usize) -> Result<usize, ProtocolError> {
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match tokens[i] {
            Token::RParen => depth += 1,
            Token::LParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(ProtocolError::malformed_expression())
}

fn is_bracketed(tokens: &[Token], start: usize, end: usize) -> bool {
    start > 0
        && matches!(tokens.get(start - 1), Some(Token::LParen))
        && matches!(tokens.get(end + 1), Some(Token::RParen))
}
