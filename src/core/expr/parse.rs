//! Dotted expression syntax
//!
//! Components are separated by `.`; a component starting with `"` is quoted
//! and runs to the matching closing quote, with `""` standing for a literal
//! quote character (the usual CSV quoting rules).

use super::ExprPart;
use crate::error::{GrupinError, Result};

/// Split a dotted string into raw `(text, quoted)` components.
pub(crate) fn split_components(raw: &str) -> Result<Vec<(String, bool)>> {
    let mut components = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        text.push('"');
                    }
                    Some('"') => break,
                    Some(c) => text.push(c),
                    None => {
                        return Err(GrupinError::invalid_expression(
                            raw,
                            "unterminated quoted component",
                        ))
                    }
                }
            }
            components.push((text, true));

            match chars.next() {
                None => break,
                Some('.') => continue,
                Some(c) => {
                    return Err(GrupinError::invalid_expression(
                        raw,
                        format!("unexpected '{}' after closing quote", c),
                    ))
                }
            }
        } else {
            let mut text = String::new();
            let mut more = false;
            for c in chars.by_ref() {
                match c {
                    '.' => {
                        more = true;
                        break;
                    }
                    '"' => {
                        return Err(GrupinError::invalid_expression(
                            raw,
                            "quote inside unquoted component",
                        ))
                    }
                    _ => text.push(c),
                }
            }
            components.push((text, false));
            if !more {
                break;
            }
        }
    }

    Ok(components)
}

/// Parse a dotted string into exactly `arity` validated parts.
pub(crate) fn parse_parts(raw: &str, arity: usize) -> Result<Vec<ExprPart>> {
    let components = split_components(raw)?;
    if components.len() != arity {
        return Err(GrupinError::invalid_expression(
            raw,
            format!("expected {} components, found {}", arity, components.len()),
        ));
    }

    components
        .into_iter()
        .map(|(text, quoted)| {
            let part = if quoted {
                ExprPart::quoted(&text)
            } else {
                ExprPart::unquoted(&text)
            };
            // Report the whole expression, not just the offending component
            part.map_err(|e| match e {
                GrupinError::InvalidExpression { reason, .. } => {
                    GrupinError::invalid_expression(raw, reason)
                }
                other => other,
            })
        })
        .collect()
}
