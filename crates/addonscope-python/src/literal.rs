//! Evaluation of literal expressions (strings, numbers, containers) into JSON
//! values without executing anything.

use serde_json::{Map, Number, Value};
use tree_sitter::Node;

use crate::node_text;

#[derive(Debug, thiserror::Error)]
pub enum LiteralError {
    #[error("`{kind}` is not a literal (line {line})")]
    Unsupported { kind: String, line: usize },
    #[error("formatted string is not a literal (line {line})")]
    Interpolation { line: usize },
    #[error("invalid number `{text}`")]
    Number { text: String },
    #[error("empty module")]
    Empty,
    #[error("unexpected statement after the literal (line {line})")]
    Trailing { line: usize },
}

fn unsupported(node: Node) -> LiteralError {
    LiteralError::Unsupported {
        kind: node.kind().to_string(),
        line: node.start_position().row + 1,
    }
}

/// The value of a module consisting of exactly one expression statement.
pub fn evaluate_module(root: Node, source: &[u8]) -> Result<Value, LiteralError> {
    let mut cursor = root.walk();
    let mut statements = root.named_children(&mut cursor).filter(|n| n.kind() != "comment");
    let statement = statements.next().ok_or(LiteralError::Empty)?;
    if let Some(extra) = statements.next() {
        return Err(LiteralError::Trailing {
            line: extra.start_position().row + 1,
        });
    }
    if statement.kind() != "expression_statement" {
        return Err(unsupported(statement));
    }
    let expression = statement.named_child(0).ok_or(LiteralError::Empty)?;
    evaluate(expression, source)
}

/// Evaluate a literal expression node.
pub fn evaluate(node: Node, source: &[u8]) -> Result<Value, LiteralError> {
    match node.kind() {
        "dictionary" => {
            let mut map = Map::new();
            let mut cursor = node.walk();
            for pair in node.named_children(&mut cursor) {
                match pair.kind() {
                    "comment" => continue,
                    "pair" => {}
                    _ => return Err(unsupported(pair)),
                }
                let key = pair.child_by_field_name("key").ok_or_else(|| unsupported(pair))?;
                let value = pair
                    .child_by_field_name("value")
                    .ok_or_else(|| unsupported(pair))?;
                let key = match evaluate(key, source)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, evaluate(value, source)?);
            }
            Ok(Value::Object(map))
        }
        "list" | "tuple" | "set" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .filter(|n| n.kind() != "comment")
                .map(|n| evaluate(n, source))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "string" => string_value(node, source).map(Value::String),
        "concatenated_string" => {
            let mut out = String::new();
            let mut cursor = node.walk();
            for part in node.named_children(&mut cursor) {
                if part.kind() == "string" {
                    out.push_str(&string_value(part, source)?);
                }
            }
            Ok(Value::String(out))
        }
        "integer" => parse_integer(node_text(node, source)),
        "float" => parse_float(node_text(node, source)),
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "none" => Ok(Value::Null),
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find(|n| n.kind() != "comment")
                .ok_or_else(|| unsupported(node))?;
            evaluate(inner, source)
        }
        "unary_operator" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|op| node_text(op, source))
                .unwrap_or("");
            let argument = node
                .child_by_field_name("argument")
                .ok_or_else(|| unsupported(node))?;
            match (operator, evaluate(argument, source)?) {
                ("+", value @ Value::Number(_)) => Ok(value),
                ("-", Value::Number(n)) => negate(&n),
                _ => Err(unsupported(node)),
            }
        }
        _ => Err(unsupported(node)),
    }
}

fn negate(n: &Number) -> Result<Value, LiteralError> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::from(-i));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or_else(|| LiteralError::Number {
            text: n.to_string(),
        })
}

fn parse_integer(text: &str) -> Result<Value, LiteralError> {
    let clean: String = text
        .trim_end_matches(['l', 'L'])
        .chars()
        .filter(|c| *c != '_')
        .collect();
    let lower = clean.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };
    parsed.map(Value::from).or_else(|_| {
        clean
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::Number {
                text: text.to_string(),
            })
    })
}

fn parse_float(text: &str) -> Result<Value, LiteralError> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    clean
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| LiteralError::Number {
            text: text.to_string(),
        })
}

/// Decoded content of a single string node.
pub fn string_value(node: Node, source: &[u8]) -> Result<String, LiteralError> {
    let mut out = String::new();
    let mut raw = false;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "string_start" => {
                raw = node_text(child, source)
                    .chars()
                    .take_while(|c| *c != '"' && *c != '\'')
                    .any(|c| c == 'r' || c == 'R');
            }
            "string_content" if raw => out.push_str(node_text(child, source)),
            "string_content" => push_content(child, source, &mut out),
            "escape_sequence" => out.push_str(&unescape(node_text(child, source))),
            "interpolation" => {
                return Err(LiteralError::Interpolation {
                    line: child.start_position().row + 1,
                })
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Append string content, decoding the escape sequences nested in it.
fn push_content(content: Node, source: &[u8], out: &mut String) {
    let mut pos = content.start_byte();
    let mut cursor = content.walk();
    for child in content.named_children(&mut cursor) {
        let decoded = match child.kind() {
            "escape_sequence" => unescape(node_text(child, source)),
            "escape_interpolation" => node_text(child, source).chars().take(1).collect(),
            _ => continue,
        };
        out.push_str(&String::from_utf8_lossy(&source[pos..child.start_byte()]));
        out.push_str(&decoded);
        pos = child.end_byte();
    }
    out.push_str(&String::from_utf8_lossy(&source[pos..content.end_byte()]));
}

fn unescape(escape: &str) -> String {
    let body = escape.strip_prefix('\\').unwrap_or(escape);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return escape.to_string();
    };
    let rest: String = chars.collect();

    let simple = match first {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' if rest.is_empty() => Some('\0'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(c) = simple {
        return c.to_string();
    }

    let code = match first {
        '\n' => return String::new(),
        'x' | 'u' | 'U' => u32::from_str_radix(&rest, 16).ok(),
        '0'..='7' => u32::from_str_radix(body, 8).ok(),
        _ => None,
    };
    code.and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| escape.to_string())
}
