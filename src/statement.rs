//! Placeholder compilation for parameterized queries.
//!
//! A template such as `SELECT * FROM t WHERE id = :id AND name = ?` is split
//! once into literal segments and placeholder tokens. Rendering then only
//! concatenates segments with escaped argument values.
//!
//! Placeholders inside quoted string literals are left alone. The scanner
//! understands backslash escapes (`'it\'s'`) and doubled quotes (`'it''s'`).

use memchr::memchr2;

use crate::escape::escape_into;
use crate::value::{Params, Value};

/// A placeholder position in a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `?`, numbered in order of appearance among `?` placeholders
    Positional(usize),
    /// `:name` or `:0`
    Named(String),
}

/// A template split into literal segments and placeholder tokens.
///
/// Invariant: `parts.len()` is `tokens.len()` or `tokens.len() + 1`. Segment
/// `i` precedes token `i`; an extra segment is the trailing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    template: String,
    parts: Vec<String>,
    tokens: Vec<Token>,
}

impl CompiledQuery {
    fn constant(template: &str) -> Self {
        Self {
            template: template.to_string(),
            parts: vec![template.to_string()],
            tokens: Vec::new(),
        }
    }

    /// The original template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Literal segments between placeholders.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Placeholder tokens in order of appearance.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Returns true if the template has no placeholders.
    pub fn is_constant(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Render with the built-in MySQL string escape.
    pub fn render(&self, params: &Params) -> String {
        self.render_with(params, |text, out| escape_into(out, text))
    }

    /// Render with a caller-provided escape function.
    ///
    /// `escape(text, out)` must append the escaped form of `text` to `out`
    /// without surrounding quotes.
    pub fn render_with<F>(&self, params: &Params, escape: F) -> String
    where
        F: Fn(&str, &mut String),
    {
        if self.tokens.is_empty() {
            return self.template.clone();
        }

        let mut out = String::with_capacity(self.template.len() + self.tokens.len() * 8);
        for (part, token) in self.parts.iter().zip(&self.tokens) {
            out.push_str(part);
            let value = match token {
                Token::Positional(idx) => params.get_index(*idx),
                Token::Named(name) => params.get_named(name),
            };
            format_value(&mut out, value, &escape);
        }
        if let Some(tail) = self.parts.get(self.tokens.len()) {
            out.push_str(tail);
        }
        out
    }
}

/// Split `template` into literal segments and placeholder tokens.
pub fn compile(template: &str) -> CompiledQuery {
    let bytes = template.as_bytes();
    if memchr2(b'?', b':', bytes).is_none() {
        return CompiledQuery::constant(template);
    }

    let mut parts = Vec::new();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut next_positional = 0;
    let mut in_quote = false;
    let mut quote = 0u8;
    let mut escaped = false;
    let mut i = 0;

    // Only ASCII bytes are inspected, so every slice boundary below is a char boundary.
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            escaped = !escaped;
            i += 1;
            continue;
        }
        let was_escaped = core::mem::take(&mut escaped);

        if in_quote {
            if b == quote && !was_escaped {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                in_quote = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' if !was_escaped => {
                in_quote = true;
                quote = b;
                i += 1;
            }
            b'?' => {
                parts.push(template[start..i].to_string());
                tokens.push(Token::Positional(next_positional));
                next_positional += 1;
                i += 1;
                start = i;
            }
            b':' => match named_token_len(&bytes[i + 1..]) {
                Some(len) => {
                    parts.push(template[start..i].to_string());
                    tokens.push(Token::Named(template[i + 1..i + 1 + len].to_string()));
                    i += 1 + len;
                    start = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    if tokens.is_empty() {
        return CompiledQuery::constant(template);
    }
    if start < bytes.len() {
        parts.push(template[start..].to_string());
    }

    CompiledQuery {
        template: template.to_string(),
        parts,
        tokens,
    }
}

/// Length of a `:name` / `:digits` token body, if `rest` starts with one.
fn named_token_len(rest: &[u8]) -> Option<usize> {
    let first = *rest.first()?;
    let len = if first.is_ascii_digit() {
        rest.iter().take_while(|b| b.is_ascii_digit()).count()
    } else if first.is_ascii_alphabetic() {
        rest.iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count()
    } else {
        return None;
    };
    Some(len)
}

fn format_value<F>(out: &mut String, value: Option<&Value>, escape: &F)
where
    F: Fn(&str, &mut String),
{
    match value {
        None | Some(Value::Null) => out.push_str("NULL"),
        Some(Value::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                format_value(out, Some(item), escape);
            }
        }
        Some(Value::Bytes(bytes)) => match simdutf8::basic::from_utf8(bytes) {
            Ok(text) => push_quoted(out, text, escape),
            Err(_) => push_quoted(out, &String::from_utf8_lossy(bytes), escape),
        },
        Some(Value::Text(text)) => push_quoted(out, text, escape),
        Some(Value::Bool(flag)) => push_quoted(out, if *flag { "1" } else { "0" }, escape),
        Some(Value::Int(n)) => push_quoted(out, &n.to_string(), escape),
        Some(Value::UInt(n)) => push_quoted(out, &n.to_string(), escape),
        Some(Value::Float(n)) => push_quoted(out, &n.to_string(), escape),
    }
}

fn push_quoted<F>(out: &mut String, text: &str, escape: &F)
where
    F: Fn(&str, &mut String),
{
    out.push('\'');
    escape(text, out);
    out.push('\'');
}
