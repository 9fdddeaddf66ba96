//! HCL subset parser for Terraform variable files
//!
//! Understands blocks, attributes, quoted strings (interpolations kept
//! verbatim), heredocs, object and tuple literals, numbers and booleans.
//! Anything else (references, function calls, `for` expressions) is kept as a
//! raw `Value::Expr`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
    Expr(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Object member lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// String member of an object, empty when absent
    pub fn get_str(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub attributes: Vec<(String, Value)>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
}

/// `variable "name" { ... }` のうち必要な属性だけ
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub description: Option<String>,
    pub default: Option<Value>,
}

pub fn parse(src: &str) -> Result<Body> {
    Parser {
        chars: src.chars().collect(),
        pos: 0,
    }
    .body(false)
}

pub fn variables(body: &Body) -> Vec<Variable> {
    body.blocks_of("variable")
        .filter_map(|block| {
            let name = block.labels.first()?.clone();
            let description = block.body.attr("description").and_then(|v| match v {
                Value::String(s) | Value::Expr(s) => Some(s.clone()),
                _ => None,
            });
            Some(Variable {
                name,
                description,
                default: block.body.attr("default").cloned(),
            })
        })
        .collect()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error<T>(&self, msg: &str) -> Result<T> {
        let end = self.pos.min(self.chars.len());
        let line = self.chars[..end].iter().filter(|c| **c == '\n').count() + 1;
        Err(Error::Parse(format!("line {}: {}", line, msg)))
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Spaces and comments; newlines too when `newlines`
    fn skip_trivia(&mut self, newlines: bool) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => self.pos += 1,
                Some('\n') if newlines => self.pos += 1,
                Some('#') => self.skip_line(),
                Some('/') if self.peek_at(1) == Some('/') => self.skip_line(),
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek() == Some('/') {
                            self.pos += 1;
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn body(&mut self, nested: bool) -> Result<Body> {
        let mut body = Body::default();
        loop {
            self.skip_trivia(true);
            match self.peek() {
                None if nested => return self.error("unexpected end of input, expected '}'"),
                None => return Ok(body),
                Some('}') if nested => {
                    self.pos += 1;
                    return Ok(body);
                }
                _ => {}
            }

            let Some(name) = self.ident() else {
                let c = self.peek().unwrap_or(' ');
                return self.error(&format!("unexpected character '{}'", c));
            };
            self.skip_trivia(false);

            if self.peek() == Some('=') && self.peek_at(1) != Some('=') {
                self.pos += 1;
                let value = self.value()?;
                body.attributes.push((name, value));
                continue;
            }

            let mut labels = Vec::new();
            loop {
                self.skip_trivia(false);
                match self.peek() {
                    Some('"') => labels.push(self.string()?),
                    Some('{') => {
                        self.pos += 1;
                        break;
                    }
                    _ => match self.ident() {
                        Some(label) => labels.push(label),
                        None => return self.error(&format!("expected block body for '{}'", name)),
                    },
                }
            }
            let inner = self.body(true)?;
            body.blocks.push(Block {
                kind: name,
                labels,
                body: inner,
            });
        }
    }

    fn at_value_end(&self) -> bool {
        matches!(self.peek(), None | Some('\n' | ',' | '}' | ']' | ')'))
    }

    /// Literal when possible; falls back to the raw expression text
    fn value(&mut self) -> Result<Value> {
        self.skip_trivia(false);
        let start = self.pos;
        let parsed = match self.peek() {
            None => return self.error("expected a value"),
            Some('"') => self.string().map(Value::String),
            Some('<') if self.peek_at(1) == Some('<') => self.heredoc().map(Value::String),
            Some('{') => self.object(),
            Some('[') => self.list(),
            Some(c) if c.is_ascii_digit() || c == '-' => self.number(),
            Some(_) => match self.ident().as_deref() {
                Some("true") => Ok(Value::Bool(true)),
                Some("false") => Ok(Value::Bool(false)),
                Some("null") => Ok(Value::Null),
                _ => self.error("not a literal"),
            },
        };

        if let Ok(value) = parsed {
            self.skip_trivia(false);
            if self.at_value_end() {
                return Ok(value);
            }
        }
        self.pos = start;
        self.raw_expr()
    }

    fn raw_expr(&mut self) -> Result<Value> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '"' => {
                    self.string()?;
                    continue;
                }
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' if depth == 0 => break,
                ')' | ']' | '}' => depth -= 1,
                ',' | '\n' | '#' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let text = text.trim();
        if text.is_empty() {
            return self.error("expected a value");
        }
        Ok(Value::Expr(text.to_string()))
    }

    fn string(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return self.error("unterminated string"),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return self.error("unterminated string"),
                },
                // ${...} / %{...} are copied verbatim
                Some(c @ ('$' | '%')) if self.peek() == Some('{') => {
                    out.push(c);
                    let mut depth = 0usize;
                    while let Some(c) = self.bump() {
                        out.push(c);
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth = depth.saturating_sub(1);
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn heredoc(&mut self) -> Result<String> {
        self.pos += 2;
        let indented = self.peek() == Some('-');
        if indented {
            self.pos += 1;
        }
        let Some(marker) = self.ident() else {
            return self.error("expected heredoc marker");
        };
        self.skip_line();
        self.pos += 1;

        let mut lines: Vec<String> = Vec::new();
        loop {
            if self.peek().is_none() {
                return self.error(&format!("unterminated heredoc, expected {}", marker));
            }
            let start = self.pos;
            self.skip_line();
            let line: String = self.chars[start..self.pos].iter().collect();
            if line.trim() == marker {
                break;
            }
            self.pos += 1;
            lines.push(line);
        }

        if indented {
            let indent = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
                .min()
                .unwrap_or(0);
            lines = lines.into_iter().map(|l| l.chars().skip(indent).collect()).collect();
        }
        let mut text = lines.join("\n");
        text.push('\n');
        Ok(text)
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse() {
            Ok(n) => Ok(Value::Number(n)),
            Err(_) => self.error(&format!("invalid number '{}'", text)),
        }
    }

    fn object(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_trivia(true);
            let key = match self.peek() {
                None => return self.error("unterminated object"),
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(entries));
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                Some('"') => self.string()?,
                Some(_) => match self.ident() {
                    Some(key) => key,
                    None => return self.error("expected object key"),
                },
            };
            self.skip_trivia(false);
            match self.peek() {
                Some('=' | ':') => self.pos += 1,
                _ => return self.error("expected '=' or ':' after object key"),
            }
            let value = self.value()?;
            entries.push((key, value));
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia(true);
            match self.peek() {
                None => return self.error("unterminated list"),
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(',') => self.pos += 1,
                Some(_) => items.push(self.value()?),
            }
        }
    }
}
