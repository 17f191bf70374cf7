//! JSON path segments used by field-select expressions.

use crate::core::error::BuildError;
use crate::core::workflow_builder::value_type::ValueType;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    #[error("path is empty")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedCharacter { found: char, offset: usize },
    #[error("unterminated bracket starting at offset {0}")]
    UnterminatedBracket(usize),
    #[error("invalid array index '{0}'")]
    InvalidIndex(String),
    #[error("empty field name at offset {0}")]
    EmptyField(usize),
}

impl From<PathParseError> for BuildError {
    fn from(err: PathParseError) -> Self {
        BuildError::type_error("WFB-TYPE-005", format!("malformed path: {}", err))
    }
}

/// A parsed path such as `spec.replicas`, `items[0].name` or `labels['app.kubernetes.io/name']`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// Statically walk `root` along the path, returning the type found at the end.
    pub fn resolve_type(&self, root: &ValueType) -> Result<ValueType, BuildError> {
        let mut current = root.clone();
        for (position, segment) in self.segments.iter().enumerate() {
            current = match (&current, segment) {
                (ValueType::Any, _) => return Ok(ValueType::Any),
                (ValueType::Record(fields), PathSegment::Field(name)) => {
                    match fields.get(name) {
                        Some(ty) => ty.clone(),
                        None => {
                            return Err(BuildError::type_error(
                                "WFB-TYPE-002",
                                format!(
                                    "unknown path segment '{}' at {}; available fields: [{}]",
                                    name,
                                    self.prefix(position),
                                    fields.keys().cloned().collect::<Vec<_>>().join(", ")
                                ),
                            ))
                        }
                    }
                }
                (ValueType::Array(element), PathSegment::Index(_)) => (**element).clone(),
                (other, segment) => {
                    return Err(BuildError::type_error(
                        "WFB-TYPE-002",
                        format!(
                            "cannot apply segment '{}' to a value of type {} at {}",
                            segment,
                            other,
                            self.prefix(position)
                        ),
                    ))
                }
            };
        }
        Ok(current)
    }

    /// Walk a concrete JSON value along the path.
    pub fn select<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match segment {
                PathSegment::Field(name) => current.as_object()?.get(name)?,
                PathSegment::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current)
    }

    /// Render as a JSONPath query rooted at `$`, escaping fields that are not plain identifiers.
    pub fn to_jsonpath(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) if is_plain_identifier(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                PathSegment::Field(name) => {
                    out.push_str("['");
                    out.push_str(&escape_quoted(name));
                    out.push_str("']");
                }
                PathSegment::Index(index) => {
                    out.push_str(&format!("[{}]", index));
                }
            }
        }
        out
    }

    fn prefix(&self, len: usize) -> String {
        JsonPath::new(self.segments[..len].to_vec()).to_jsonpath()
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_jsonpath())
    }
}

impl FromStr for JsonPath {
    type Err = PathParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.strip_prefix('$').unwrap_or(input);
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Err(PathParseError::Empty);
        }
        let mut segments = Vec::new();
        let mut pos = 0;
        if chars[0] == '.' {
            pos = 1;
        }
        let mut expect_field = chars.first() != Some(&'[');
        while pos < chars.len() {
            match chars[pos] {
                '[' => {
                    let start = pos;
                    pos += 1;
                    if pos < chars.len() && (chars[pos] == '\'' || chars[pos] == '"') {
                        let quote = chars[pos];
                        pos += 1;
                        let mut name = String::new();
                        loop {
                            match chars.get(pos) {
                                None => return Err(PathParseError::UnterminatedBracket(start)),
                                Some('\\') => {
                                    if let Some(next) = chars.get(pos + 1) {
                                        name.push(*next);
                                    }
                                    pos += 2;
                                }
                                Some(c) if *c == quote => {
                                    pos += 1;
                                    break;
                                }
                                Some(c) => {
                                    name.push(*c);
                                    pos += 1;
                                }
                            }
                        }
                        if chars.get(pos) != Some(&']') {
                            return Err(PathParseError::UnterminatedBracket(start));
                        }
                        pos += 1;
                        segments.push(PathSegment::Field(name));
                    } else {
                        let close = chars[pos..]
                            .iter()
                            .position(|c| *c == ']')
                            .ok_or(PathParseError::UnterminatedBracket(start))?;
                        let raw: String = chars[pos..pos + close].iter().collect();
                        let index = raw
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| PathParseError::InvalidIndex(raw.clone()))?;
                        segments.push(PathSegment::Index(index));
                        pos += close + 1;
                    }
                    expect_field = false;
                }
                '.' if expect_field => return Err(PathParseError::EmptyField(pos)),
                '.' => {
                    pos += 1;
                    expect_field = true;
                }
                _ if expect_field => {
                    let start = pos;
                    while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(PathParseError::EmptyField(start));
                    }
                    segments.push(PathSegment::Field(chars[start..pos].iter().collect()));
                    expect_field = false;
                }
                other => {
                    return Err(PathParseError::UnexpectedCharacter {
                        found: other,
                        offset: pos,
                    })
                }
            }
        }
        if expect_field {
            return Err(PathParseError::EmptyField(chars.len()));
        }
        Ok(JsonPath::new(segments))
    }
}

pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
