//! Postal addresses and the routing-export address template.
//!
//! The routing system receives each contact's address as one flat string.
//! The shape of that string is a per-deployment template with named
//! `{field}` placeholders; formatting never fails, unset fields render as
//! empty strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shipadvice_core::ValueObject;

/// Template used when the deployment does not configure one.
pub const DEFAULT_ROUTING_ADDRESS_FORMAT: &str =
    "{street} {street2}, {zip} {city}, {state_code}, {country_name}";

/// Placeholders a template may reference. Anything else renders empty.
pub const ADDRESS_FIELDS: &[&str] = &[
    "name",
    "street",
    "street2",
    "zip",
    "city",
    "state_code",
    "state_name",
    "country_code",
    "country_name",
];

/// Federal state / province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
}

/// Postal address of a contact. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub street2: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub state: Option<State>,
    pub country: Option<Country>,
}

impl ValueObject for Address {}

impl Address {
    /// Value of a template field; `None` when unset or unknown.
    pub fn field(&self, field: &str) -> Option<&str> {
        match field {
            "street" => self.street.as_deref(),
            "street2" => self.street2.as_deref(),
            "zip" => self.zip.as_deref(),
            "city" => self.city.as_deref(),
            "state_code" => self.state.as_ref().map(|s| s.code.as_str()),
            "state_name" => self.state.as_ref().map(|s| s.name.as_str()),
            "country_code" => self.country.as_ref().map(|c| c.code.as_str()),
            "country_name" => self.country.as_ref().map(|c| c.name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),
    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
    #[error("invalid placeholder name '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parsed address template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl Default for AddressTemplate {
    fn default() -> Self {
        // The built-in format is well-formed; parse it by hand-built segments
        // to keep `default()` infallible.
        Self {
            source: DEFAULT_ROUTING_ADDRESS_FORMAT.to_string(),
            segments: vec![
                Segment::Field("street".into()),
                Segment::Literal(" ".into()),
                Segment::Field("street2".into()),
                Segment::Literal(", ".into()),
                Segment::Field("zip".into()),
                Segment::Literal(" ".into()),
                Segment::Field("city".into()),
                Segment::Literal(", ".into()),
                Segment::Field("state_code".into()),
                Segment::Literal(", ".into()),
                Segment::Field("country_name".into()),
            ],
        }
    }
}

impl AddressTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(pos));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(pos));
                    }
                    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(TemplateError::InvalidName(name.to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders that are not in [`ADDRESS_FIELDS`]; they will always render empty.
    pub fn unknown_fields(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field(name) if !ADDRESS_FIELDS.contains(&name.as_str()) => {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Substitute fields resolved by `lookup`; unresolved fields become "".
    pub fn render<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(lookup(name).unwrap_or("")),
            }
        }
        out
    }
}

impl core::str::FromStr for AddressTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
