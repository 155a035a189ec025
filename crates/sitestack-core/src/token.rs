//! Cross-resource reference tokens.
//!
//! A resource property that depends on another resource's provider-assigned
//! value holds a token string `${LogicalId.Attribute}` in place of the value.
//! Tokens may be embedded in a longer string. They are replaced at apply time
//! once the referenced resource has been provisioned. `${NAME}` without a dot
//! is not a token and is left alone (build commands use shell variables).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, SiteError};

/// Resolved attributes per logical id.
pub type ResolutionContext = BTreeMap<String, BTreeMap<String, String>>;

/// A single `${LogicalId.Attribute}` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    pub logical_id: String,
    pub attribute: String,
}

/// Build a token referencing `attribute` of `logical_id`.
pub fn get_att(logical_id: &str, attribute: &str) -> String {
    format!("${{{}.{}}}", logical_id, attribute)
}

fn parse_token(inner: &str) -> Option<Reference> {
    let (logical_id, attribute) = inner.split_once('.')?;
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid(logical_id) && valid(attribute) {
        Some(Reference {
            logical_id: logical_id.to_string(),
            attribute: attribute.to_string(),
        })
    } else {
        None
    }
}

/// Split a string into literal text and token references.
fn scan(s: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let inner = &rest[start + 2..start + 2 + len];
        match parse_token(inner) {
            Some(reference) => {
                segments.push(Segment::Literal(&rest[..start]));
                segments.push(Segment::Token(reference));
            }
            None => segments.push(Segment::Literal(&rest[..start + 3 + len])),
        }
        rest = &rest[start + 3 + len..];
    }
    segments.push(Segment::Literal(rest));
    segments
}

enum Segment<'a> {
    Literal(&'a str),
    Token(Reference),
}

/// All references in a JSON value, sorted and deduplicated.
pub fn references(value: &Value) -> Vec<Reference> {
    fn walk(value: &Value, out: &mut Vec<Reference>) {
        match value {
            Value::String(s) => out.extend(scan(s).into_iter().filter_map(|seg| match seg {
                Segment::Token(r) => Some(r),
                Segment::Literal(_) => None,
            })),
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out);
    out.sort();
    out.dedup();
    out
}

/// Replace every token in `value` with its resolved attribute.
///
/// `referenced_by` names the resource being resolved, for error reporting.
pub fn resolve(value: &Value, ctx: &ResolutionContext, referenced_by: &str) -> Result<Value> {
    Ok(match value {
        Value::String(s) => {
            let mut out = String::with_capacity(s.len());
            for segment in scan(s) {
                match segment {
                    Segment::Literal(text) => out.push_str(text),
                    Segment::Token(r) => {
                        let resolved = ctx
                            .get(&r.logical_id)
                            .and_then(|attrs| attrs.get(&r.attribute))
                            .ok_or_else(|| SiteError::UnresolvedReference {
                                referenced_by: referenced_by.to_string(),
                                logical_id: r.logical_id.clone(),
                                attribute: r.attribute.clone(),
                            })?;
                        out.push_str(resolved);
                    }
                }
            }
            Value::String(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve(v, ctx, referenced_by))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (key, v) in map {
                resolved.insert(key.clone(), resolve(v, ctx, referenced_by)?);
            }
            Value::Object(resolved)
        }
        other => other.clone(),
    })
}
