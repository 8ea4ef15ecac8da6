//! Instruction templates with `{key}` placeholders.
//!
//! `{key}` requires the key to be present in state, `{key?}` renders as an
//! empty string when it is absent. Braces around anything that is not an
//! identifier (JSON snippets, code) are kept verbatim.

use crate::state::{is_identifier, SharedState, StateKey};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { key: StateKey, optional: bool },
}

/// A parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instruction {
    source: String,
    segments: Vec<Segment>,
}

/// A required placeholder had no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state key '{0}' is not set")]
pub struct MissingKey(pub StateKey);

impl Instruction {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source.as_str();

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let placeholder = after.find('}').and_then(|close| {
                let inner = &after[..close];
                let (name, optional) = match inner.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                is_identifier(name).then(|| (name.to_string(), optional, close))
            });

            match placeholder {
                Some((name, optional, close)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder {
                        key: StateKey::new(name),
                        optional,
                    });
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Keys that must be in state for [`render`](Self::render) to succeed.
    pub fn required_keys(&self) -> Vec<&StateKey> {
        let mut keys: Vec<&StateKey> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder {
                key,
                optional: false,
            } = segment
            {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn render(&self, state: &SharedState) -> Result<String, MissingKey> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { key, optional } => match state.get(key.as_str()) {
                    Some(value) => out.push_str(value),
                    None if *optional => {}
                    None => return Err(MissingKey(key.clone())),
                },
            }
        }
        Ok(out)
    }
}

impl From<&str> for Instruction {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Instruction {
    fn from(s: String) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &str)]) -> SharedState {
        let mut s = SharedState::new();
        for (k, v) in pairs {
            s.insert(StateKey::from(*k), *v, "test");
        }
        s
    }

    #[test]
    fn test_render_substitutes_keys() {
        let ins = Instruction::parse("Using this outline: {blog_outline}\nWrite a post.");
        let out = ins
            .render(&state(&[("blog_outline", "1. Intro")]))
            .unwrap();
        assert_eq!(out, "Using this outline: 1. Intro\nWrite a post.");
    }

    #[test]
    fn test_missing_required_key() {
        let ins = Instruction::parse("Polish: {blog_draft}");
        let err = ins.render(&SharedState::new()).unwrap_err();
        assert_eq!(err.0.as_str(), "blog_draft");
    }

    #[test]
    fn test_optional_key_renders_empty() {
        let ins = Instruction::parse("Notes: [{notes?}]");
        assert_eq!(ins.render(&SharedState::new()).unwrap(), "Notes: []");
        assert!(ins.required_keys().is_empty());
    }

    #[test]
    fn test_non_identifier_braces_are_literal() {
        let ins = Instruction::parse(r#"Return {"status": "ok"} or {}. Also { spaced }"#);
        assert!(ins.required_keys().is_empty());
        assert_eq!(
            ins.render(&SharedState::new()).unwrap(),
            r#"Return {"status": "ok"} or {}. Also { spaced }"#
        );
    }

    #[test]
    fn test_required_keys_in_order_without_duplicates() {
        let ins = Instruction::parse("{tech_research} {health_research} {tech_research} {x?}");
        let keys: Vec<&str> = ins.required_keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["tech_research", "health_research"]);
    }

    #[test]
    fn test_unclosed_brace() {
        let ins = Instruction::parse("dangling {brace");
        assert_eq!(ins.render(&SharedState::new()).unwrap(), "dangling {brace");
    }
}
