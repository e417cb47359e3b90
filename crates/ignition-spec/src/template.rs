//! Value templates for init steps and launch environment
//!
//! A template is a plain string with `${secret:NAME}` or `${config:KEY}`
//! references. Substitution happens inside a single argv element, env value
//! or stdin document; the result is never handed to a shell.
//!
//! A reference may carry a filter:
//! - `|sql` escapes the value for use inside a single-quoted SQL literal
//! - `|ident` renders the value as a backtick-quoted SQL identifier
//!
//! `$${` produces a literal `${`.
//!
//! Unfiltered references are substituted byte for byte, so a binary secret
//! can be passed through. The filters need text and reject non-UTF-8 values.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Errors from parsing or rendering a template
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated reference starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("invalid reference '${{{reference}}}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("{source_kind} '{name}' is not available")]
    Unresolved { source_kind: RefSource, name: String },

    #[error("{source_kind} '{name}' is not UTF-8 text and cannot be filtered")]
    NotText { source_kind: RefSource, name: String },
}

/// Where a reference is resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefSource {
    Secret,
    Config,
}

impl fmt::Display for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSource::Secret => f.write_str("secret"),
            RefSource::Config => f.write_str("config"),
        }
    }
}

/// Escaping applied to a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Raw,
    Sql,
    Ident,
}

impl Filter {
    /// Apply the filter; `None` if it needs text and `value` is not UTF-8
    fn apply(self, value: &[u8]) -> Option<Cow<'_, [u8]>> {
        let text = |f: fn(&str) -> String| {
            std::str::from_utf8(value)
                .ok()
                .map(|v| Cow::Owned(f(v).into_bytes()))
        };
        match self {
            Filter::Raw => Some(Cow::Borrowed(value)),
            Filter::Sql => text(escape_sql_literal),
            Filter::Ident => text(quote_sql_ident),
        }
    }
}

/// A single `${...}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: RefSource,
    pub name: String,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Ref(Reference),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;
        let mut offset = 0;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("$${") {
                literal.push_str("${");
                rest = &tail[3..];
                offset += pos + 3;
            } else if let Some(body) = tail.strip_prefix("${") {
                let end = body.find('}').ok_or(TemplateError::Unterminated {
                    offset: offset + pos,
                })?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Ref(parse_reference(&body[..end])?));
                rest = &body[end + 1..];
                offset += pos + 2 + end + 1;
            } else {
                literal.push('$');
                rest = &tail[1..];
                offset += pos + 1;
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// References used by this template, in order of appearance
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(r) => Some(r),
            Segment::Literal(_) => None,
        })
    }

    /// Whether the template contains no references
    pub fn is_literal(&self) -> bool {
        self.references().next().is_none()
    }

    /// Render the template against text values
    pub fn render<'a, F>(&self, lookup: F) -> Result<String, TemplateError>
    where
        F: Fn(RefSource, &str) -> Option<&'a str>,
    {
        let bytes = self.render_bytes(|source, name| lookup(source, name).map(str::as_bytes))?;
        // Literals, values and filter output are all UTF-8 here.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Render the template, resolving each reference through `lookup`
    pub fn render_bytes<'a, F>(&self, lookup: F) -> Result<Vec<u8>, TemplateError>
    where
        F: Fn(RefSource, &str) -> Option<&'a [u8]>,
    {
        let mut out = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.extend_from_slice(text.as_bytes()),
                Segment::Ref(r) => {
                    let value = lookup(r.source, &r.name).ok_or_else(|| {
                        TemplateError::Unresolved {
                            source_kind: r.source,
                            name: r.name.clone(),
                        }
                    })?;
                    let filtered = r.filter.apply(value).ok_or_else(|| TemplateError::NotText {
                        source_kind: r.source,
                        name: r.name.clone(),
                    })?;
                    out.extend_from_slice(&filtered);
                }
            }
        }
        Ok(out)
    }
}

fn parse_reference(body: &str) -> Result<Reference, TemplateError> {
    let invalid = |reason: &str| TemplateError::InvalidReference {
        reference: body.to_string(),
        reason: reason.to_string(),
    };

    let (target, filter) = match body.split_once('|') {
        Some((target, filter)) => (target, Some(filter.trim())),
        None => (body, None),
    };

    let (source, name) = target
        .split_once(':')
        .ok_or_else(|| invalid("expected 'secret:NAME' or 'config:KEY'"))?;

    let source = match source.trim() {
        "secret" => RefSource::Secret,
        "config" => RefSource::Config,
        other => return Err(invalid(&format!("unknown source '{}'", other))),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("empty name"));
    }

    let filter = match filter {
        None => Filter::Raw,
        Some("sql") => Filter::Sql,
        Some("ident") => Filter::Ident,
        Some(other) => return Err(invalid(&format!("unknown filter '{}'", other))),
    };

    Ok(Reference {
        source,
        name: name.to_string(),
        filter,
    })
}

/// Escape a value for use between single quotes in MySQL/MariaDB SQL
pub fn escape_sql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

/// Quote a value as a MySQL/MariaDB identifier
pub fn quote_sql_ident(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(source: RefSource, name: &str) -> Option<&'static str> {
        match (source, name) {
            (RefSource::Config, "MYSQL_DATABASE") => Some("wordpress"),
            (RefSource::Config, "MYSQL_USER") => Some("wp`user"),
            (RefSource::Secret, "db_password") => Some("it's\\secret"),
            _ => None,
        }
    }

    #[test]
    fn test_literal_only() {
        let t = Template::parse("--allow-root").unwrap();
        assert!(t.is_literal());
        assert_eq!(t.render(lookup).unwrap(), "--allow-root");
    }

    #[test]
    fn test_inline_reference() {
        let t = Template::parse("--dbname=${config:MYSQL_DATABASE}").unwrap();
        assert_eq!(t.render(lookup).unwrap(), "--dbname=wordpress");
    }

    #[test]
    fn test_sql_filters() {
        let t = Template::parse(
            "CREATE USER ${config:MYSQL_USER|ident} IDENTIFIED BY '${secret:db_password|sql}';",
        )
        .unwrap();
        assert_eq!(
            t.render(lookup).unwrap(),
            "CREATE USER `wp``user` IDENTIFIED BY 'it''s\\\\secret';"
        );
    }

    #[test]
    fn test_escaped_dollar_brace() {
        let t = Template::parse("cost $5 and $${literal}").unwrap();
        assert!(t.is_literal());
        assert_eq!(t.render(lookup).unwrap(), "cost $5 and ${literal}");
    }

    #[test]
    fn test_unterminated_reference() {
        let err = Template::parse("abc ${config:X").unwrap_err();
        assert_eq!(err, TemplateError::Unterminated { offset: 4 });
    }

    #[test]
    fn test_invalid_references() {
        assert!(Template::parse("${env:HOME}").is_err());
        assert!(Template::parse("${secret:}").is_err());
        assert!(Template::parse("${nocolon}").is_err());
        assert!(Template::parse("${config:X|shell}").is_err());
    }

    #[test]
    fn test_unresolved_reference() {
        let t = Template::parse("${secret:missing}").unwrap();
        let err = t.render(lookup).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Unresolved {
                source_kind: RefSource::Secret,
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_binary_values() {
        let binary = |_: RefSource, _: &str| Some(&[0xff, b'A'][..]);

        let t = Template::parse("--key=${secret:tls_key}").unwrap();
        assert_eq!(t.render_bytes(binary).unwrap(), b"--key=\xffA");

        let t = Template::parse("'${secret:tls_key|sql}'").unwrap();
        assert_eq!(
            t.render_bytes(binary).unwrap_err(),
            TemplateError::NotText {
                source_kind: RefSource::Secret,
                name: "tls_key".to_string()
            }
        );
    }

    #[test]
    fn test_references_in_order() {
        let t = Template::parse("${config:A}-${secret:b|sql}").unwrap();
        let refs: Vec<_> = t.references().collect();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].source, RefSource::Config);
        assert_eq!(refs[1].filter, Filter::Sql);
    }
}
