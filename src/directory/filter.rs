//! Nom Parser for Directory Search Filters
//!
//! Parses the usual parenthesised filter language:
//! `(&(objectClass=inetOrgPerson)(|(uid=a*)(!(mail=*))))`.
//! Values may contain `\XX` hex escapes; matching is case-insensitive.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{delimited, preceded, separated_pair},
};
use std::fmt;

use crate::directory::{Entry, escape_filter_value};

/// A parsed search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `(attr=*)`
    Present(String),
    /// `(attr=value)`
    Equal(String, String),
    /// `(attr=pre*mid*post)`, split at the wildcards
    Substring(String, Vec<String>),
}

/// Deepest parenthesis nesting accepted by [`Filter::parse`]
pub const MAX_FILTER_DEPTH: usize = 64;

/// Filter parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid filter '{0}'")]
pub struct FilterError(pub String);

impl Filter {
    /// Parses a filter string. Surrounding whitespace is ignored; nesting
    /// deeper than [`MAX_FILTER_DEPTH`] is rejected before parsing.
    pub fn parse(input: &str) -> Result<Filter, FilterError> {
        let trimmed = input.trim();
        if nesting_depth(trimmed) > MAX_FILTER_DEPTH {
            return Err(FilterError(format!(
                "{}... nested deeper than {}",
                trimmed.chars().take(32).collect::<String>(),
                MAX_FILTER_DEPTH
            )));
        }
        all_consuming(filter)(trimmed)
            .map(|(_, parsed)| parsed)
            .map_err(|_| FilterError(trimmed.to_string()))
    }

    /// Matches every entry
    pub fn everything() -> Filter {
        Filter::Present("objectClass".to_string())
    }

    pub fn equal(attr: &str, value: &str) -> Filter {
        Filter::Equal(attr.to_string(), value.to_string())
    }

    /// Conjunction that avoids nesting single terms
    pub fn and(filters: Vec<Filter>) -> Filter {
        let mut flat = Vec::with_capacity(filters.len());
        for f in filters {
            match f {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Filter::And(flat)
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => entry.get(attr).is_some_and(|values| !values.is_empty()),
            Filter::Equal(attr, expected) => entry
                .get(attr)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(expected))),
            Filter::Substring(attr, pieces) => entry
                .get(attr)
                .is_some_and(|values| values.iter().any(|v| wildcard_match(v, pieces))),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for inner in filters {
                    write!(f, "{}", inner)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for inner in filters {
                    write!(f, "{}", inner)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Equal(attr, value) => write!(f, "({}={})", attr, escape_filter_value(value)),
            Filter::Substring(attr, pieces) => {
                let escaped: Vec<String> = pieces.iter().map(|p| escape_filter_value(p)).collect();
                write!(f, "({}={})", attr, escaped.join("*"))
            }
        }
    }
}

/// Maximum parenthesis depth; values cannot hold raw parentheses.
fn nesting_depth(input: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// `pieces` alternate between literal runs; the first must prefix, the last
/// must suffix, the middle ones appear in order.
fn wildcard_match(value: &str, pieces: &[String]) -> bool {
    let value = value.to_lowercase();
    let pieces: Vec<String> = pieces.iter().map(|p| p.to_lowercase()).collect();
    let (first, rest) = match pieces.split_first() {
        Some(split) => split,
        None => return true,
    };
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut cursor = first.len();
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };
    for piece in middle {
        match value[cursor..].find(piece.as_str()) {
            Some(found) => cursor += found + piece.len(),
            None => return false,
        }
    }
    value.len() >= cursor + last.len() && value[cursor..].ends_with(last.as_str())
}

// =============================================================================
// PARSERS
// =============================================================================

fn filter(input: &str) -> IResult<&str, Filter> {
    delimited(
        preceded(multispace0, char('(')),
        alt((and_filter, or_filter, not_filter, item_filter)),
        preceded(multispace0, char(')')),
    )(input)
}

fn and_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('&'), many0(filter)), Filter::And)(input)
}

fn or_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('|'), many0(filter)), Filter::Or)(input)
}

fn not_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('!'), filter), |inner| Filter::Not(Box::new(inner)))(input)
}

fn attribute_description(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == ';' || c == '.')(input)
}

fn assertion_value(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c != '(' && c != ')')(input)
}

fn item_filter(input: &str) -> IResult<&str, Filter> {
    map(
        separated_pair(attribute_description, char('='), assertion_value),
        |(attr, raw)| build_item(attr, raw),
    )(input)
}

fn build_item(attr: &str, raw: &str) -> Filter {
    if raw == "*" {
        return Filter::Present(attr.to_string());
    }
    if raw.contains('*') {
        return Filter::Substring(attr.to_string(), raw.split('*').map(unescape).collect());
    }
    Filter::Equal(attr.to_string(), unescape(raw))
}

/// Decodes `\XX` hex escapes; malformed escapes are kept verbatim.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alice() -> Entry {
        Entry::new("uid=alice,ou=people,dc=example,dc=com")
            .with("objectClass", &["top", "inetOrgPerson"])
            .with("uid", &["alice"])
            .with("cn", &["Alice Liddell"])
            .with("mail", &["alice@example.com"])
    }

    #[test]
    fn test_parse_nested() {
        let parsed = Filter::parse("(&(objectClass=inetOrgPerson)(|(uid=a*)(!(mail=*))))").unwrap();
        assert_eq!(
            parsed,
            Filter::And(vec![
                Filter::equal("objectClass", "inetOrgPerson"),
                Filter::Or(vec![
                    Filter::Substring("uid".into(), vec!["a".into(), "".into()]),
                    Filter::Not(Box::new(Filter::Present("mail".into()))),
                ]),
            ])
        );
    }

    #[rstest]
    #[case("(uid=alice)", true)]
    #[case("(UID=ALICE)", true)]
    #[case("(uid=bob)", false)]
    #[case("(cn=*liddell)", true)]
    #[case("(cn=Al*ce*)", true)]
    #[case("(cn=*x*)", false)]
    #[case("(mail=*)", true)]
    #[case("(!(mail=*))", false)]
    #[case("(|(uid=bob)(uid=alice))", true)]
    #[case("(&(uid=alice)(objectClass=posixAccount))", false)]
    #[case("(cn=Alice\\20Liddell)", true)]
    fn test_matches(#[case] filter: &str, #[case] expected: bool) {
        assert_eq!(Filter::parse(filter).unwrap().matches(&alice()), expected);
    }

    #[rstest]
    #[case("uid=alice")]
    #[case("(uid=alice")]
    #[case("(&(uid=a)")]
    #[case("()")]
    fn test_rejects_malformed(#[case] filter: &str) {
        assert!(Filter::parse(filter).is_err());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let nested = |depth: usize| {
            format!("{}(uid=alice){}", "(!".repeat(depth), ")".repeat(depth))
        };

        // 63 negations around a matching term
        let parsed = Filter::parse(&nested(MAX_FILTER_DEPTH - 1)).unwrap();
        assert!(!parsed.matches(&alice()));
        assert!(Filter::parse(&nested(MAX_FILTER_DEPTH)).is_err());

        let hostile = nested(50_000);
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || Filter::parse(&hostile).is_err())
            .unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_display_round_trips() {
        let source = "(&(objectClass=inetOrgPerson)(cn=a\\2ab*))";
        let parsed = Filter::parse(source).unwrap();
        assert_eq!(Filter::parse(&parsed.to_string()).unwrap(), parsed);
    }

    #[test]
    fn test_and_flattens() {
        let combined = Filter::and(vec![
            Filter::and(vec![Filter::equal("a", "1"), Filter::equal("b", "2")]),
            Filter::equal("c", "3"),
        ]);
        assert_eq!(
            combined,
            Filter::And(vec![
                Filter::equal("a", "1"),
                Filter::equal("b", "2"),
                Filter::equal("c", "3")
            ])
        );
        assert_eq!(Filter::and(vec![Filter::equal("a", "1")]), Filter::equal("a", "1"));
    }
}
