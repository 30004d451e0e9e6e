//! URL pattern matching with path parameters.

use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlMatchResult {
    pub matched: bool,
    pub params: HashMap<String, String>,
}

/// Match `url` against `pattern`, where `:name` and `{name}` segments capture
/// path parameters. Query strings and trailing slashes are ignored.
pub fn url_matches(pattern: &str, url: &str) -> UrlMatchResult {
    let pattern = normalize_url(pattern);
    let url = normalize_url(url);

    let Some((regex, param_names)) = pattern_to_regex(&pattern) else {
        return UrlMatchResult::default();
    };

    let Some(caps) = regex.captures(&url) else {
        return UrlMatchResult::default();
    };

    let params = param_names
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            caps.get(i + 1).map(|m| {
                let value = urlencoding::decode(m.as_str())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_owned());
                (name, value)
            })
        })
        .collect();

    UrlMatchResult {
        matched: true,
        params,
    }
}

/// Join an interceptor base URL and a handler path.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or("");
    let without_query = without_fragment.split('?').next().unwrap_or("");
    let trimmed = without_query.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else {
        trimmed.into()
    }
}

fn pattern_to_regex(pattern: &str) -> Option<(Regex, Vec<String>)> {
    let mut param_names = Vec::new();
    let mut regex_str = String::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        let starts_param = match c {
            '{' => true,
            ':' => chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_'),
            _ => false,
        };

        if !starts_param {
            literal.push(c);
            continue;
        }

        regex_str.push_str(&regex::escape(&literal));
        literal.clear();

        let name: String = if c == '{' {
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };
        param_names.push(name);
        regex_str.push_str("([^/]+)");
    }
    regex_str.push_str(&regex::escape(&literal));

    let regex = Regex::new(&format!("^{regex_str}/?$")).ok()?;
    Some((regex, param_names))
}
