//! Locating key paths inside YAML source text
//!
//! `serde_yaml::Value` keeps no positions, so diagnostics are mapped back to a
//! line by scanning the block structure of the contributing file. Flow
//! collections (`[a, b]`, `{a: b}`) are not descended into; the location of
//! the deepest block-style prefix is reported instead.

use crate::error::Location;

#[derive(Debug, PartialEq, Eq)]
enum TokenKind {
    Dash,
    Key(String),
}

#[derive(Debug)]
struct Token {
    line: usize,
    indent: usize,
    kind: TokenKind,
}

/// Find the line/column of the deepest prefix of `path` present in `text`
#[must_use]
pub fn locate(text: &str, path: &[String]) -> Option<Location> {
    let tokens = tokenize(text);
    let mut start = 0;
    let mut scope: Option<usize> = None;
    let mut found = None;

    for component in path {
        let index: Option<usize> = component.parse().ok();
        let mut child_indent = None;
        let mut seq_position = 0;
        let mut hit = None;

        for (i, token) in tokens.iter().enumerate().skip(start) {
            if scope.is_some_and(|s| token.indent <= s) {
                break;
            }
            let indent = *child_indent.get_or_insert(token.indent);
            if token.indent < indent {
                break;
            }
            if token.indent > indent {
                continue;
            }

            match token.kind {
                TokenKind::Key(ref key) if key == component => {
                    hit = Some(i);
                    break;
                }
                TokenKind::Dash if index.is_some() => {
                    if index == Some(seq_position) {
                        hit = Some(i);
                        break;
                    }
                    seq_position += 1;
                }
                TokenKind::Key(_) | TokenKind::Dash => {}
            }
        }

        let Some(i) = hit else { break };
        let token = &tokens[i];
        found = Some(Location {
            line: token.line,
            column: token.indent + 1,
        });
        scope = Some(token.indent);
        start = i + 1;
    }

    found
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();

    for (number, raw) in text.lines().enumerate() {
        let trimmed = raw.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("---")
            || trimmed.starts_with("...")
        {
            continue;
        }

        let mut indent = raw.len() - trimmed.len();
        let mut rest = trimmed;
        loop {
            if rest == "-" || rest.starts_with("- ") {
                tokens.push(Token {
                    line: number + 1,
                    indent,
                    kind: TokenKind::Dash,
                });
                let after = &rest[1..];
                let stripped = after.trim_start();
                indent += 1 + (after.len() - stripped.len());
                rest = stripped;
                if rest.is_empty() {
                    break;
                }
                continue;
            }
            if let Some(key) = mapping_key(rest) {
                tokens.push(Token {
                    line: number + 1,
                    indent,
                    kind: TokenKind::Key(key),
                });
            }
            break;
        }
    }

    tokens
}

/// The key of a `key: value` or `key:` line, unquoted
fn mapping_key(content: &str) -> Option<String> {
    if content.starts_with(['{', '[', '#', '|', '>']) {
        return None;
    }

    if let Some(quote) = content.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = &content[1..];
        let end = body.find(quote)?;
        let after = &body[end + 1..];
        return after
            .trim_start()
            .starts_with(':')
            .then(|| body[..end].to_owned());
    }

    let bytes = content.as_bytes();
    for (i, &byte) in bytes.iter().enumerate() {
        if byte == b'#' && i > 0 && bytes[i - 1] == b' ' {
            return None;
        }
        if byte == b':' && bytes.get(i + 1).is_none_or(|next| *next == b' ') {
            return Some(content[..i].trim_end().to_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_owned()).collect()
    }

    const DOC: &str = "\
network:
  version: 2
  ethernets:
    eth0:
      dhcp4: true
      routes:
        - to: default
          via: 10.0.0.1
        - to: 192.168.0.0/16
          via: 10.0.0.2
  vlans:
    \"vlan.10\":
      id: 4095
      link: eth0
";

    #[test]
    fn finds_nested_keys() {
        let loc = locate(DOC, &path(&["network", "vlans", "vlan.10", "id"])).unwrap();
        assert_eq!(loc, Location { line: 13, column: 7 });
    }

    #[test]
    fn finds_sequence_elements_and_inline_keys() {
        let loc = locate(DOC, &path(&["network", "ethernets", "eth0", "routes", "1", "via"])).unwrap();
        assert_eq!(loc, Location { line: 10, column: 11 });

        let loc = locate(DOC, &path(&["network", "ethernets", "eth0", "routes", "1", "to"])).unwrap();
        assert_eq!(loc, Location { line: 9, column: 11 });
    }

    #[test]
    fn falls_back_to_deepest_prefix() {
        let loc = locate(DOC, &path(&["network", "ethernets", "eth0", "mtu"])).unwrap();
        assert_eq!(loc, Location { line: 4, column: 5 });
    }

    #[test]
    fn does_not_match_keys_outside_scope() {
        assert!(locate(DOC, &path(&["dhcp4"])).is_none());
    }

    #[test]
    fn values_with_colons_are_not_keys() {
        assert_eq!(mapping_key("macaddress: 00:11:22:33:44:55"), Some("macaddress".to_owned()));
        assert_eq!(mapping_key("\"a: b\": 1"), Some("a: b".to_owned()));
        assert_eq!(mapping_key("[a, b]"), None);
    }
}
