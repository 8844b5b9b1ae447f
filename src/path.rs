//! Route template parsing.
//!
//! Two template syntaxes are understood:
//!
//! - angle brackets: `/users/<id>` or `/users/<int:id>` (converter first)
//! - curly braces: `/users/{id}` or `/users/{id:integer}` (converter last)
//!
//! Converters are stripped so that extracted names match handler parameter
//! names exactly. The curly form without converters is the canonical one: it
//! keys OpenAPI path items and is what the request router matches against.

use crate::error::{Error, Result};
use log::debug;

/// A placeholder found in a template.
struct Token<'a> {
    name: &'a str,
    converter: Option<&'a str>,
}

/// A template split into literal text and placeholders.
enum Piece<'a> {
    Literal(&'a str),
    Param(Token<'a>),
}

fn tokenize(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while !rest.is_empty() {
        let next_open = rest.find(['<', '{']);
        let Some(open) = next_open else {
            pieces.push(Piece::Literal(rest));
            break;
        };

        let close_char = if rest.as_bytes()[open] == b'<' { '>' } else { '}' };
        let Some(close_offset) = rest[open..].find(close_char) else {
            // Unterminated placeholder, keep it verbatim
            pieces.push(Piece::Literal(rest));
            break;
        };
        let close = open + close_offset;

        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }

        let inner = rest[open + 1..close].trim();
        let token = if close_char == '>' {
            // <converter:name>
            match inner.rsplit_once(':') {
                Some((converter, name)) => Token {
                    name: name.trim(),
                    converter: Some(converter.trim()),
                },
                None => Token {
                    name: inner,
                    converter: None,
                },
            }
        } else {
            // {name:converter}
            match inner.split_once(':') {
                Some((name, converter)) => Token {
                    name: name.trim(),
                    converter: Some(converter.trim()),
                },
                None => Token {
                    name: inner,
                    converter: None,
                },
            }
        };

        if token.name.is_empty() {
            pieces.push(Piece::Literal(&rest[open..=close]));
        } else {
            pieces.push(Piece::Param(token));
        }
        rest = &rest[close + 1..];
    }

    pieces
}

/// Extracts the path parameter names of a template, in order of appearance.
///
/// `/x/<int:id>` and `/x/{id}` both yield `["id"]`.
pub fn extract_path_params(template: &str) -> Vec<String> {
    tokenize(template)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Param(token) => Some(token.name.to_string()),
            Piece::Literal(_) => None,
        })
        .collect()
}

/// Converts a template to the curly-brace syntax, dropping converters.
pub fn to_curly(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    for piece in tokenize(template) {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Param(token) => {
                out.push('{');
                out.push_str(token.name);
                out.push('}');
            }
        }
    }
    out
}

/// Converts a template to the angle-bracket syntax, keeping converters.
pub fn to_angle(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    for piece in tokenize(template) {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Param(Token {
                name,
                converter: Some(converter),
            }) => {
                out.push('<');
                out.push_str(converter);
                out.push(':');
                out.push_str(name);
                out.push('>');
            }
            Piece::Param(Token {
                name,
                converter: None,
            }) => {
                out.push('<');
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out
}

/// Checks a template for duplicate parameter names and returns its parameters.
pub fn validate_template(template: &str) -> Result<Vec<String>> {
    let params = extract_path_params(template);
    for (idx, name) in params.iter().enumerate() {
        if params[..idx].contains(name) {
            return Err(Error::InvalidTemplate {
                template: template.to_string(),
                message: format!("path parameter `{}` appears more than once", name),
            });
        }
    }
    debug!("Template {} has parameters {:?}", template, params);
    Ok(params)
}

/// Combine a prefix and path, handling slashes correctly
pub fn join_paths(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }

    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_syntaxes_yield_same_names() {
        assert_eq!(extract_path_params("/x/<int:id>"), vec!["id"]);
        assert_eq!(extract_path_params("/x/{id}"), vec!["id"]);
        assert_eq!(
            extract_path_params("/posts/<post_id>/comments/<int:comment_id>"),
            extract_path_params("/posts/{post_id}/comments/{comment_id}")
        );
    }

    #[test]
    fn test_curly_converter_is_stripped() {
        assert_eq!(extract_path_params("/users/{id:integer}"), vec!["id"]);
        assert_eq!(to_curly("/users/{id:integer}"), "/users/{id}");
    }

    #[test]
    fn test_params_inside_segments() {
        assert_eq!(
            extract_path_params("/files/<name>.<ext>"),
            vec!["name", "ext"]
        );
        assert_eq!(to_curly("/files/<name>.<ext>"), "/files/{name}.{ext}");
    }

    #[test]
    fn test_to_curly_and_back() {
        assert_eq!(to_curly("/path/<int:path_id>"), "/path/{path_id}");
        assert_eq!(to_angle("/path/{path_id}"), "/path/<path_id>");
        assert_eq!(to_angle("/path/{path_id:int}"), "/path/<int:path_id>");
        assert_eq!(to_angle("/path/<int:path_id>"), "/path/<int:path_id>");
    }

    #[test]
    fn test_no_params() {
        assert!(extract_path_params("/users/list").is_empty());
        assert_eq!(to_curly("/users/list"), "/users/list");
    }

    #[test]
    fn test_empty_placeholder_is_literal() {
        assert!(extract_path_params("/users/{}").is_empty());
        assert_eq!(to_curly("/users/{}"), "/users/{}");
    }

    #[test]
    fn test_duplicate_params_rejected() {
        let err = validate_template("/a/{id}/b/<int:id>").unwrap_err();
        assert!(err.to_string().contains("more than once"));
        assert_eq!(validate_template("/a/{id}").unwrap(), vec!["id"]);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", "/users"), "/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("/api", "/"), "/api");
    }
}
