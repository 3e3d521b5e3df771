//! Shell-like splitting of check command lines.
//!
//! Follows POSIX shell word rules without any expansion:
//! - whitespace separates words outside quotes
//! - `'...'` is taken literally
//! - inside `"..."` a backslash only escapes `\`, `"`, `$`, `` ` `` and newline
//! - outside quotes a backslash escapes the next character; `\<newline>` is dropped

use crate::errors::ParseError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Unquoted,
    Single,
    Double,
}

/// Split a command line into words. The first word names the handler.
pub fn tokenize(command: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // A token can be empty (`''`), so track whether one has started.
    let mut in_token = false;
    let mut state = State::Unquoted;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Unquoted => match c {
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '\'' => {
                    state = State::Single;
                    in_token = true;
                }
                '"' => {
                    state = State::Double;
                    in_token = true;
                }
                '\\' => match chars.next() {
                    Some('\n') => {}
                    Some(escaped) => {
                        current.push(escaped);
                        in_token = true;
                    }
                    None => return Err(ParseError::TrailingEscape),
                },
                _ => {
                    current.push(c);
                    in_token = true;
                }
            },
            State::Single => match c {
                '\'' => state = State::Unquoted,
                _ => current.push(c),
            },
            State::Double => match c {
                '"' => state = State::Unquoted,
                '\\' => match chars.next() {
                    Some('\n') => {}
                    Some(escaped @ ('\\' | '"' | '$' | '`')) => current.push(escaped),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => return Err(ParseError::UnterminatedQuote('"')),
                },
                _ => current.push(c),
            },
        }
    }

    match state {
        State::Single => return Err(ParseError::UnterminatedQuote('\'')),
        State::Double => return Err(ParseError::UnterminatedQuote('"')),
        State::Unquoted => {}
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(s: &str) -> Vec<String> {
        tokenize(s).unwrap()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(split("check_disk / -w 80"), vec!["check_disk", "/", "-w", "80"]);
        assert_eq!(split("  check_load\t-c  5 \n"), vec!["check_load", "-c", "5"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split("").is_empty());
        assert!(split("   \t ").is_empty());
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(split(r#"echo 'a  b' 'c\d' '$HOME'"#), vec!["echo", "a  b", r"c\d", "$HOME"]);
    }

    #[test]
    fn test_double_quote_escapes() {
        assert_eq!(
            split(r#"x "say \"hi\"" "back\\slash" "keep\n""#),
            vec!["x", r#"say "hi""#, r"back\slash", r"keep\n"]
        );
    }

    #[test]
    fn test_adjacent_quoted_parts_join() {
        assert_eq!(split(r#"a"b"'c'd"#), vec!["abcd"]);
        assert_eq!(split(r#"--name="my host""#), vec!["--name=my host"]);
    }

    #[test]
    fn test_empty_quoted_token_is_kept() {
        assert_eq!(split("check '' \"\""), vec!["check", "", ""]);
    }

    #[test]
    fn test_backslash_outside_quotes() {
        assert_eq!(split(r"a\ b c\'d"), vec!["a b", "c'd"]);
        assert_eq!(split("a\\\nb"), vec!["ab"]);
    }

    #[test]
    fn test_unbalanced_quotes_fail() {
        assert_eq!(
            tokenize("check_x 'unterminated"),
            Err(ParseError::UnterminatedQuote('\''))
        );
        assert_eq!(tokenize(r#"check_x "open"#), Err(ParseError::UnterminatedQuote('"')));
        assert_eq!(tokenize("check_x \\"), Err(ParseError::TrailingEscape));
    }

    #[test]
    fn test_tokenize_is_pure() {
        let cmd = r#"check_http -H "example.org" -u '/status page'"#;
        assert_eq!(tokenize(cmd), tokenize(cmd));
    }
}
