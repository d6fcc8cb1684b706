//! Structural balance check for candidate outputs.
//!
//! Counts braces, brackets, and parentheses while skipping string literals,
//! template literals (including nested `${}` interpolations), and comments.
//! Depth must never go negative and must return to zero at the end of input.

/// Scanner mode. Only `Code` can open or close delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Single,
    Double,
    Template,
    LineComment,
    BlockComment,
}

/// Sentinel pushed when a template interpolation opens. Popping it returns
/// the scanner to the enclosing template literal.
const INTERPOLATION: char = '$';

pub fn is_balanced(text: &str) -> bool {
    check_balance(text).is_ok()
}

/// Verifies delimiter balance, reporting the first violation found.
pub fn check_balance(text: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut mode = Mode::Code;
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match mode {
            Mode::Code => match c {
                '\'' => mode = Mode::Single,
                '"' => mode = Mode::Double,
                '`' => mode = Mode::Template,
                '/' => match chars.peek() {
                    Some((_, '/')) => {
                        chars.next();
                        mode = Mode::LineComment;
                    }
                    Some((_, '*')) => {
                        chars.next();
                        mode = Mode::BlockComment;
                    }
                    _ => {}
                },
                '{' | '[' | '(' => stack.push((c, pos)),
                '}' | ']' | ')' => match stack.pop() {
                    Some((INTERPOLATION, _)) if c == '}' => mode = Mode::Template,
                    Some((open, _)) if pairs_with(open, c) => {}
                    Some((open, open_pos)) => {
                        return Err(format!(
                            "'{}' at byte {} closed by '{}' at byte {}",
                            open, open_pos, c, pos
                        ));
                    }
                    None => return Err(format!("unmatched '{}' at byte {}", c, pos)),
                },
                _ => {}
            },
            Mode::Single => match c {
                '\\' => {
                    chars.next();
                }
                '\'' => mode = Mode::Code,
                _ => {}
            },
            Mode::Double => match c {
                '\\' => {
                    chars.next();
                }
                '"' => mode = Mode::Code,
                _ => {}
            },
            Mode::Template => match c {
                '\\' => {
                    chars.next();
                }
                '`' => mode = Mode::Code,
                '$' => {
                    if let Some((_, '{')) = chars.peek() {
                        chars.next();
                        stack.push((INTERPOLATION, pos));
                        mode = Mode::Code;
                    }
                }
                _ => {}
            },
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                if c == '*' {
                    if let Some((_, '/')) = chars.peek() {
                        chars.next();
                        mode = Mode::Code;
                    }
                }
            }
        }
    }

    match mode {
        Mode::Single | Mode::Double => return Err("unterminated string literal".to_string()),
        Mode::Template => return Err("unterminated template literal".to_string()),
        Mode::BlockComment => return Err("unterminated block comment".to_string()),
        Mode::Code | Mode::LineComment => {}
    }

    if let Some((open, pos)) = stack.last() {
        if *open == INTERPOLATION {
            return Err(format!("unclosed template interpolation at byte {}", pos));
        }
        return Err(format!("unclosed '{}' at byte {}", open, pos));
    }

    Ok(())
}

fn pairs_with(open: char, close: char) -> bool {
    matches!((open, close), ('{', '}') | ('[', ']') | ('(', ')'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_source_passes() {
        let source = "function render() {\n  return [1, 2].map((n) => ({ n }));\n}\n";
        assert!(is_balanced(source));
    }

    #[test]
    fn test_missing_close_brace_fails() {
        let report = check_balance("function f() { if (x) { return 1; }\n");
        assert!(report.is_err());
        assert!(report.unwrap_err().contains("unclosed '{'"));
    }

    #[test]
    fn test_extra_close_paren_fails() {
        let report = check_balance("const x = (1 + 2));");
        assert!(report.is_err());
        assert!(report.unwrap_err().contains("unmatched ')'"));
    }

    #[test]
    fn test_mismatched_pair_fails() {
        assert!(check_balance("const a = [1, 2);").is_err());
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        assert!(is_balanced(r#"const a = "{ not a brace }"; const b = '(';"#));
    }

    #[test]
    fn test_braces_inside_comments_ignored() {
        assert!(is_balanced("// { [ (\nconst a = 1; /* ) ] } */\n"));
    }

    #[test]
    fn test_template_literal_with_interpolation() {
        let source = "const s = `value: ${items.map((i) => `${i}`).join(\", \")}`;";
        assert!(is_balanced(source));
    }

    #[test]
    fn test_template_literal_braces_ignored() {
        assert!(is_balanced("const css = `.btn { color: red; }`;"));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        assert!(is_balanced(r#"const s = "say \"{\""; const t = 'don\'t';"#));
    }

    #[test]
    fn test_unterminated_template_fails() {
        assert!(check_balance("const s = `no end").is_err());
    }

    #[test]
    fn test_unclosed_interpolation_fails() {
        assert!(check_balance("const s = `a ${b`;").is_err());
    }

    #[test]
    fn test_regex_division_ambiguity_is_tolerated() {
        // A division followed by more code must not start a comment.
        assert!(is_balanced("const ratio = total / count; const next = (ratio + 1);"));
    }

    #[test]
    fn test_empty_input_is_balanced() {
        assert!(is_balanced(""));
    }
}
