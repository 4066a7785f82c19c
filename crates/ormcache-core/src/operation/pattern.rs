//! String pattern matching for in-memory evaluation.

use std::iter::Peekable;
use std::str::Chars;

/// Pattern dialect: the "any run" and "any one" metacharacters plus an
/// optional escape.
struct Syntax {
    many: char,
    one: char,
    escape: Option<char>,
}

const LIKE: Syntax = Syntax {
    many: '%',
    one: '_',
    escape: Some('\\'),
};

const WILDCARD: Syntax = Syntax {
    many: '*',
    one: '?',
    escape: None,
};

/// SQL `LIKE`: `%` matches any run, `_` any one character, `\` escapes.
pub fn like_match(value: &str, pattern: &str) -> bool {
    glob_match(value, pattern, &LIKE)
}

/// Glob: `*` matches any run, `?` any one character.
pub fn wildcard_match(value: &str, pattern: &str) -> bool {
    glob_match(value, pattern, &WILDCARD)
}

fn glob_match(value: &str, pattern: &str, syntax: &Syntax) -> bool {
    let mut chars = value.chars().peekable();
    let mut pattern_chars = pattern.chars().peekable();
    match_recursive(&mut chars, &mut pattern_chars, syntax)
}

fn match_recursive(
    chars: &mut Peekable<Chars<'_>>,
    pattern: &mut Peekable<Chars<'_>>,
    syntax: &Syntax,
) -> bool {
    loop {
        match (pattern.peek().copied(), chars.peek().copied()) {
            (None, None) => return true,
            (None, Some(_)) => return false,
            (Some(p), _) if p == syntax.many => {
                // collapse runs of the metacharacter
                while pattern.peek() == Some(&syntax.many) {
                    pattern.next();
                }
                if pattern.peek().is_none() {
                    return true;
                }
                loop {
                    let mut pattern_clone = pattern.clone();
                    let mut chars_clone = chars.clone();
                    if match_recursive(&mut chars_clone, &mut pattern_clone, syntax) {
                        return true;
                    }
                    if chars.next().is_none() {
                        return false;
                    }
                }
            }
            (Some(p), Some(_)) if p == syntax.one => {
                pattern.next();
                chars.next();
            }
            (Some(p), None) if p == syntax.one => return false,
            (Some(p), _) if Some(p) == syntax.escape => {
                pattern.next();
                match (pattern.peek().copied(), chars.peek().copied()) {
                    (Some(p), Some(c)) if p == c => {
                        pattern.next();
                        chars.next();
                    }
                    _ => return false,
                }
            }
            (Some(p), Some(c)) => {
                if p != c {
                    return false;
                }
                pattern.next();
                chars.next();
            }
            (Some(_), None) => return false,
        }
    }
}
