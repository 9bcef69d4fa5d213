#![forbid(unsafe_code)]

//! Quoting for arguments that end up in a `sh -c` command line.
//!
//! Arguments made only of `[A-Za-z0-9_/:=-]` pass through untouched. Anything else is wrapped
//! in single quotes, with embedded single quotes rewritten as `'\''`.

use std::borrow::Cow;

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '/' | ':' | '=' | '-')
}

pub fn escape(arg: &str) -> Cow<'_, str> {
    // An empty argument must survive word splitting, so it is always quoted.
    if !arg.is_empty() && arg.chars().all(is_safe_char) {
        return Cow::Borrowed(arg);
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for ch in arg.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

/// Joins `program` and `args` into one shell command line, escaping every word.
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = escape(program).into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&escape(arg.as_ref()));
    }
    line
}
