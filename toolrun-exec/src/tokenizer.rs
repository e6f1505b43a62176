//! Splits a free-form argument line into discrete arguments.
//!
//! Space and tab separate arguments outside of double quotes. A double quote
//! toggles quoting and is dropped from the output. Inside quotes a backslash
//! only escapes a following double quote; in every other position it is kept
//! as written, except that a quoted backslash left pending at end of input is
//! dropped.

/// Tokenize `line` into an ordered argument list.
///
/// ```
/// use toolrun_exec::tokenize;
///
/// assert_eq!(tokenize(r#""arg one" two -z"#), vec!["arg one", "two", "-z"]);
/// ```
pub fn tokenize(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut last_was_delimiter = true;

    for c in line.chars() {
        if is_delimiter(c) && !in_quotes {
            if !last_was_delimiter {
                args.push(std::mem::take(&mut current));
            }
            last_was_delimiter = true;
            continue;
        }
        last_was_delimiter = false;

        match c {
            '"' if escaped => push_char(&mut current, &mut escaped, c),
            '"' => in_quotes = !in_quotes,
            '\\' if escaped => push_char(&mut current, &mut escaped, c),
            '\\' if in_quotes => escaped = true,
            _ => push_char(&mut current, &mut escaped, c),
        }
    }

    if !last_was_delimiter {
        args.push(current.trim().to_string());
    }

    args
}

fn is_delimiter(c: char) -> bool {
    c == ' ' || c == '\t'
}

// Only double quotes are escapable; anything else keeps its backslash.
fn push_char(current: &mut String, escaped: &mut bool, c: char) {
    if *escaped && c != '"' {
        current.push('\\');
    }
    current.push(c);
    *escaped = false;
}
