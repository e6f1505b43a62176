//! Argument quoting for the two launch grammars.
//!
//! [`quote_direct`] follows the rules process launchers apply when building a
//! command line for a process image (`\"` escapes, backslashes doubled only
//! when they precede a quote). [`quote_interpreter`] targets the command
//! interpreter parser instead: a much wider trigger set and doubled quotes.

/// Characters that force quoting when an argument is handed to the command
/// interpreter.
const INTERPRETER_SPECIAL_CHARS: &[char] = &[
    ' ', '\t', '&', '(', ')', '[', ']', '{', '}', '^', '=', ';', '!', '\'', '+', ',', '`', '~',
    '|', '<', '>', '"',
];

/// Quote an argument for direct process-image invocation.
///
/// ```
/// use toolrun_exec::quote_direct;
///
/// assert_eq!(quote_direct("hello"), "hello");
/// assert_eq!(quote_direct("hello world"), "\"hello world\"");
/// assert_eq!(quote_direct("hello\"world"), "\"hello\\\"world\"");
/// ```
pub fn quote_direct(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }

    if !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }

    if !arg.contains(['"', '\\']) {
        return format!("\"{arg}\"");
    }

    // input : hello"world     output: "hello\"world"
    // input : hello\"world    output: "hello\\\"world"
    // input : hello world\    output: "hello world\\"
    reverse_scan(arg, QuoteEscape::Backslash)
}

/// Quote an argument for a script executed through the command interpreter.
///
/// ```
/// use toolrun_exec::quote_interpreter;
///
/// assert_eq!(quote_interpreter(""), "\"\"");
/// assert_eq!(quote_interpreter("a&b"), "\"a&b\"");
/// assert_eq!(quote_interpreter("plain"), "plain");
/// ```
pub fn quote_interpreter(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }

    if !arg.contains(INTERPRETER_SPECIAL_CHARS) {
        return arg.to_string();
    }

    // input : hello\"world    output: "hello\\""world"
    // input : hello world\    output: "hello world\\"
    reverse_scan(arg, QuoteEscape::Double)
}

#[derive(Debug, Clone, Copy)]
enum QuoteEscape {
    Backslash,
    Double,
}

impl QuoteEscape {
    fn as_char(self) -> char {
        match self {
            QuoteEscape::Backslash => '\\',
            QuoteEscape::Double => '"',
        }
    }
}

// Walks the argument back to front so a run of backslashes can be doubled
// exactly when it ends at a quote or at the closing quote.
fn reverse_scan(arg: &str, escape: QuoteEscape) -> String {
    let mut reversed = String::with_capacity(arg.len() * 2 + 2);
    reversed.push('"');
    let mut pending_quote = true;
    for c in arg.chars().rev() {
        reversed.push(c);
        if pending_quote && c == '\\' {
            reversed.push('\\');
        } else if c == '"' {
            pending_quote = true;
            reversed.push(escape.as_char());
        } else {
            pending_quote = false;
        }
    }
    reversed.push('"');
    reversed.chars().rev().collect()
}
