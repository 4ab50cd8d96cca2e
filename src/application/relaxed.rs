//! Relaxed object-literal syntax.
//!
//! Compiled collection files are written as script object literals: comments,
//! single-quoted or backtick strings, bare keys and trailing commas are all
//! allowed. [`to_strict_json`] rewrites such text into JSON that `serde_json`
//! accepts. Anything beyond plain literals (spreads, calls, expressions) is
//! left untouched and fails to parse later.

#[derive(Clone, Copy)]
enum State {
    Code,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Per-byte flag: `true` where the byte is code, `false` inside strings and comments.
pub(crate) fn code_mask(text: &str) -> Vec<bool> {
    let bytes = text.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut state = State::Code;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        let next = bytes.get(index + 1).copied();
        match state {
            State::Code => match byte {
                b'"' | b'\'' | b'`' => state = State::Quoted(byte),
                b'/' if next == Some(b'/') => state = State::LineComment,
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    index += 1;
                }
                _ => mask[index] = true,
            },
            State::Quoted(quote) => {
                if byte == b'\\' {
                    index += 1;
                } else if byte == quote {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if byte == b'\n' {
                    mask[index] = true;
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if byte == b'*' && next == Some(b'/') {
                    index += 1;
                    state = State::Code;
                }
            }
        }
        index += 1;
    }

    mask
}

/// Remove comments, keeping string contents and line breaks.
pub(crate) fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut kept = Vec::with_capacity(bytes.len());
    let mut state = State::Code;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        let next = bytes.get(index + 1).copied();
        match state {
            State::Code => match byte {
                b'/' if next == Some(b'/') => state = State::LineComment,
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    index += 1;
                }
                b'"' | b'\'' | b'`' => {
                    state = State::Quoted(byte);
                    kept.push(byte);
                }
                _ => kept.push(byte),
            },
            State::Quoted(quote) => {
                kept.push(byte);
                if byte == b'\\' {
                    if let Some(escaped) = next {
                        kept.push(escaped);
                        index += 1;
                    }
                } else if byte == quote {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if byte == b'\n' {
                    kept.push(byte);
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if byte == b'*' && next == Some(b'/') {
                    kept.push(b' ');
                    index += 1;
                    state = State::Code;
                }
            }
        }
        index += 1;
    }

    String::from_utf8_lossy(&kept).into_owned()
}

/// Byte index of the bracket closing the one at `open`, ignoring strings and comments.
pub(crate) fn matching_close(text: &str, mask: &[bool], open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for index in open..bytes.len() {
        if !mask.get(index).copied().unwrap_or(false) {
            continue;
        }
        match bytes[index] {
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a relaxed object literal into strict JSON text.
pub fn to_strict_json(source: &str) -> String {
    strip_trailing_commas(&normalize_tokens(source))
}

fn normalize_tokens(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut index = 0;

    while index < chars.len() {
        let current = chars[index];
        let next = chars.get(index + 1).copied();
        match current {
            '"' => index = copy_double_quoted(&chars, index, &mut out),
            '\'' | '`' => index = convert_quoted(&chars, index, &mut out),
            '/' if next == Some('/') => {
                while index < chars.len() && chars[index] != '\n' {
                    index += 1;
                }
            }
            '/' if next == Some('*') => {
                index += 2;
                while index < chars.len()
                    && !(chars[index] == '*' && chars.get(index + 1) == Some(&'/'))
                {
                    index += 1;
                }
                index = (index + 2).min(chars.len());
                out.push(' ');
            }
            ch if is_ident_start(ch) => {
                let start = index;
                while index < chars.len() && is_ident_continue(chars[index]) {
                    index += 1;
                }
                let ident: String = chars[start..index].iter().collect();
                let mut lookahead = index;
                while lookahead < chars.len() && chars[lookahead].is_whitespace() {
                    lookahead += 1;
                }
                if chars.get(lookahead) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else if ident == "undefined" {
                    out.push_str("null");
                } else {
                    out.push_str(&ident);
                }
            }
            ch => {
                out.push(ch);
                index += 1;
            }
        }
    }

    out
}

fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut index = start + 1;
    while index < chars.len() {
        let ch = chars[index];
        out.push(ch);
        index += 1;
        if ch == '\\' {
            if let Some(escaped) = chars.get(index) {
                out.push(*escaped);
                index += 1;
            }
        } else if ch == '"' {
            break;
        }
    }
    index
}

fn convert_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push('"');
    let mut index = start + 1;
    while index < chars.len() {
        let ch = chars[index];
        index += 1;
        match ch {
            '\\' => {
                if let Some(&escaped) = chars.get(index) {
                    index += 1;
                    if escaped == quote {
                        out.push(escaped);
                    } else {
                        out.push('\\');
                        out.push(escaped);
                    }
                }
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch == quote => break,
            ch => out.push(ch),
        }
    }
    out.push('"');
    index
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if in_string {
            out.push(ch);
            if ch == '\\' {
                if let Some(&escaped) = chars.get(index + 1) {
                    out.push(escaped);
                    index += 1;
                }
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
            out.push(ch);
        } else if ch == ',' {
            let next = chars[index + 1..].iter().find(|c| !c.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(ch);
            }
        } else {
            out.push(ch);
        }
        index += 1;
    }

    out
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}
