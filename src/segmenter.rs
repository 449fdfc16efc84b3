//! Splits block text into statement units.
//!
//! The scan is byte-oriented: every delimiter it cares about is ASCII, so
//! multi-byte characters can never be mistaken for structure. Comments and
//! literals are skipped as opaque runs.

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::literal_end,
};

/// One statement (or compound statement) of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub text: String,
    pub span: SourceSpan,
}

/// Splits `block` into statement units with spans relative to `block`.
pub fn split(block: &str) -> Vec<Unit> {
    split_at(block, 0)
}

/// Splits `block`, shifting every span by `base`.
pub fn split_at(block: &str, base: usize) -> Vec<Unit> {
    let code = code_bytes(block);
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut do_pending = false;
    let (mut braces, mut parens, mut brackets) = (0usize, 0usize, 0usize);

    let emit = |units: &mut Vec<Unit>, from: usize, to: usize| {
        let text = block[from..to].trim_end();
        if text.is_empty() || text == ";" {
            return;
        }
        units.push(Unit {
            text: text.to_string(),
            span: SourceSpan::new(base + from, base + from + text.len()),
        });
    };

    for (idx, &(pos, byte)) in code.iter().enumerate() {
        let unit_start = *start.get_or_insert_with(|| {
            do_pending = word_at(block, pos) == "do";
            pos
        });
        let at_top = |braces: usize, parens: usize, brackets: usize| {
            braces == 0 && parens == 0 && brackets == 0
        };
        let boundary = match byte {
            b'{' => {
                braces += 1;
                false
            }
            b'(' => {
                parens += 1;
                false
            }
            b'[' => {
                brackets += 1;
                false
            }
            b')' => {
                parens = parens.saturating_sub(1);
                false
            }
            b']' => {
                brackets = brackets.saturating_sub(1);
                false
            }
            b'}' => {
                braces = braces.saturating_sub(1);
                at_top(braces, parens, brackets)
            }
            b';' => at_top(braces, parens, brackets),
            _ => false,
        };
        if !boundary {
            continue;
        }
        let next = code.get(idx + 1).copied();
        let continues = match next {
            None => false,
            Some((_, b';' | b',' | b'.' | b')')) if byte == b'}' => true,
            Some((next_pos, _)) if word_at(block, next_pos) == "else" => true,
            Some((next_pos, _)) if do_pending && word_at(block, next_pos) == "while" => {
                do_pending = false;
                true
            }
            Some(_) => false,
        };
        if continues {
            continue;
        }
        emit(&mut units, unit_start, pos + 1);
        start = None;
    }

    if let Some(unit_start) = start {
        emit(&mut units, unit_start, block.len());
    }
    units
}

/// Splits `text` on `separator` bytes that sit outside any nesting, literal
/// or comment. Empty pieces are kept, so `";;"` yields three ranges.
pub fn split_top_level(text: &str, separator: u8) -> Vec<SourceSpan> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (pos, byte) in code_bytes(text) {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == separator && depth == 0 => {
                pieces.push(SourceSpan::new(from, pos));
                from = pos + 1;
            }
            _ => {}
        }
    }
    pieces.push(SourceSpan::new(from, text.len()));
    pieces
}

/// Checks that `{}`, `()` and `[]` pair up outside literals and comments.
pub fn check_balance(text: &str) -> Result<(), Diagnostic> {
    check_balance_at(text, 0)
}

pub fn check_balance_at(text: &str, base: usize) -> Result<(), Diagnostic> {
    let mut open: Vec<(usize, u8)> = Vec::new();
    for (pos, byte) in code_bytes(text) {
        let expected_open = match byte {
            b'{' | b'(' | b'[' => {
                open.push((pos, byte));
                continue;
            }
            b'}' => b'{',
            b')' => b'(',
            b']' => b'[',
            _ => continue,
        };
        match open.pop() {
            Some((_, opener)) if opener == expected_open => {}
            Some((opened_at, opener)) => {
                return Err(Diagnostic::new(
                    DiagnosticKind::BracketMismatch,
                    format!("`{}` closed by `{}`", opener as char, byte as char),
                )
                .with_span(SourceSpan::new(base + pos, base + pos + 1))
                .with_note(format!("opened at offset {}", base + opened_at)));
            }
            None => {
                return Err(Diagnostic::new(
                    DiagnosticKind::BracketMismatch,
                    format!("unmatched closing `{}`", byte as char),
                )
                .with_span(SourceSpan::new(base + pos, base + pos + 1)));
            }
        }
    }
    if let Some((pos, opener)) = open.pop() {
        return Err(Diagnostic::new(
            DiagnosticKind::BracketMismatch,
            format!("unclosed `{}`", opener as char),
        )
        .with_span(SourceSpan::new(base + pos, base + pos + 1)));
    }
    Ok(())
}

/// True when `text` opens more brackets than it closes, i.e. more input
/// could still complete it.
pub fn is_incomplete(text: &str) -> bool {
    let mut depth = 0isize;
    for (_, byte) in code_bytes(text) {
        match byte {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth > 0
}

/// Significant bytes of `text` with their offsets: whitespace and comments
/// are dropped and each literal is represented by its first byte only.
fn code_bytes(text: &str) -> Vec<(usize, u8)> {
    let bytes = text.as_bytes();
    let mut code = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                pos = text[pos..].find('\n').map_or(bytes.len(), |nl| pos + nl);
                continue;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = text[pos + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |close| pos + 2 + close + 2);
                continue;
            }
            b'"' | b'\'' => {
                code.push((pos, byte));
                pos = literal_end(text, pos).0;
                continue;
            }
            b'$' | b'@' if starts_literal(bytes, pos) => {
                code.push((pos, b'"'));
                pos = literal_end(text, pos).0;
                continue;
            }
            b if b.is_ascii_whitespace() => {}
            _ if text.is_char_boundary(pos) => code.push((pos, byte)),
            _ => {}
        }
        pos += 1;
    }
    code
}

fn starts_literal(bytes: &[u8], pos: usize) -> bool {
    match bytes.get(pos + 1) {
        Some(b'"') => true,
        Some(b'$' | b'@') => bytes.get(pos + 2) == Some(&b'"'),
        _ => false,
    }
}

fn word_at(text: &str, pos: usize) -> &str {
    let rest = &text[pos..];
    let end = rest
        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}
