use pretty_assertions::assert_eq;
use sharpling::{
    lexer::{tokenize, Keyword, Lexer, Operator, Punctuation, StringStyle, TokenKind},
    SourceSpan,
};

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source).into_iter().map(|token| token.kind).collect()
}

#[test]
fn declaration_tokens() {
    assert_eq!(
        kinds("int x = 42;"),
        vec![
            TokenKind::Keyword(Keyword::Int),
            TokenKind::Identifier,
            TokenKind::Operator(Operator::Assign),
            TokenKind::Number,
            TokenKind::Punctuation(Punctuation::Semicolon),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn compound_operators_are_single_tokens() {
    assert_eq!(
        kinds("a ?? b += c++ => d"),
        vec![
            TokenKind::Identifier,
            TokenKind::Operator(Operator::Coalesce),
            TokenKind::Identifier,
            TokenKind::Operator(Operator::PlusAssign),
            TokenKind::Identifier,
            TokenKind::Operator(Operator::PlusPlus),
            TokenKind::Operator(Operator::FatArrow),
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn comments_are_skipped() {
    let tokens = tokenize("// heading\nx /* inline */ y");
    let lexemes: Vec<&str> = tokens.iter().map(|token| token.lexeme.as_str()).collect();
    assert_eq!(lexemes, vec!["x", "y", ""]);
}

#[test]
fn string_literal_styles() {
    let tokens = tokenize(r#""a\"b" @"C:\dir" 'x' $"Hi {name}!""#);
    assert_eq!(tokens[0].kind, TokenKind::String(StringStyle::Regular));
    assert_eq!(tokens[0].lexeme, "a\"b");
    assert_eq!(tokens[1].kind, TokenKind::String(StringStyle::Verbatim));
    assert_eq!(tokens[1].lexeme, r"C:\dir");
    assert_eq!(tokens[2].kind, TokenKind::String(StringStyle::Char));
    assert_eq!(tokens[2].lexeme, "x");
    assert_eq!(
        tokens[3].kind,
        TokenKind::String(StringStyle::Interpolated { verbatim: false })
    );
    assert_eq!(tokens[3].lexeme, "Hi {name}!");
}

#[test]
fn escapes_are_decoded() {
    let tokens = tokenize(r#""tab\there\n" '\''"#);
    assert_eq!(tokens[0].lexeme, "tab\there\n");
    assert_eq!(tokens[1].lexeme, "'");
}

#[test]
fn unterminated_string_stops_at_line_end() {
    let tokens = tokenize("\"abc\nnext");
    assert_eq!(tokens[0].kind, TokenKind::String(StringStyle::Regular));
    assert_eq!(tokens[0].lexeme, "abc");
    assert_eq!(tokens[1].kind, TokenKind::Identifier);
    assert_eq!(tokens[1].lexeme, "next");
}

#[test]
fn number_lexemes_keep_fraction_and_suffix() {
    let tokens = tokenize("3.14 1_000 2.5f x.Length");
    assert_eq!(tokens[0].lexeme, "3.14");
    assert_eq!(tokens[1].lexeme, "1000");
    assert_eq!(tokens[2].lexeme, "2.5f");
    assert_eq!(tokens[3].kind, TokenKind::Identifier);
    assert_eq!(tokens[4].kind, TokenKind::Operator(Operator::Dot));
}

#[test]
fn offset_shifts_spans() {
    let tokens = Lexer::new("ab cd").with_offset(10).tokenize();
    assert_eq!(tokens[0].span, SourceSpan::new(10, 12));
    assert_eq!(tokens[1].span, SourceSpan::new(13, 15));
    assert_eq!(tokens[2].kind, TokenKind::Eof);
}
