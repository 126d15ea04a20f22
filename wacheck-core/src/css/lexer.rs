//! CSS tokenizer.
//!
//! The token grammar is a priority-ordered pattern table. Patterns claim text
//! one rule at a time: every occurrence of the first pattern is claimed,
//! then the next pattern only sees the spans still unclaimed, and so on down
//! the table. Comments, SGML markers and string/URL literals therefore win
//! over identifier, number and punctuation patterns that would also match
//! inside them. Whatever no pattern claims becomes a `Delim` token, one per
//! character, so tokenizing never fails.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    AtKeyword,
    ImportSym,
    MediaSym,
    PageSym,
    FontFaceSym,
    CharsetSym,
    ImportantSym,
    String,
    Hash,
    Number,
    Percentage,
    Dimension,
    Uri,
    UnicodeRange,
    Function,
    Semicolon,
    Colon,
    Comma,
    Slash,
    Plus,
    Star,
    Minus,
    Gt,
    Eq,
    Dot,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Includes,
    DashMatch,
    Delim,
}

/// A token and the byte range of the source text it was read from.
///
/// Equality ignores the span.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, span: Range<usize>) -> Self {
        Token {
            kind,
            text: text.to_string(),
            span,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl Eq for Token {}

static AT_KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "@import" => TokenKind::ImportSym,
    "@media" => TokenKind::MediaSym,
    "@page" => TokenKind::PageSym,
    "@font-face" => TokenKind::FontFaceSym,
    "@charset" => TokenKind::CharsetSym,
};

#[derive(Debug, Clone, Copy)]
enum Action {
    Discard,
    Emit(TokenKind),
    AtKeyword,
    QuotedString,
    Url,
}

struct Rule {
    pattern: Regex,
    action: Action,
    /// Number-like and unicode-range patterns must not start in the middle
    /// of a name, so that `col-2x` or `.MENU+DIV` stay whole.
    at_word_start: bool,
}

const W: &str = r"[ \t\r\n\f]*";
const NONASCII: &str = r"[^\x00-\x7F]";
const UNICODE: &str = r"\\[0-9a-fA-F]{1,6}(?:\r\n|[ \n\r\t\f])?";
const NUM: &str = r"[0-9]*\.[0-9]+|[0-9]+";

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let escape = format!(r"(?:{UNICODE}|\\[^\n\r\f0-9a-fA-F])");
    let nmstart = format!(r"(?:[_a-zA-Z]|{NONASCII}|{escape})");
    let nmchar = format!(r"(?:[_a-zA-Z0-9\-]|{NONASCII}|{escape})");
    let ident = format!(r"-?{nmstart}{nmchar}*");
    let nl = r"(?:\n|\r\n|\r|\f)";
    let string1 = format!(r#""(?:[^\n\r\f\\"]|\\{nl}|{escape})*""#);
    let string2 = format!(r#"'(?:[^\n\r\f\\']|\\{nl}|{escape})*'"#);
    let string = format!(r"(?:{string1}|{string2})");
    let url_chars = format!(r"(?:[!#$%&*-\[\]-~]|{NONASCII}|{escape})*");

    let table: Vec<(String, Action, bool)> = vec![
        (r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/".to_string(), Action::Discard, false),
        (format!(r"@{ident}"), Action::AtKeyword, false),
        (format!(r"!{W}(?i:important)"), Action::Emit(TokenKind::ImportantSym), false),
        (format!(r"#{nmchar}+"), Action::Emit(TokenKind::Hash), false),
        (
            format!(r"(?i:url)\({W}(?:{string}|{url_chars}){W}\)"),
            Action::Url,
            false,
        ),
        (string, Action::QuotedString, false),
        (
            r"U\+[0-9a-fA-F?]{1,6}(?:-[0-9a-fA-F]{1,6})?".to_string(),
            Action::Emit(TokenKind::UnicodeRange),
            true,
        ),
        (format!(r"{ident}\("), Action::Emit(TokenKind::Function), false),
        (format!(r"(?:{NUM})%"), Action::Emit(TokenKind::Percentage), true),
        (format!(r"(?:{NUM}){ident}"), Action::Emit(TokenKind::Dimension), true),
        (ident, Action::Emit(TokenKind::Ident), false),
        (NUM.to_string(), Action::Emit(TokenKind::Number), true),
        (r"<!--".to_string(), Action::Discard, false),
        (r"-->".to_string(), Action::Discard, false),
        (r";".to_string(), Action::Emit(TokenKind::Semicolon), false),
        (r":".to_string(), Action::Emit(TokenKind::Colon), false),
        (r",".to_string(), Action::Emit(TokenKind::Comma), false),
        (r"\{".to_string(), Action::Emit(TokenKind::LBrace), false),
        (r"\}".to_string(), Action::Emit(TokenKind::RBrace), false),
        (r"\(".to_string(), Action::Emit(TokenKind::LParen), false),
        (r"\)".to_string(), Action::Emit(TokenKind::RParen), false),
        (r"\[".to_string(), Action::Emit(TokenKind::LBracket), false),
        (r"\]".to_string(), Action::Emit(TokenKind::RBracket), false),
        (r"[ \t\r\n\f]+".to_string(), Action::Discard, false),
        (r"~=".to_string(), Action::Emit(TokenKind::Includes), false),
        (r"\|=".to_string(), Action::Emit(TokenKind::DashMatch), false),
        (r"/".to_string(), Action::Emit(TokenKind::Slash), false),
        (r"\+".to_string(), Action::Emit(TokenKind::Plus), false),
        (r"\*".to_string(), Action::Emit(TokenKind::Star), false),
        (r"-".to_string(), Action::Emit(TokenKind::Minus), false),
        (r">".to_string(), Action::Emit(TokenKind::Gt), false),
        (r"=".to_string(), Action::Emit(TokenKind::Eq), false),
        (r"\.".to_string(), Action::Emit(TokenKind::Dot), false),
    ];

    table
        .into_iter()
        .filter_map(|(source, action, at_word_start)| match Regex::new(&source) {
            Ok(pattern) => Some(Rule {
                pattern,
                action,
                at_word_start,
            }),
            Err(err) => {
                tracing::error!("CSS token pattern {:?} does not compile: {}", source, err);
                None
            }
        })
        .collect()
});

enum Piece {
    Open(Range<usize>),
    Claimed(Option<Token>),
}

/// Splits `text` into tokens. Whitespace and comments produce no tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut pieces = vec![Piece::Open(0..text.len())];

    for rule in RULES.iter() {
        let mut next = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece {
                Piece::Open(range) => claim(text, range, rule, &mut next),
                claimed => next.push(claimed),
            }
        }
        pieces = next;
    }

    let mut tokens = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Claimed(Some(token)) => tokens.push(token),
            Piece::Claimed(None) => {}
            Piece::Open(range) => {
                for (offset, ch) in text[range.clone()].char_indices() {
                    let start = range.start + offset;
                    let end = start + ch.len_utf8();
                    tokens.push(Token::new(TokenKind::Delim, &text[start..end], start..end));
                }
            }
        }
    }
    tokens
}

fn claim(text: &str, range: Range<usize>, rule: &Rule, out: &mut Vec<Piece>) {
    let haystack = &text[..range.end];
    let mut open_from = range.start;
    let mut search_from = range.start;

    while search_from < range.end {
        let Some(m) = rule.pattern.find_at(haystack, search_from) else {
            break;
        };
        if m.start() == m.end() {
            search_from = next_char_boundary(text, m.start());
            continue;
        }
        if rule.at_word_start && !starts_word(text, m.start()) {
            search_from = next_char_boundary(text, m.start());
            continue;
        }
        if m.start() > open_from {
            out.push(Piece::Open(open_from..m.start()));
        }
        out.push(Piece::Claimed(make_token(rule.action, m.as_str(), m.range())));
        open_from = m.end();
        search_from = m.end();
    }

    if open_from < range.end {
        out.push(Piece::Open(open_from..range.end));
    }
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map_or(text.len(), |ch| at + ch.len_utf8())
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || !ch.is_ascii()
}

fn starts_word(text: &str, at: usize) -> bool {
    let mut before = text[..at].chars().rev();
    match before.next() {
        None => true,
        Some('-') => !before.next().is_some_and(is_name_char),
        Some(ch) => !is_name_char(ch),
    }
}

fn make_token(action: Action, text: &str, span: Range<usize>) -> Option<Token> {
    match action {
        Action::Discard => None,
        Action::Emit(kind) => Some(Token::new(kind, text, span)),
        Action::AtKeyword => {
            let kind = AT_KEYWORDS
                .get(text.to_ascii_lowercase().as_str())
                .copied()
                .unwrap_or(TokenKind::AtKeyword);
            Some(Token::new(kind, text, span))
        }
        Action::QuotedString => Some(Token::new(TokenKind::String, unquote(text), span)),
        Action::Url => {
            let inner = text
                .get(4..text.len() - 1)
                .unwrap_or_default()
                .trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n' | '\x0C'));
            Some(Token::new(TokenKind::Uri, unquote(inner), span))
        }
    }
}

fn unquote(text: &str) -> &str {
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted { &text[1..text.len() - 1] } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(text: &str) -> Vec<(TokenKind, std::string::String)> {
        tokenize(text)
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn tok(kind: TokenKind, text: &str) -> (TokenKind, std::string::String) {
        (kind, text.to_string())
    }

    #[test]
    fn comments_and_whitespace_produce_no_tokens() {
        assert_eq!(
            kinds("/* c */ a { color: red; }"),
            vec![
                tok(Ident, "a"),
                tok(LBrace, "{"),
                tok(Ident, "color"),
                tok(Colon, ":"),
                tok(Ident, "red"),
                tok(Semicolon, ";"),
                tok(RBrace, "}"),
            ]
        );
    }

    #[test]
    fn at_keywords_are_classified() {
        assert_eq!(
            kinds("@import @MEDIA @page @font-face @charset @namespace"),
            vec![
                tok(ImportSym, "@import"),
                tok(MediaSym, "@MEDIA"),
                tok(PageSym, "@page"),
                tok(FontFaceSym, "@font-face"),
                tok(CharsetSym, "@charset"),
                tok(AtKeyword, "@namespace"),
            ]
        );
    }

    #[test]
    fn literals_claim_text_before_names() {
        assert_eq!(
            kinds(r#"url( "a b.css" ) url(x.png) 'it''s' "url(y)""#),
            vec![
                tok(Uri, "a b.css"),
                tok(Uri, "x.png"),
                tok(String, "it"),
                tok(String, "s"),
                tok(Delim, "\""),
                tok(Uri, "y"),
                tok(Delim, "\""),
            ]
        );
    }

    #[test]
    fn comments_outrank_strings() {
        assert_eq!(
            kinds(r#"a "/* x */" b"#),
            vec![tok(Ident, "a"), tok(Delim, "\""), tok(Delim, "\""), tok(Ident, "b")]
        );
    }

    #[test]
    fn numbers_and_units() {
        assert_eq!(
            kinds("12px 50% .5em 3 -2px"),
            vec![
                tok(Dimension, "12px"),
                tok(Percentage, "50%"),
                tok(Dimension, ".5em"),
                tok(Number, "3"),
                tok(Minus, "-"),
                tok(Dimension, "2px"),
            ]
        );
    }

    #[test]
    fn digits_inside_names_stay_in_the_name() {
        assert_eq!(
            kinds("h1 .col-2x #a1b"),
            vec![tok(Ident, "h1"), tok(Dot, "."), tok(Ident, "col-2x"), tok(Hash, "#a1b")]
        );
    }

    #[test]
    fn unicode_ranges_only_start_a_word() {
        assert_eq!(
            kinds("U+0041-005A U+4?? .menu+div u+a .MENU+DIV"),
            vec![
                tok(UnicodeRange, "U+0041-005A"),
                tok(UnicodeRange, "U+4??"),
                tok(Dot, "."),
                tok(Ident, "menu"),
                tok(Plus, "+"),
                tok(Ident, "div"),
                tok(Ident, "u"),
                tok(Plus, "+"),
                tok(Ident, "a"),
                tok(Dot, "."),
                tok(Ident, "MENU"),
                tok(Plus, "+"),
                tok(Ident, "DIV"),
            ]
        );
    }

    #[test]
    fn selector_punctuation() {
        assert_eq!(
            kinds("ul>li+a[rel~=x][lang|=en]:lang(fr), *"),
            vec![
                tok(Ident, "ul"),
                tok(Gt, ">"),
                tok(Ident, "li"),
                tok(Plus, "+"),
                tok(Ident, "a"),
                tok(LBracket, "["),
                tok(Ident, "rel"),
                tok(Includes, "~="),
                tok(Ident, "x"),
                tok(RBracket, "]"),
                tok(LBracket, "["),
                tok(Ident, "lang"),
                tok(DashMatch, "|="),
                tok(Ident, "en"),
                tok(RBracket, "]"),
                tok(Colon, ":"),
                tok(Function, "lang("),
                tok(Ident, "fr"),
                tok(RParen, ")"),
                tok(Comma, ","),
                tok(Star, "*"),
            ]
        );
    }

    #[test]
    fn important_and_hash_colors() {
        assert_eq!(
            kinds("color:#FFF ! important"),
            vec![
                tok(Ident, "color"),
                tok(Colon, ":"),
                tok(Hash, "#FFF"),
                tok(ImportantSym, "! important"),
            ]
        );
    }

    #[test]
    fn sgml_markers_are_dropped_and_unknown_characters_become_delims() {
        assert_eq!(
            kinds("<!-- a { } --> $"),
            vec![tok(Ident, "a"), tok(LBrace, "{"), tok(RBrace, "}"), tok(Delim, "$")]
        );
    }

    #[test]
    fn spans_point_into_the_source() {
        let text = "p  /* x */ {}";
        let tokens = tokenize(text);
        assert_eq!(tokens[0].span, 0..1);
        assert_eq!(&text[tokens[1].span.clone()], "{");
        assert_eq!(tokens[1].span.start, 11);
    }

    #[test]
    fn retokenizing_is_deterministic() {
        let text = "@media print { a:link { color: #00f !important } }";
        assert_eq!(tokenize(text), tokenize(text));
    }
}
