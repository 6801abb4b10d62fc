//! Lexer for the template language
//!
//! Template source is mostly literal text, so the lexer runs in two modes.
//! Text mode scans characters by hand: it tracks statement boundaries,
//! expands escapes, strips comments and recognises `@{...}`, `@name` and
//! `@end`. After a directive keyword it switches to header mode, which uses
//! a logos lexer for strings, operators and punctuation up to the end of the
//! line or an inline `:`.

use logos::Logos;

use crate::directive::DirectiveRegistry;
use crate::error::SyntaxError;
use crate::parser::ast::{Span, Token, TokenKind};

/// Characters that a backslash turns into themselves
const ESCAPABLE: &[char] = &[
    '@', '\\', '"', '\'', '(', ')', '=', '/', '*', '{', '}', ':', '#',
];

/// Tokens of a directive header (the rest of the line after `@name`)
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
pub enum HeaderToken {
    #[regex(r"\r\n|\n|\r")]
    Newline,

    #[regex(r"==|!=|>=|<=|>|<", |lex| lex.slice().to_string())]
    Operator(String),

    #[token("=")]
    Assign,

    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,

    #[regex(r#""([^"\\]|\\.|\\\n)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.|\\\n)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    /// A backslash-escaped single character
    #[regex(r"\\.", |lex| lex.slice()[1..].to_string())]
    Escaped(String),

    #[regex(r#"[^ \t\r\n"'()=,:<>!\\]+|!"#, |lex| lex.slice().to_string())]
    Word(String),
}

/// Strip the quotes of a string literal and expand its escapes
pub fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex a directive argument string into header tokens with byte spans
///
/// Used by the argument grammars; fails with the byte offset of the first
/// character that cannot start a token.
pub fn lex_header(input: &str) -> Result<Vec<(HeaderToken, Span)>, Span> {
    let mut tokens = Vec::new();
    for (result, span) in HeaderToken::lexer(input).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

/// Turn template source into tokens
///
/// With `strict` set, a directive keyword is only accepted at the start of a
/// statement: the start of input, the start of a line (after indentation) or
/// right after an inline `:`.
pub fn tokenize(
    source: &str,
    registry: &DirectiveRegistry,
    strict: bool,
) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(source, registry, strict);
    lexer.run()?;
    tracing::trace!(tokens = lexer.tokens.len(), "tokenized template");
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    source: &'a str,
    registry: &'a DirectiveRegistry,
    strict: bool,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    text: String,
    text_start: Mark,
    /// Only indentation since the last statement start
    at_boundary: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, registry: &'a DirectiveRegistry, strict: bool) -> Self {
        let start = Mark {
            pos: 0,
            line: 1,
            column: 1,
        };
        Self {
            source,
            registry,
            strict,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            text: String::new(),
            text_start: start,
            at_boundary: true,
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' => self.newline(),
                '\\' => self.escape(),
                '@' => self.at_sign()?,
                '/' if self.comment_allowed() && self.peek_nth(1) == Some('/') => {
                    self.line_comment()
                }
                '/' if self.comment_allowed() && self.peek_nth(1) == Some('*') => {
                    self.block_comment()
                }
                _ => {
                    let mark = self.mark();
                    self.bump();
                    self.push_text(mark, c);
                    if !c.is_whitespace() {
                        self.at_boundary = false;
                    }
                }
            }
        }
        self.flush_text();
        let mark = self.mark();
        self.push(TokenKind::Eof, String::new(), mark);
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    /// Consume one character, keeping line and column current
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            // `\r\n` counts once, on the `\n`
            '\r' if self.peek() != Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            '\r' => {}
            _ => self.column += 1,
        }
        Some(c)
    }

    fn advance_to(&mut self, pos: usize) {
        while self.pos < pos {
            if self.bump().is_none() {
                break;
            }
        }
    }

    fn push_text(&mut self, mark: Mark, c: char) {
        if self.text.is_empty() {
            self.text_start = mark;
        }
        self.text.push(c);
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let start = self.text_start;
        self.tokens.push(Token {
            kind: TokenKind::Text,
            text,
            line: start.line,
            column: start.column,
            span: start.pos..self.pos,
        });
    }

    fn push(&mut self, kind: TokenKind, text: String, start: Mark) {
        self.tokens.push(Token {
            kind,
            text,
            line: start.line,
            column: start.column,
            span: start.pos..self.pos,
        });
    }

    fn error(&self, message: impl Into<String>, start: Mark, end: usize) -> SyntaxError {
        SyntaxError::new(message, start.line, start.column, start.pos..end)
    }

    /// Indentation before a statement is layout, not output
    fn drop_indentation(&mut self) {
        if self.at_boundary {
            self.text.clear();
        }
    }

    /// `//` and `/*` open a comment only at a statement start or after
    /// whitespace, so `https://host` stays text
    fn comment_allowed(&self) -> bool {
        self.at_boundary || self.text.ends_with([' ', '\t'])
    }

    fn newline(&mut self) {
        self.flush_text();
        let mark = self.mark();
        let mut text = String::new();
        if let Some(c) = self.bump() {
            text.push(c);
            if c == '\r' && self.peek() == Some('\n') {
                self.bump();
                text.push('\n');
            }
        }
        self.push(TokenKind::Newline, text, mark);
        self.at_boundary = true;
    }

    fn escape(&mut self) {
        let mark = self.mark();
        self.bump();
        self.at_boundary = false;
        match self.peek() {
            Some('n') => {
                self.bump();
                self.push_text(mark, '\n');
            }
            Some('t') => {
                self.bump();
                self.push_text(mark, '\t');
            }
            Some('r') => {
                self.bump();
                self.push_text(mark, '\r');
            }
            Some(c) if ESCAPABLE.contains(&c) => {
                self.bump();
                self.push_text(mark, c);
            }
            Some(c) if c != '\n' && c != '\r' => {
                self.bump();
                self.push_text(mark, '\\');
                self.text.push(c);
            }
            _ => self.push_text(mark, '\\'),
        }
    }

    fn line_comment(&mut self) {
        if self.at_boundary {
            // A whole-line comment disappears together with its newline
            self.drop_indentation();
            while let Some(c) = self.bump() {
                if c == '\n' || (c == '\r' && self.peek() != Some('\n')) {
                    break;
                }
            }
        } else {
            let trimmed = self.text.trim_end_matches([' ', '\t']).len();
            self.text.truncate(trimmed);
            while let Some(c) = self.peek() {
                if c == '\n' || c == '\r' {
                    break;
                }
                self.bump();
            }
        }
    }

    fn block_comment(&mut self) {
        let whole_line = self.at_boundary;
        if whole_line {
            self.drop_indentation();
        }
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                None => return,
                Some('*') if self.peek_nth(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    break;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        if whole_line {
            let rest = &self.source[self.pos..];
            let spaces = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            let after = &rest[spaces..];
            let newline = if after.starts_with("\r\n") {
                2
            } else if after.starts_with(['\n', '\r']) {
                1
            } else {
                0
            };
            if newline > 0 || after.is_empty() {
                self.advance_to(self.pos + spaces + newline);
            }
        }
    }

    fn preceded_by_word_char(&self) -> bool {
        self.text
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    /// An `@` right after a word character is text (`me@example.com`)
    fn at_sign(&mut self) -> Result<(), SyntaxError> {
        match self.peek_nth(1) {
            Some('{') => self.variable(),
            Some(c) if c.is_ascii_alphabetic() && !self.preceded_by_word_char() => self.keyword(),
            _ => {
                let mark = self.mark();
                self.bump();
                self.push_text(mark, '@');
                self.at_boundary = false;
                Ok(())
            }
        }
    }

    fn variable(&mut self) -> Result<(), SyntaxError> {
        let mark = self.mark();
        let inner_start = self.pos + 2;
        let Some(close) = self.source[inner_start..].find('}') else {
            return Err(self.error(
                "Unterminated variable reference: expected '}' after '@{'",
                mark,
                inner_start,
            ));
        };
        let path = self.source[inner_start..inner_start + close].trim().to_string();
        self.flush_text();
        self.advance_to(inner_start + close + 1);
        self.push(TokenKind::Variable, path, mark);
        self.at_boundary = false;
        Ok(())
    }

    fn keyword(&mut self) -> Result<(), SyntaxError> {
        let mark = self.mark();
        let name_start = self.pos + 1;
        let name_len = self.source[name_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.source.len() - name_start);
        let name = self.source[name_start..name_start + name_len].to_string();
        let end = name_start + name_len;

        if name == "end" {
            self.drop_indentation();
            self.flush_text();
            self.advance_to(end);
            self.push(TokenKind::End, name, mark);
            self.at_boundary = false;
            return Ok(());
        }

        if !self.registry.contains(&name) {
            return Err(self.error(
                format!(
                    "Unknown directive '@{}'. Escape the '@' as '\\@' to write it literally",
                    name
                ),
                mark,
                end,
            ));
        }

        if self.strict && !self.at_boundary {
            return Err(self.error(
                format!("Directive '@{}' must be at the start of a statement", name),
                mark,
                end,
            ));
        }

        self.drop_indentation();
        self.flush_text();
        self.advance_to(end);
        self.push(TokenKind::Directive, name, mark);
        self.header()
    }

    /// Lex the directive header up to a newline, an inline `:` or end of input
    fn header(&mut self) -> Result<(), SyntaxError> {
        let base = self.pos;
        let rest = &self.source[base..];
        let mut depth = 0usize;

        for (result, span) in HeaderToken::lexer(rest).spanned() {
            self.advance_to(base + span.start);
            let mark = self.mark();
            let slice = &rest[span.clone()];
            let token = match result {
                Ok(token) => token,
                Err(()) => {
                    let message = if slice.starts_with(['"', '\'']) {
                        "Unterminated string literal".to_string()
                    } else {
                        format!("Unexpected character '{}' in directive arguments", slice)
                    };
                    return Err(self.error(message, mark, base + span.end));
                }
            };
            self.advance_to(base + span.end);

            let (kind, text) = match token {
                HeaderToken::Newline => {
                    self.push(TokenKind::Newline, slice.to_string(), mark);
                    self.at_boundary = true;
                    return Ok(());
                }
                HeaderToken::Colon if depth == 0 => {
                    self.push(TokenKind::Colon, ":".to_string(), mark);
                    while matches!(self.peek(), Some(' ') | Some('\t')) {
                        self.bump();
                    }
                    self.at_boundary = true;
                    return Ok(());
                }
                HeaderToken::Colon => (TokenKind::Colon, ":".to_string()),
                HeaderToken::ParenOpen => {
                    depth += 1;
                    (TokenKind::ParenOpen, "(".to_string())
                }
                HeaderToken::ParenClose => {
                    depth = depth.saturating_sub(1);
                    (TokenKind::ParenClose, ")".to_string())
                }
                HeaderToken::Operator(op) => (TokenKind::Operator, op),
                HeaderToken::Assign => (TokenKind::Assign, "=".to_string()),
                HeaderToken::Comma => (TokenKind::Comma, ",".to_string()),
                HeaderToken::Str(s) => (TokenKind::String, s),
                HeaderToken::Escaped(s) | HeaderToken::Word(s) => (TokenKind::Word, s),
            };
            self.push(kind, text, mark);
        }

        self.advance_to(self.source.len());
        self.at_boundary = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        tokenize(input, &DirectiveRegistry::builtin(), true).expect("Should tokenize")
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_plain_text_is_one_run_per_line() {
        let tokens = lex("Hello  world\nsecond");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Text,
                TokenKind::Newline,
                TokenKind::Text,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[0].text, "Hello  world");
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 1);
    }

    #[test]
    fn test_variable_is_trimmed() {
        let tokens = lex("Hi @{ user.name }!");
        assert_eq!(tokens[1].kind, TokenKind::Variable);
        assert_eq!(tokens[1].text, "user.name");
        assert_eq!(tokens[2].text, "!");
    }

    #[test]
    fn test_unterminated_variable() {
        let err = tokenize("Hi @{name", &DirectiveRegistry::builtin(), true).unwrap_err();
        assert!(err.message.contains("Unterminated variable"));
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn test_directive_header_tokens() {
        assert_eq!(
            kinds("@if a == \"x\" and (b)\n"),
            vec![
                TokenKind::Directive,
                TokenKind::Word,
                TokenKind::Operator,
                TokenKind::String,
                TokenKind::Word,
                TokenKind::ParenOpen,
                TokenKind::Word,
                TokenKind::ParenClose,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_are_greedy() {
        let tokens = lex("@if a >= 1 != b = c\n");
        let ops: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Operator | TokenKind::Assign))
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(ops, vec![">=", "!=", "="]);
    }

    #[test]
    fn test_unknown_directive_suggests_escaping() {
        let err = tokenize("@bogus x", &DirectiveRegistry::builtin(), true).unwrap_err();
        assert!(err.message.contains("Unknown directive '@bogus'"));
        assert!(err.message.contains("\\@"));
    }

    #[test]
    fn test_email_address_is_text() {
        assert_eq!(kinds("mail me@example.com"), vec![TokenKind::Text, TokenKind::Eof]);
    }

    #[test]
    fn test_at_before_non_letter_is_text() {
        let tokens = lex("price @ 5 and @");
        assert_eq!(tokens[0].text, "price @ 5 and @");
    }

    #[test]
    fn test_strict_mode_rejects_mid_line_directive() {
        let err = tokenize("text @if a\nx\n@end", &DirectiveRegistry::builtin(), true).unwrap_err();
        assert!(err.message.contains("must be at the start of a statement"));
    }

    #[test]
    fn test_lenient_mode_accepts_mid_line_directive() {
        let tokens = tokenize("text @if a\nx\n@end", &DirectiveRegistry::builtin(), false)
            .expect("Should tokenize");
        assert_eq!(tokens[0].text, "text ");
        assert!(tokens[1].is_directive("if"));
    }

    #[test]
    fn test_indented_directive_drops_indentation() {
        let tokens = lex("    @if a\n");
        assert!(tokens[0].is_directive("if"));
        assert_eq!(tokens[0].column, 5);
    }

    #[test]
    fn test_escapes() {
        let tokens = lex(r"\@if \n\t \q \\");
        assert_eq!(tokens[0].text, "@if \n\t \\q \\");
    }

    #[test]
    fn test_line_comment_removes_whole_line() {
        let tokens = lex("a\n// note\nb");
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn test_trailing_comment_keeps_newline() {
        let tokens = lex("a // note\nb");
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn test_url_is_not_a_comment() {
        let tokens = lex("see https://example.com/a");
        assert_eq!(tokens[0].text, "see https://example.com/a");
    }

    #[test]
    fn test_block_comment_unterminated_is_tolerated() {
        let tokens = lex("a /* never closed");
        assert_eq!(tokens[0].text, "a ");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_whole_line_block_comment() {
        let tokens = lex("a\n/* one\ntwo */\nb");
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn test_newline_conventions() {
        let tokens = lex("a\r\nb\rc\nd");
        let newlines: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(newlines, vec!["\r\n", "\r", "\n"]);
        assert_eq!(tokens.last().map(|t| t.line), Some(4));
    }

    #[test]
    fn test_multiline_string_in_header() {
        let tokens = lex("@section a(title=\"one\ntwo\")\nbody\n@end");
        let string = tokens
            .iter()
            .find(|t| t.kind == TokenKind::String)
            .expect("string token");
        assert_eq!(string.text, "one\ntwo");
        let body = tokens.iter().find(|t| t.text == "body").expect("body");
        assert_eq!(body.line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("@include \"base\n", &DirectiveRegistry::builtin(), true).unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
        assert_eq!((err.line, err.column), (1, 10));
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let tokens = lex(r#"@case "say \"hi\"""#);
        assert_eq!(tokens[1].text, "say \"hi\"");
    }

    #[test]
    fn test_inline_colon_ends_header() {
        assert_eq!(
            kinds("@if a: yes @end"),
            vec![
                TokenKind::Directive,
                TokenKind::Word,
                TokenKind::Colon,
                TokenKind::Text,
                TokenKind::End,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_nested_inline_directive_is_at_boundary() {
        let tokens = lex("@if a: @if b: yes");
        assert!(tokens[0].is_directive("if"));
        assert!(tokens[3].is_directive("if"));
    }

    #[test]
    fn test_token_dump_snapshot() {
        let dump = lex("Hi @{name}\n@if ok\n@end")
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        insta::assert_snapshot!(dump, @r###"
        1:1 Text "Hi "
        1:4 Variable "name"
        1:11 Newline "\n"
        2:1 Directive "if"
        2:5 Word "ok"
        2:7 Newline "\n"
        3:1 End "end"
        3:5 Eof ""
        "###);
    }

    #[test]
    fn test_lex_header_reports_bad_offset() {
        let err = lex_header("a \"open").unwrap_err();
        assert_eq!(err.start, 2);
    }
}
