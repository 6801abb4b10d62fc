//! Tokens of the condition expression language

use logos::Logos;

use crate::parser::lexer::unescape;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum ExprToken {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[token("and")]
    #[token("&&")]
    And,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("not")]
    #[token("!")]
    Not,
    #[token("in")]
    In,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    /// Dotted/bracketed variable path, e.g. `user.roles[0]` or `map["a b"]`
    #[regex(
        r#"[A-Za-z_$][A-Za-z0-9_$-]*(\.[A-Za-z0-9_$-]+|\[[0-9]+\]|\["[^"]*"\]|\['[^']*'\])*"#,
        |lex| lex.slice().to_string(),
        priority = 1
    )]
    Path(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<ExprToken> {
        ExprToken::lexer(input)
            .collect::<Result<Vec<_>, _>>()
            .expect("Should lex")
    }

    #[test]
    fn test_keywords_and_symbols_are_equivalent() {
        assert_eq!(lex("a and b"), lex("a && b"));
        assert_eq!(lex("not a or b"), lex("! a || b"));
    }

    #[test]
    fn test_keyword_prefix_is_a_path() {
        assert_eq!(
            lex("android or notes"),
            vec![
                ExprToken::Path("android".to_string()),
                ExprToken::Or,
                ExprToken::Path("notes".to_string()),
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            lex(r#"-1.5 'a' "b\"c" null"#),
            vec![
                ExprToken::Number(-1.5),
                ExprToken::Str("a".to_string()),
                ExprToken::Str("b\"c".to_string()),
                ExprToken::Null,
            ]
        );
    }

    #[test]
    fn test_bracketed_path() {
        assert_eq!(
            lex(r#"users[0].tags["x y"]"#),
            vec![ExprToken::Path(r#"users[0].tags["x y"]"#.to_string())]
        );
    }
}
