use crate::error::{LexError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    /// Identifiers and keywords; the parser tells them apart.
    Word(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "++", "--",
    "=>", "+", "-", "*", "/", "%", "<", ">", "=", "!", "(", ")", "{", "}", "[", "]", ",", ";",
    ":", ".", "?",
];

pub struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn tokenize(text: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer {
            src: text.as_bytes(),
            text,
            pos: 0,
            line: 1,
            col: 1,
        };
        let mut tokens = Vec::new();
        loop {
            lexer.skip_trivia()?;
            let span = lexer.span();
            let Some(&ch) = lexer.src.get(lexer.pos) else {
                tokens.push(Token { tok: Tok::Eof, span });
                return Ok(tokens);
            };
            let tok = if ch.is_ascii_digit()
                || (ch == b'.' && lexer.peek(1).is_some_and(|c| c.is_ascii_digit()))
            {
                lexer.number()?
            } else if ch == b'"' || ch == b'\'' {
                lexer.string(ch)?
            } else if ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$' {
                lexer.word()
            } else {
                lexer.punct()?
            };
            tokens.push(Token { tok, span });
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            span: self.span(),
            message: message.into(),
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // count chars, not UTF-8 continuation bytes
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek(0) {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.span();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(0), self.peek(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(LexError {
                                    span: start,
                                    message: "unterminated block comment".into(),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() || c == b'.' {
                self.bump();
            } else if (c == b'e' || c == b'E')
                && self
                    .peek(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == b'-' || n == b'+')
            {
                self.bump();
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.error(format!("invalid number literal `{literal}`")))
    }

    fn string(&mut self, quote: u8) -> Result<Tok, LexError> {
        let start = self.span();
        self.bump();
        let mut out = Vec::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(LexError {
                    span: start,
                    message: "unterminated string literal".into(),
                });
            };
            match ch {
                c if c == quote => break,
                b'\n' => {
                    return Err(LexError {
                        span: start,
                        message: "newline in string literal".into(),
                    });
                }
                b'\\' => {
                    let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    out.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'0' => 0,
                        other => other,
                    });
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out)
            .map(Tok::Str)
            .map_err(|_| self.error("string literal is not valid UTF-8"))
    }

    fn word(&mut self) -> Tok {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
                self.bump();
            } else {
                break;
            }
        }
        Tok::Word(self.text[start..self.pos].to_string())
    }

    fn punct(&mut self) -> Result<Tok, LexError> {
        let rest = &self.src[self.pos..];
        let Some(p) = PUNCTUATORS.iter().find(|p| rest.starts_with(p.as_bytes())) else {
            let ch = self.text[self.pos..].chars().next().unwrap_or('?');
            return Err(self.error(format!("unexpected character `{ch}`")));
        };
        for _ in 0..p.len() {
            self.bump();
        }
        Ok(Tok::Punct(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn tokenizes_operators_longest_first() {
        assert_eq!(
            toks("a === b !== c => d"),
            vec![
                Tok::Word("a".into()),
                Tok::Punct("==="),
                Tok::Word("b".into()),
                Tok::Punct("!=="),
                Tok::Word("c".into()),
                Tok::Punct("=>"),
                Tok::Word("d".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let tokens = Lexer::tokenize("// hi\n/* multi\nline */ x").unwrap();

        assert_eq!(tokens[0].tok, Tok::Word("x".into()));
        assert_eq!(tokens[0].span, Span { line: 3, col: 9 });
    }

    #[test]
    fn reads_numbers_and_escaped_strings() {
        assert_eq!(
            toks(r#"1.5 .25 2e3 'it\'s' "a\nb""#),
            vec![
                Tok::Number(1.5),
                Tok::Number(0.25),
                Tok::Number(2000.0),
                Tok::Str("it's".into()),
                Tok::Str("a\nb".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string_position() {
        let err = Lexer::tokenize("let s = 'oops").unwrap_err();

        assert_eq!(err.span, Span { line: 1, col: 9 });
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(Lexer::tokenize("a # b").is_err());
    }
}
