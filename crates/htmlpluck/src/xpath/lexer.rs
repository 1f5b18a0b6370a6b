//! Tokenizer for XPath expressions

use crate::error::ExtractError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    ColonColon,
    Comma,
    Dot,
    DotDot,
    Star,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Name(String),
    Literal(String),
    Number(f64),
}

/// A token and the byte offset it starts at
pub(crate) type Spanned = (usize, Token);

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

pub(crate) fn tokenize(expression: &str) -> Result<Vec<Spanned>, ExtractError> {
    let syntax = |offset: usize, message: &str| ExtractError::Syntax {
        expression: expression.to_string(),
        offset,
        message: message.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '/' => {
                if chars.next_if(|&(_, n)| n == '/').is_some() {
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '|' => Token::Pipe,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            ',' => Token::Comma,
            '*' => Token::Star,
            '=' => Token::Eq,
            '+' => Token::Plus,
            '-' => Token::Minus,
            ':' => {
                if chars.next_if(|&(_, n)| n == ':').is_some() {
                    Token::ColonColon
                } else {
                    return Err(syntax(start, "unexpected ':'"));
                }
            }
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Neq
                } else {
                    return Err(syntax(start, "expected '=' after '!'"));
                }
            }
            '<' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '"' | '\'' => {
                let mut literal = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == c {
                        closed = true;
                        break;
                    }
                    literal.push(n);
                }
                if !closed {
                    return Err(syntax(start, "unterminated string literal"));
                }
                Token::Literal(literal)
            }
            '.' => {
                if chars.next_if(|&(_, n)| n == '.').is_some() {
                    Token::DotDot
                } else if chars.peek().is_some_and(|&(_, n)| n.is_ascii_digit()) {
                    let mut digits = String::from("0.");
                    while let Some((_, d)) = chars.next_if(|&(_, n)| n.is_ascii_digit()) {
                        digits.push(d);
                    }
                    Token::Number(digits.parse().map_err(|_| syntax(start, "invalid number"))?)
                } else {
                    Token::Dot
                }
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::from(c);
                let mut seen_dot = false;
                while let Some((_, d)) =
                    chars.next_if(|&(_, n)| n.is_ascii_digit() || (n == '.' && !seen_dot))
                {
                    seen_dot |= d == '.';
                    digits.push(d);
                }
                Token::Number(digits.parse().map_err(|_| syntax(start, "invalid number"))?)
            }
            c if is_name_start(c) => {
                let mut name = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_name_char(n)) {
                    name.push(n);
                }
                Token::Name(name)
            }
            other => {
                return Err(syntax(start, &format!("unexpected character {:?}", other)));
            }
        };
        tokens.push((start, token));
    }

    Ok(tokens)
}
