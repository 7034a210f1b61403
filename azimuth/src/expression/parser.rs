//! Tokenizer and recursive descent parser for attribute expressions.

use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Identifier(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Negate(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Identifier(String),
    Punct(char),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ExpressionError> {
        let mut tokens = vec![];
        while let Some(&(pos, ch)) = self.chars.peek() {
            match ch {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '0'..='9' => tokens.push((pos, self.number()?)),
                '.' if self.next_is_digit() => tokens.push((pos, self.number()?)),
                '\'' | '"' => tokens.push((pos, self.string(ch)?)),
                c if is_identifier_start(c) => tokens.push((pos, self.identifier())),
                '[' | ']' | '{' | '}' | '(' | ')' | ',' | ':' | '.' | '-' => {
                    self.chars.next();
                    tokens.push((pos, Token::Punct(ch)));
                }
                _ => return Err(ExpressionError::UnexpectedChar { ch, pos }),
            }
        }

        Ok(tokens)
    }

    fn next_is_digit(&self) -> bool {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        matches!(lookahead.peek(), Some((_, c)) if c.is_ascii_digit())
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let mut text = String::new();
        let mut seen_dot = false;
        let mut start = 0;
        while let Some(&(pos, ch)) = self.chars.peek() {
            if text.is_empty() {
                start = pos;
            }
            match ch {
                '0'..='9' => text.push(ch),
                '.' if !seen_dot => {
                    seen_dot = true;
                    text.push(ch);
                }
                'e' | 'E' => {
                    text.push(ch);
                    self.chars.next();
                    if let Some(&(_, sign @ ('+' | '-'))) = self.chars.peek() {
                        text.push(sign);
                        self.chars.next();
                    }
                    continue;
                }
                _ => break,
            }
            self.chars.next();
        }

        text.parse()
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidNumber { pos: start })
    }

    fn string(&mut self, quote: char) -> Result<Token, ExpressionError> {
        let Some((start, _)) = self.chars.next() else {
            return Err(ExpressionError::UnexpectedEnd);
        };

        let mut text = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                c if c == quote => return Ok(Token::String(text)),
                c => text.push(c),
            }
        }

        Err(ExpressionError::UnterminatedString { pos: start })
    }

    fn identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if is_identifier_start(ch) || ch.is_ascii_digit() {
                text.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Identifier(text)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

/// Nesting limit of brackets, parentheses and unary minus.
const MAX_DEPTH: usize = 64;

pub(crate) struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub(crate) fn parse(source: &str) -> Result<Expr, ExpressionError> {
        let tokens = Lexer::new(source).tokenize()?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut parser = Self {
            tokens,
            position: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        match parser.tokens.get(parser.position) {
            None => Ok(expr),
            Some((pos, token)) => Err(ExpressionError::UnexpectedToken {
                token: describe(token),
                pos: *pos,
            }),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Result<(usize, Token), ExpressionError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: char) -> Result<(), ExpressionError> {
        let (pos, token) = self.advance()?;
        if token == Token::Punct(punct) {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                token: describe(&token),
                pos,
            })
        }
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        if self.depth == MAX_DEPTH {
            let pos = self.tokens.get(self.position).map_or(0, |(pos, _)| *pos);
            return Err(ExpressionError::TooDeep { pos });
        }

        self.depth += 1;
        let expr = self.operand();
        self.depth -= 1;
        expr
    }

    fn operand(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat('-') {
            return Ok(Expr::Negate(Box::new(self.expression()?)));
        }

        let mut expr = self.primary()?;
        loop {
            if self.eat('.') {
                let (pos, token) = self.advance()?;
                let Token::Identifier(name) = token else {
                    return Err(ExpressionError::UnexpectedToken {
                        token: describe(&token),
                        pos,
                    });
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat('[') {
                let index = self.expression()?;
                self.expect(']')?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat('(') {
                let args = self.sequence(')')?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let (pos, token) = self.advance()?;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::String(s) => Ok(Expr::String(s)),
            Token::Identifier(name) => Ok(match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" | "undefined" => Expr::Null,
                _ => Expr::Identifier(name),
            }),
            Token::Punct('[') => Ok(Expr::Array(self.sequence(']')?)),
            Token::Punct('{') => self.object(),
            Token::Punct('(') => {
                let inner = self.expression()?;
                self.expect(')')?;
                Ok(inner)
            }
            other => Err(ExpressionError::UnexpectedToken {
                token: describe(&other),
                pos,
            }),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = vec![];
        if self.eat(close) {
            return Ok(items);
        }

        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(',')?;
        }
    }

    fn object(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = vec![];
        if self.eat('}') {
            return Ok(Expr::Object(entries));
        }

        loop {
            let (pos, token) = self.advance()?;
            let key = match token {
                Token::Identifier(name) => name,
                Token::String(s) => s,
                Token::Number(n) => n.to_string(),
                other => {
                    return Err(ExpressionError::UnexpectedToken {
                        token: describe(&other),
                        pos,
                    })
                }
            };
            self.expect(':')?;
            entries.push((key, self.expression()?));

            if self.eat('}') {
                return Ok(Expr::Object(entries));
            }
            self.expect(',')?;
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => n.to_string(),
        Token::String(s) => format!("{s:?}"),
        Token::Identifier(name) => name.clone(),
        Token::Punct(c) => c.to_string(),
    }
}
