//! 分区过滤表达式
//!
//! ```text
//! expr    := and_expr ( OR and_expr )*
//! and_expr:= primary ( AND primary )*
//! primary := '(' expr ')'
//!          | IDENT op literal
//!          | IDENT IN '(' literal ( ',' literal )* ')'
//! op      := = | <> | != | < | <= | > | >=
//! literal := 'string' | "string" | integer
//! ```
//!
//! 不带引号的字面量按整数比较，带引号的按字符串比较。分区值不是整数却和整数比较时
//! 记为类型错误，和匹配结果一起返回。

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn apply<T: Ord>(self, left: T, right: T) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        column: String,
        op: CompareOp,
        literal: Literal,
    },
    In {
        column: String,
        values: Vec<Literal>,
    },
}

/// 表达式语法错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for SyntaxError {}

/// 一次求值的结果：是否匹配，以及可能出现的类型错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub matched: bool,
    pub type_error: Option<String>,
}

/// 分区列：名字、类型、值
#[derive(Debug, Clone, Copy)]
pub struct PartitionColumnValue<'a> {
    pub name: &'a str,
    pub data_type: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone)]
pub struct PartitionFilter {
    expr: String,
    root: Expr,
}

impl PartitionFilter {
    pub fn parse(expr: &str) -> Result<Self, SyntaxError> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: expr.len(),
        };
        let root = parser.parse_or()?;
        if let Some((pos, token)) = parser.tokens.get(parser.pos) {
            return Err(SyntaxError {
                position: *pos,
                message: format!("unexpected token {:?}", token),
            });
        }

        Ok(Self {
            expr: expr.to_string(),
            root,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn evaluate(&self, columns: &[PartitionColumnValue<'_>]) -> FilterResult {
        let mut errors = BTreeMap::new();
        let matched = eval(&self.root, columns, &mut errors);
        let type_error = if errors.is_empty() {
            None
        } else {
            Some(errors.into_values().collect::<Vec<_>>().join(";"))
        };
        FilterResult {
            matched,
            type_error,
        }
    }
}

fn eval(expr: &Expr, columns: &[PartitionColumnValue<'_>], errors: &mut BTreeMap<String, String>) -> bool {
    match expr {
        // 两边都求值，保证类型错误不会被短路吞掉
        Expr::And(l, r) => {
            let l = eval(l, columns, errors);
            let r = eval(r, columns, errors);
            l && r
        }
        Expr::Or(l, r) => {
            let l = eval(l, columns, errors);
            let r = eval(r, columns, errors);
            l || r
        }
        Expr::Compare {
            column,
            op,
            literal,
        } => {
            let Some(col) = columns.iter().find(|c| c.name == column) else {
                return false;
            };
            match literal {
                Literal::Str(s) => op.apply(col.value, s.as_str()),
                Literal::Int(n) => match col.value.parse::<i64>() {
                    Ok(v) => op.apply(v, *n),
                    Err(_) => {
                        errors.insert(
                            column.clone(),
                            format!(
                                "value {} of {} ({}) is not int value, string must wrap using \" or '",
                                col.value, column, col.data_type
                            ),
                        );
                        false
                    }
                },
            }
        }
        Expr::In { column, values } => {
            let Some(col) = columns.iter().find(|c| c.name == column) else {
                return false;
            };
            values.iter().any(|v| match v {
                Literal::Str(s) => col.value == s,
                Literal::Int(n) => col.value == n.to_string(),
            })
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SyntaxError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((pos, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((pos, Token::RParen));
                i += 1;
            }
            ',' => {
                tokens.push((pos, Token::Comma));
                i += 1;
            }
            '=' => {
                tokens.push((pos, Token::Op(CompareOp::Eq)));
                i += 1;
            }
            '!' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push((pos, Token::Op(CompareOp::Ne)));
                    i += 2;
                } else {
                    return Err(SyntaxError {
                        position: pos,
                        message: "token recognition error at: '!'".to_string(),
                    });
                }
            }
            '<' => match chars.get(i + 1) {
                Some((_, '=')) => {
                    tokens.push((pos, Token::Op(CompareOp::Le)));
                    i += 2;
                }
                Some((_, '>')) => {
                    tokens.push((pos, Token::Op(CompareOp::Ne)));
                    i += 2;
                }
                _ => {
                    tokens.push((pos, Token::Op(CompareOp::Lt)));
                    i += 1;
                }
            },
            '>' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push((pos, Token::Op(CompareOp::Ge)));
                    i += 2;
                } else {
                    tokens.push((pos, Token::Op(CompareOp::Gt)));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        Some((_, ch)) if *ch == quote => break,
                        Some((_, ch)) => {
                            value.push(*ch);
                            j += 1;
                        }
                        None => {
                            return Err(SyntaxError {
                                position: pos,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                    }
                }
                tokens.push((pos, Token::Str(value)));
                i = j + 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut j = i + 1;
                while matches!(chars.get(j), Some((_, ch)) if ch.is_ascii_digit()) {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let text = &input[pos..end];
                let n = text.parse::<i64>().map_err(|_| SyntaxError {
                    position: pos,
                    message: format!("invalid integer literal {}", text),
                })?;
                tokens.push((pos, Token::Int(n)));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while matches!(chars.get(j), Some((_, ch)) if ch.is_alphanumeric() || *ch == '_') {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let word = &input[pos..end];
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((pos, token));
                i = j;
            }
            '`' => {
                let mut j = i + 1;
                let mut name = String::new();
                while let Some((_, ch)) = chars.get(j) {
                    if *ch == '`' {
                        break;
                    }
                    name.push(*ch);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(SyntaxError {
                        position: pos,
                        message: "unterminated quoted identifier".to_string(),
                    });
                }
                tokens.push((pos, Token::Ident(name)));
                i = j + 1;
            }
            other => {
                return Err(SyntaxError {
                    position: pos,
                    message: format!("token recognition error at: '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(self.error(format!("expected {:?}, found {:?}", expected, t))),
            None => Err(self.error(format!("expected {:?}, found end of input", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(column)) => match self.next() {
                Some(Token::Op(op)) => {
                    let literal = self.parse_literal()?;
                    Ok(Expr::Compare {
                        column,
                        op,
                        literal,
                    })
                }
                Some(Token::In) => {
                    self.expect(Token::LParen)?;
                    let mut values = vec![self.parse_literal()?];
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        values.push(self.parse_literal()?);
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::In { column, values })
                }
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    Err(self.error(format!("expected operator after {}", column)))
                }
            },
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {:?}", other)))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, SyntaxError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Int(n)) => Ok(Literal::Int(n)),
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("expected literal, found {:?}", other)))
            }
            None => Err(self.error("expected literal, found end of input")),
        }
    }
}
