use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Expression AST
// ---------------------------------------------------------------------------

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// Dotted model path, leading dots included (`.name`, `..`, `order.total`).
    Path(String),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negation,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    LogicalAnd,
    LogicalOr,
    Contains,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Addition => "+",
            BinaryOperator::Subtraction => "-",
            BinaryOperator::Multiplication => "*",
            BinaryOperator::Division => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equality => "==",
            BinaryOperator::Inequality => "!=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::LogicalOr => "||",
            BinaryOperator::Contains => "contains",
        };
        write!(f, "{}", s)
    }
}

impl Expr {
    /// Visit every path in the expression, left to right.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Path(p) => out.push(p),
            Expr::Unary { operand, .. } => operand.collect_paths(out),
            Expr::Binary { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            _ => {}
        }
    }
}

/// A condition that failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot parse expression '{expression}': {message}")]
pub struct ExpressionError {
    pub expression: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn parse_expression(text: &str) -> Result<Expr, ExpressionError> {
    let error = |message: String| ExpressionError {
        expression: text.to_string(),
        message,
    };
    let tokens = tokenize(text).map_err(error)?;
    let mut parser = ExprParser::new(tokens);
    let expr = parser.parse_expr(0).map_err(error)?;
    if !parser.at_end() {
        return Err(error("unexpected tokens after expression".to_string()));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    True,
    False,
    Null,
    Path(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    BangEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    AmpAmp,
    PipePipe,
    Bang,
    Contains,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }

            // String literal, either quote style, backslash escapes
            '"' | '\'' => {
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < len {
                    match chars[i] {
                        '\\' if i + 1 < len => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        q if q == c => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        other => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::StringLit(s));
            }

            '0'..='9' => {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let n = num_str
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", num_str))?;
                tokens.push(Token::Number(n));
            }

            // Paths: leading dots, then identifier segments joined by dots
            '.' | 'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < len && chars[i] == '.' {
                    i += 1;
                }
                let dots = i - start;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                    if i + 1 < len
                        && chars[i] == '.'
                        && (chars[i + 1].is_alphanumeric() || chars[i + 1] == '_')
                    {
                        i += 1;
                    }
                }
                let word: String = chars[start..i].iter().collect();
                if dots > 0 && i < len && chars[i] == '.' {
                    return Err(format!("invalid path '{}.'", word));
                }
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::AmpAmp,
                    "or" => Token::PipePipe,
                    "not" => Token::Bang,
                    "contains" => Token::Contains,
                    _ => Token::Path(word),
                };
                tokens.push(token);
            }

            '=' | '!' | '>' | '<' => {
                i += 1;
                let followed_by_eq = i < len && chars[i] == '=';
                if followed_by_eq {
                    i += 1;
                }
                let token = match (c, followed_by_eq) {
                    ('=', true) => Token::EqEq,
                    ('!', true) => Token::BangEq,
                    ('>', true) => Token::GtEq,
                    ('<', true) => Token::LtEq,
                    ('!', false) => Token::Bang,
                    ('>', false) => Token::Gt,
                    ('<', false) => Token::Lt,
                    _ => return Err("use '==' for comparison".to_string()),
                };
                tokens.push(token);
            }
            '&' | '|' => {
                if i + 1 < len && chars[i + 1] == c {
                    i += 2;
                    tokens.push(if c == '&' { Token::AmpAmp } else { Token::PipePipe });
                } else {
                    return Err(format!("unexpected '{}'", c));
                }
            }

            '+' => { i += 1; tokens.push(Token::Plus); }
            '-' => { i += 1; tokens.push(Token::Minus); }
            '*' => { i += 1; tokens.push(Token::Star); }
            '/' => { i += 1; tokens.push(Token::Slash); }
            '%' => { i += 1; tokens.push(Token::Percent); }
            '(' => { i += 1; tokens.push(Token::LParen); }
            ')' => { i += 1; tokens.push(Token::RParen); }

            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

// Binding powers (precedence). Higher = tighter binding.
const BP_OR: u8 = 4;            // ||
const BP_AND: u8 = 6;           // &&
const BP_EQUALITY: u8 = 8;      // == !=
const BP_COMPARISON: u8 = 10;   // < > <= >= contains
const BP_ADDITIVE: u8 = 12;     // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16;        // ! -

impl ExprParser {
    fn new(tokens: Vec<Token>) -> Self {
        ExprParser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, String> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek() else { break };
            let Some((operator, l_bp, r_bp)) = infix(token) else { break };

            if l_bp < min_bp {
                break;
            }

            self.advance();
            let right = self.parse_expr(r_bp)?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, String> {
        let token = self
            .advance()
            .ok_or_else(|| "unexpected end of expression".to_string())?;

        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::StringLit(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Path(p) => Ok(Expr::Path(p)),

            Token::Bang => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::Negation,
                    operand: Box::new(operand),
                })
            }

            Token::LParen => {
                let expr = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err("expected ')'".to_string()),
                }
            }

            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

/// Infix operator and its (left, right) binding powers.
fn infix(token: &Token) -> Option<(BinaryOperator, u8, u8)> {
    let (op, bp) = match token {
        Token::PipePipe => (BinaryOperator::LogicalOr, BP_OR),
        Token::AmpAmp => (BinaryOperator::LogicalAnd, BP_AND),
        Token::EqEq => (BinaryOperator::Equality, BP_EQUALITY),
        Token::BangEq => (BinaryOperator::Inequality, BP_EQUALITY),
        Token::Gt => (BinaryOperator::GreaterThan, BP_COMPARISON),
        Token::Lt => (BinaryOperator::LessThan, BP_COMPARISON),
        Token::GtEq => (BinaryOperator::GreaterThanOrEqual, BP_COMPARISON),
        Token::LtEq => (BinaryOperator::LessThanOrEqual, BP_COMPARISON),
        Token::Contains => (BinaryOperator::Contains, BP_COMPARISON),
        Token::Plus => (BinaryOperator::Addition, BP_ADDITIVE),
        Token::Minus => (BinaryOperator::Subtraction, BP_ADDITIVE),
        Token::Star => (BinaryOperator::Multiplication, BP_MULTIPLICATIVE),
        Token::Slash => (BinaryOperator::Division, BP_MULTIPLICATIVE),
        Token::Percent => (BinaryOperator::Modulo, BP_MULTIPLICATIVE),
        _ => return None,
    };
    Some((op, bp, bp + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Box<Expr> {
        Box::new(Expr::Path(p.to_string()))
    }

    #[test]
    fn precedence() {
        let e = parse_expression("a + 2 * 3 > 10 && !done").unwrap();
        match e {
            Expr::Binary {
                operator: BinaryOperator::LogicalAnd,
                left,
                right,
            } => {
                assert!(matches!(
                    *left,
                    Expr::Binary {
                        operator: BinaryOperator::GreaterThan,
                        ..
                    }
                ));
                assert!(matches!(
                    *right,
                    Expr::Unary {
                        operator: UnaryOperator::LogicalNot,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn word_operators_and_contains() {
        let e = parse_expression("name contains 'Ada' or not active").unwrap();
        assert!(matches!(
            e,
            Expr::Binary {
                operator: BinaryOperator::LogicalOr,
                ..
            }
        ));
    }

    #[test]
    fn dotted_and_leading_dot_paths() {
        let e = parse_expression("..total >= order.limit").unwrap();
        assert_eq!(
            e,
            Expr::Binary {
                operator: BinaryOperator::GreaterThanOrEqual,
                left: path("..total"),
                right: path("order.limit"),
            }
        );
        assert_eq!(parse_expression(".").unwrap(), Expr::Path(".".into()));
        assert_eq!(e.paths(), vec!["..total", "order.limit"]);
    }

    #[test]
    fn errors_name_the_expression() {
        let err = parse_expression("a = 1").unwrap_err();
        assert_eq!(err.expression, "a = 1");
        assert!(parse_expression("(a > 1").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("a >").is_err());
    }
}
