//! Formula parser
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with operator precedence:
//!
//! ```text
//! expression  := conditional
//! conditional := or ( "?" expression ":" expression )?
//! or          := and ( "||" and )*
//! and         := equality ( "&&" equality )*
//! equality    := comparison ( ("==" | "!=") comparison )*
//! comparison  := term ( ("<" | ">" | "<=" | ">=") term )*
//! term        := factor ( ("+" | "-") factor )*
//! factor      := power ( ("*" | "/" | "%") power )*
//! power       := unary ( "^" power )?
//! unary       := ("-" | "+" | "!") unary | postfix
//! postfix     := primary ( "(" arguments? ")" | "[" expression "]" )*
//! ```

use super::tokenizer::Token;

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// `null` / `undefined`
    Null,
    /// A bare name such as `fields` or `related`
    Identifier(String),
    /// Lookup into a value table: `target[key]`
    Index { target: Box<Expr>, key: Box<Expr> },
    /// Function call: `NAMESPACE.name(arg1, arg2, ...)`
    FunctionCall { name: String, args: Vec<Expr> },
    /// Binary operation: left op right (`&&` and `||` included)
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: `-expr`, `+expr`, `!expr`
    UnaryOp { op: String, operand: Box<Expr> },
    /// `condition ? then : otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at token {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    /// Check if we've consumed all tokens
    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Peek at the current token
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Advance to the next token and return the current
    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.tokens.get(self.position - 1)
    }

    /// Check if current token matches and consume it
    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token, message: &str) -> Result<(), ParseError> {
        if self.match_token(expected) {
            Ok(())
        } else {
            Err(ParseError::new(message, self.position))
        }
    }

    /// Check if current token is any of the given operators
    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    /// Track nesting so hostile input cannot overflow the stack
    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::new(
                format!("Expression nested deeper than {} levels", self.max_depth),
                self.position,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.or()?;

        if !self.match_token(&Token::Question) {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect_token(&Token::Colon, "Expected ':' in conditional expression")?;
        let otherwise = self.expression()?;

        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Left-associative chain of binary operators at one precedence level
    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;

        while let Some(op) = self.match_any_operator(ops) {
            let right = next(self)?;
            left = Expr::BinaryOp {
                op: canonical_operator(&op).to_string(),
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["=", "==", "===", "!=", "!==", "<>"], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["<", ">", "<=", ">="], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/", "%"], Self::power)
    }

    /// Power: unary ( "^" power )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;

        if self.match_any_operator(&["^", "**"]).is_some() {
            self.enter()?;
            let right = self.power();
            self.leave();
            let right = right?;
            Ok(Expr::BinaryOp {
                op: "^".to_string(),
                left: Box::new(left),
                right: Box::new(right),
            })
        } else {
            Ok(left)
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = match self.match_any_operator(&["-", "+", "!"]) {
            Some(op) => self.unary().map(|operand| Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            }),
            None => self.postfix(),
        };
        self.leave();
        result
    }

    /// Postfix: primary ( "(" arguments? ")" | "[" expr "]" )*
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&Token::OpenParen) {
                let args = self.arguments()?;
                self.expect_token(&Token::CloseParen, "Expected ')' after function arguments")?;

                expr = match expr {
                    Expr::Identifier(name) => Expr::FunctionCall { name, args },
                    _ => {
                        return Err(ParseError::new(
                            "Only library functions can be called",
                            self.position,
                        ))
                    }
                };
            } else if self.match_token(&Token::OpenBracket) {
                let key = self.expression()?;
                self.expect_token(&Token::CloseBracket, "Expected ']' after lookup key")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    key: Box::new(key),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);
        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }

    /// Primary: NUMBER | STRING | IDENTIFIER | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                Ok(parse_identifier(name))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                self.expect_token(&Token::CloseParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

/// Keywords become literals; everything else stays a name
fn parse_identifier(name: String) -> Expr {
    match name.as_str() {
        "true" => Expr::Boolean(true),
        "false" => Expr::Boolean(false),
        "null" | "undefined" => Expr::Null,
        _ => Expr::Identifier(name),
    }
}

/// Collapse operator spellings that mean the same thing
fn canonical_operator(op: &str) -> &str {
    match op {
        "=" | "===" => "==",
        "!==" | "<>" => "!=",
        other => other,
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>, max_depth: usize) -> Result<Expr, ParseError> {
    Parser::new(tokens, max_depth).parse()
}
