//! Recursive-descent parser for formula expressions.
//!
//! Precedence, loosest first:
//!
//! ```text
//! ternary      cond ? a : b        (right associative)
//! or           ||
//! and          &&
//! equality     == !=
//! comparison   > >= < <=
//! additive     + -
//! term         * /
//! unary        - !
//! primary      number | true | false | identifier | call | ( expr )
//! ```

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::lexer::{Token, TokenKind, syntax, tokenize};
use crate::error::EngineResult;

/// Maximum nesting depth accepted before parsing fails.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parses formula source into an [`Expr`].
///
/// # Example
///
/// ```
/// use payroll_engine::formula::parse;
///
/// let ast = parse("overtimeHours * (basicSalary / 200) * 1.5").unwrap();
/// let vars: Vec<_> = ast.variables().into_iter().collect();
/// assert_eq!(vars, vec!["basicSalary", "overtimeHours"]);
///
/// assert!(parse("basicSalary *").is_err());
/// ```
pub fn parse(source: &str) -> EngineResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        current: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::End {
        return Err(syntax(trailing.position, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    fn expression(&mut self) -> EngineResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(syntax(
                self.peek().position,
                format!("expression nests deeper than {} levels", MAX_NESTING_DEPTH),
            ));
        }
        let expr = self.ternary();
        self.depth -= 1;
        expr
    }

    fn ternary(&mut self) -> EngineResult<Expr> {
        let condition = self.or()?;
        if !self.matches(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_branch = self.expression()?;
        self.expect(&TokenKind::Colon, "expected ':' in conditional")?;
        let else_branch = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn or(&mut self) -> EngineResult<Expr> {
        let mut left = self.and()?;
        while self.matches(&TokenKind::OrOr) {
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> EngineResult<Expr> {
        let mut left = self.equality()?;
        while self.matches(&TokenKind::AndAnd) {
            let right = self.equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> EngineResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> EngineResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> EngineResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right);
        }
    }

    fn term(&mut self) -> EngineResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> EngineResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(syntax(
                self.peek().position,
                format!("expression nests deeper than {} levels", MAX_NESTING_DEPTH),
            ));
        }
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn primary(&mut self) -> EngineResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::True => Ok(Expr::Boolean(true)),
            TokenKind::False => Ok(Expr::Boolean(false)),
            TokenKind::Identifier(name) => {
                if self.peek().kind == TokenKind::LeftParen {
                    self.call(name, token.position)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::LeftParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::End => Err(syntax(token.position, "unexpected end of expression")),
            other => Err(syntax(
                token.position,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    fn call(&mut self, name: String, position: usize) -> EngineResult<Expr> {
        let function = Function::from_name(&name)
            .ok_or_else(|| syntax(position, format!("unknown function '{}'", name)))?;
        self.advance();

        let mut args = Vec::new();
        if !self.matches(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if self.matches(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RightParen, "expected ',' or ')' in argument list")?;
                break;
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{}", min),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(syntax(
                position,
                format!(
                    "function '{}' expects {} argument(s), found {}",
                    name,
                    expected,
                    args.len()
                ),
            ));
        }

        Ok(Expr::Call { function, args })
    }

    fn peek(&self) -> &Token {
        // The token stream always ends with `End`, and `advance` never moves past it.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.current += 1;
        }
        token
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> EngineResult<()> {
        if self.matches(kind) {
            Ok(())
        } else {
            Err(syntax(self.peek().position, message))
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
