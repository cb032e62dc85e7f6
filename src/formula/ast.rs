//! Abstract syntax tree for parsed formulas.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Negate,
    /// Logical not.
    Not,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A whitelisted function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Smallest of two or more numbers.
    Min,
    /// Largest of two or more numbers.
    Max,
    /// `round(x)` or `round(x, places)`, half away from zero.
    Round,
    /// Absolute value.
    Abs,
}

impl Function {
    /// Looks up a function by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "round" => Some(Function::Round),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }

    /// The name used in formula source.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Round => "round",
            Function::Abs => "abs",
        }
    }

    /// Returns the accepted argument count range as `(min, max)`.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Min | Function::Max => (2, None),
            Function::Round => (1, Some(2)),
            Function::Abs => (1, Some(1)),
        }
    }
}

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A numeric literal.
    Number(Decimal),
    /// A boolean literal.
    Boolean(bool),
    /// A variable reference.
    Variable(String),
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `condition ? then_branch : else_branch`
    Conditional {
        /// Must evaluate to a boolean.
        condition: Box<Expr>,
        /// Value when the condition holds.
        then_branch: Box<Expr>,
        /// Value otherwise.
        else_branch: Box<Expr>,
    },
    /// A whitelisted function call.
    Call {
        /// The function.
        function: Function,
        /// The arguments.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Returns every variable identifier referenced by the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) | Expr::Boolean(_) => {}
            Expr::Variable(name) => {
                names.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.collect_variables(names);
                then_branch.collect_variables(names);
                else_branch.collect_variables(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Boolean(b) => write!(f, "{}", b),
            Expr::Variable(name) => f.write_str(name),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Negate => write!(f, "(-{})", operand),
                UnaryOp::Not => write!(f, "(!{})", operand),
            },
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "({} ? {} : {})", condition, then_branch, else_branch),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
