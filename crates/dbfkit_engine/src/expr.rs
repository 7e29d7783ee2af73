//! dBASE expression compiler and evaluator.
//!
//! Expressions are compiled once against a table's field list and then
//! evaluated per record. The grammar, lowest precedence first:
//!
//! ```text
//! or      := and { (.OR. | OR) and }
//! and     := not { (.AND. | AND) not }
//! not     := (.NOT. | NOT | !) not | compare
//! compare := sum [ (= | == | <> | # | != | < | <= | > | >= | $) sum ]
//! sum     := product { (+ | -) product }
//! product := unary { (* | /) unary }
//! unary   := - unary | primary
//! primary := number | string | .T. | .F. | field | func(args) | ( or )
//! ```

use crate::error::{EngineError, EngineResult};
use crate::value::{FieldDef, Value};
use std::cmp::Ordering;

/// Access to the record an expression is evaluated against.
pub trait RecordContext {
    /// Returns the value of a field by position.
    fn value(&self, field: usize) -> Value;
    /// Returns whether the record is soft-deleted.
    fn is_deleted(&self) -> bool;
    /// Returns the record number, 0 at a boundary.
    fn recno(&self) -> u32;
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Field(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    ExactEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Upper,
    Lower,
    Trim,
    Ltrim,
    Alltrim,
    Left,
    Right,
    Substr,
    Str,
    Val,
    Dtos,
    Deleted,
    Recno,
    Iif,
}

impl Func {
    fn lookup(name: &str) -> Option<(Self, usize, usize)> {
        let found = match name {
            "UPPER" => (Self::Upper, 1, 1),
            "LOWER" => (Self::Lower, 1, 1),
            "TRIM" | "RTRIM" => (Self::Trim, 1, 1),
            "LTRIM" => (Self::Ltrim, 1, 1),
            "ALLTRIM" => (Self::Alltrim, 1, 1),
            "LEFT" => (Self::Left, 2, 2),
            "RIGHT" => (Self::Right, 2, 2),
            "SUBSTR" => (Self::Substr, 2, 3),
            "STR" => (Self::Str, 1, 3),
            "VAL" => (Self::Val, 1, 1),
            "DTOS" => (Self::Dtos, 1, 1),
            "DELETED" => (Self::Deleted, 0, 0),
            "RECNO" => (Self::Recno, 0, 0),
            "IIF" => (Self::Iif, 3, 3),
            _ => return None,
        };
        Some(found)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Logical(bool),
    Ident(String),
    Op(&'static str),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 14] = [
    "==", "<>", "!=", "<=", ">=", "=", "#", "<", ">", "$", "+", "-", "*", "/",
];

fn tokenize(source: &str) -> EngineResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if c == '"' || c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&x| x == c)
                .ok_or_else(|| EngineError::expression("unterminated string literal"))?;
            tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| EngineError::expression(format!("bad number '{text}'")))?;
            tokens.push(Token::Number(n));
        } else if c == '.' {
            let end = chars[i + 1..]
                .iter()
                .position(|&x| x == '.')
                .ok_or_else(|| EngineError::expression("unterminated dotted operator"))?;
            let word: String = chars[i + 1..i + 1 + end].iter().collect();
            let token = match word.to_ascii_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                "T" | "Y" => Token::Logical(true),
                "F" | "N" => Token::Logical(false),
                other => {
                    return Err(EngineError::expression(format!("unknown operator .{other}.")))
                }
            };
            tokens.push(token);
            i += end + 2;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect::<String>().to_ascii_uppercase();
            tokens.push(match word.as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                _ => Token::Ident(word),
            });
        } else if c == '!' && chars.get(i + 1) != Some(&'=') {
            tokens.push(Token::Not);
            i += 1;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .copied()
                .find(|op| rest.starts_with(op))
                .ok_or_else(|| EngineError::expression(format!("unexpected character '{c}'")))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    fields: &'a [FieldDef],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, want: &Token) -> EngineResult<()> {
        match self.next() {
            Some(ref t) if t == want => Ok(()),
            Some(t) => Err(EngineError::expression(format!("expected {want:?}, found {t:?}"))),
            None => Err(EngineError::expression(format!("expected {want:?} at end of input"))),
        }
    }

    fn or(&mut self) -> EngineResult<Node> {
        let mut node = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            node = Node::Binary(BinOp::Or, Box::new(node), Box::new(self.and()?));
        }
        Ok(node)
    }

    fn and(&mut self) -> EngineResult<Node> {
        let mut node = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            node = Node::Binary(BinOp::And, Box::new(node), Box::new(self.not()?));
        }
        Ok(node)
    }

    fn not(&mut self) -> EngineResult<Node> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.not()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> EngineResult<Node> {
        let left = self.sum()?;
        let op = match self.peek() {
            Some(Token::Op("=")) => BinOp::Eq,
            Some(Token::Op("==")) => BinOp::ExactEq,
            Some(Token::Op("<>" | "#" | "!=")) => BinOp::Ne,
            Some(Token::Op("<")) => BinOp::Lt,
            Some(Token::Op("<=")) => BinOp::Le,
            Some(Token::Op(">")) => BinOp::Gt,
            Some(Token::Op(">=")) => BinOp::Ge,
            Some(Token::Op("$")) => BinOp::Contains,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.sum()?;
        Ok(Node::Binary(op, Box::new(left), Box::new(right)))
    }

    fn sum(&mut self) -> EngineResult<Node> {
        let mut node = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinOp::Add,
                Some(Token::Op("-")) => BinOp::Sub,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.product()?));
        }
    }

    fn product(&mut self) -> EngineResult<Node> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinOp::Mul,
                Some(Token::Op("/")) => BinOp::Div,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> EngineResult<Node> {
        if self.peek() == Some(&Token::Op("-")) {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> EngineResult<Node> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Node::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Node::Literal(Value::Char(s))),
            Some(Token::Logical(b)) => Ok(Node::Literal(Value::Logical(b))),
            Some(Token::LParen) => {
                let node = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(node)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(&name);
                }
                self.fields
                    .iter()
                    .position(|f| f.name == name)
                    .map(Node::Field)
                    .ok_or_else(|| EngineError::expression(format!("unknown field {name}")))
            }
            Some(t) => Err(EngineError::expression(format!("unexpected token {t:?}"))),
            None => Err(EngineError::expression("unexpected end of expression")),
        }
    }

    fn call(&mut self, name: &str) -> EngineResult<Node> {
        let (func, min, max) = Func::lookup(name)
            .ok_or_else(|| EngineError::expression(format!("unknown function {name}()")))?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        if args.len() < min || args.len() > max {
            return Err(EngineError::expression(format!(
                "{name}() takes {min}..={max} arguments, got {}",
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }
}

impl Expr {
    /// Compiles an expression against a table's fields.
    pub fn compile(source: &str, fields: &[FieldDef]) -> EngineResult<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(EngineError::expression("empty expression"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            fields,
        };
        let root = parser.or()?;
        if let Some(t) = parser.peek() {
            return Err(EngineError::expression(format!("unexpected trailing {t:?}")));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Returns the expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression.
    pub fn eval(&self, record: &dyn RecordContext, case_insensitive: bool) -> EngineResult<Value> {
        eval(&self.root, record, case_insensitive)
    }

    /// Evaluates the expression, requiring a logical result.
    pub fn eval_bool(&self, record: &dyn RecordContext, case_insensitive: bool) -> EngineResult<bool> {
        let value = self.eval(record, case_insensitive)?;
        value.as_bool().ok_or_else(|| {
            EngineError::expression(format!(
                "'{}' yields {}, not logical",
                self.source,
                value.type_name()
            ))
        })
    }
}

fn type_error(what: &str, value: &Value) -> EngineError {
    EngineError::expression(format!("{what} cannot take a {} value", value.type_name()))
}

fn fold(s: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        s.to_ascii_uppercase()
    } else {
        s.to_string()
    }
}

fn number(value: Value, what: &str) -> EngineResult<f64> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(type_error(what, &other)),
    }
}

fn text(value: Value, what: &str) -> EngineResult<String> {
    match value {
        Value::Char(s) => Ok(s),
        other => Err(type_error(what, &other)),
    }
}

fn logical(value: Value, what: &str) -> EngineResult<bool> {
    match value {
        Value::Logical(b) => Ok(b),
        other => Err(type_error(what, &other)),
    }
}

fn eval(node: &Node, record: &dyn RecordContext, ci: bool) -> EngineResult<Value> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Field(i) => Ok(record.value(*i)),
        Node::Neg(inner) => Ok(Value::Number(-number(eval(inner, record, ci)?, "-")?)),
        Node::Not(inner) => Ok(Value::Logical(!logical(eval(inner, record, ci)?, ".NOT.")?)),
        Node::Binary(BinOp::And, l, r) => {
            // Short-circuit like the dBASE runtime.
            if !logical(eval(l, record, ci)?, ".AND.")? {
                return Ok(Value::Logical(false));
            }
            Ok(Value::Logical(logical(eval(r, record, ci)?, ".AND.")?))
        }
        Node::Binary(BinOp::Or, l, r) => {
            if logical(eval(l, record, ci)?, ".OR.")? {
                return Ok(Value::Logical(true));
            }
            Ok(Value::Logical(logical(eval(r, record, ci)?, ".OR.")?))
        }
        Node::Binary(op, l, r) => binary(*op, eval(l, record, ci)?, eval(r, record, ci)?, ci),
        Node::Call(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, record, ci)?);
            }
            call(*func, values, record)
        }
    }
}

fn binary(op: BinOp, left: Value, right: Value, ci: bool) -> EngineResult<Value> {
    match op {
        BinOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Char(a), Value::Char(b)) => Ok(Value::Char(a + &b)),
            (a, _) => Err(type_error("+", &a)),
        },
        BinOp::Sub => Ok(Value::Number(number(left, "-")? - number(right, "-")?)),
        BinOp::Mul => Ok(Value::Number(number(left, "*")? * number(right, "*")?)),
        BinOp::Div => {
            let divisor = number(right, "/")?;
            if divisor == 0.0 {
                return Err(EngineError::expression("division by zero"));
            }
            Ok(Value::Number(number(left, "/")? / divisor))
        }
        BinOp::Contains => {
            let needle = fold(&text(left, "$")?, ci);
            let haystack = fold(&text(right, "$")?, ci);
            Ok(Value::Logical(haystack.contains(&needle)))
        }
        _ => compare(op, &left, &right, ci).map(Value::Logical),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value, ci: bool) -> EngineResult<bool> {
    let ordering = match (left, right) {
        (Value::Char(a), Value::Char(b)) => {
            let (a, b) = (fold(a, ci), fold(b, ci));
            match op {
                // Inexact equality: the left side only needs to start with the right.
                BinOp::Eq | BinOp::Ne => {
                    let equal = a.starts_with(b.as_str()) || a.trim_end() == b.trim_end();
                    return Ok(equal == (op == BinOp::Eq));
                }
                BinOp::ExactEq => return Ok(a.trim_end() == b.trim_end()),
                _ => a.cmp(&b),
            }
        }
        (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::Logical(a), Value::Logical(b)) => match op {
            BinOp::Eq | BinOp::ExactEq => return Ok(a == b),
            BinOp::Ne => return Ok(a != b),
            _ => return Err(type_error("ordering comparison", left)),
        },
        (a, b) => {
            return Err(EngineError::expression(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    Ok(match op {
        BinOp::Eq | BinOp::ExactEq => ordering == Ordering::Equal,
        BinOp::Ne => ordering != Ordering::Equal,
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("non-comparison operator {op:?}"),
    })
}

fn count_arg(value: Option<Value>, what: &str, default: usize) -> EngineResult<usize> {
    match value {
        Some(v) => Ok(number(v, what)?.max(0.0) as usize),
        None => Ok(default),
    }
}

fn call(func: Func, args: Vec<Value>, record: &dyn RecordContext) -> EngineResult<Value> {
    let mut args = args.into_iter();
    let mut arg = || args.next();
    let missing = || EngineError::expression("missing argument");
    let value = match func {
        Func::Deleted => Value::Logical(record.is_deleted()),
        Func::Recno => Value::Number(f64::from(record.recno())),
        Func::Upper => Value::Char(text(arg().ok_or_else(missing)?, "UPPER()")?.to_uppercase()),
        Func::Lower => Value::Char(text(arg().ok_or_else(missing)?, "LOWER()")?.to_lowercase()),
        Func::Trim => Value::Char(text(arg().ok_or_else(missing)?, "TRIM()")?.trim_end().to_string()),
        Func::Ltrim => {
            Value::Char(text(arg().ok_or_else(missing)?, "LTRIM()")?.trim_start().to_string())
        }
        Func::Alltrim => Value::Char(text(arg().ok_or_else(missing)?, "ALLTRIM()")?.trim().to_string()),
        Func::Left => {
            let s = text(arg().ok_or_else(missing)?, "LEFT()")?;
            let n = count_arg(arg(), "LEFT()", 0)?;
            Value::Char(s.chars().take(n).collect())
        }
        Func::Right => {
            let s = text(arg().ok_or_else(missing)?, "RIGHT()")?;
            let n = count_arg(arg(), "RIGHT()", 0)?;
            let skip = s.chars().count().saturating_sub(n);
            Value::Char(s.chars().skip(skip).collect())
        }
        Func::Substr => {
            let s = text(arg().ok_or_else(missing)?, "SUBSTR()")?;
            let start = count_arg(arg(), "SUBSTR()", 1)?.max(1);
            let len = count_arg(arg(), "SUBSTR()", usize::MAX)?;
            Value::Char(s.chars().skip(start - 1).take(len).collect())
        }
        Func::Str => {
            let n = number(arg().ok_or_else(missing)?, "STR()")?;
            let width = count_arg(arg(), "STR()", 10)?;
            let decimals = count_arg(arg(), "STR()", 0)?;
            let s = format!("{n:>width$.decimals$}");
            if s.len() > width {
                Value::Char("*".repeat(width))
            } else {
                Value::Char(s)
            }
        }
        Func::Val => {
            let s = text(arg().ok_or_else(missing)?, "VAL()")?;
            let trimmed = s.trim();
            let end = trimmed
                .char_indices()
                .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
                .count();
            Value::Number(trimmed[..end].parse::<f64>().unwrap_or(0.0))
        }
        Func::Dtos => match arg().ok_or_else(missing)? {
            Value::Date(d) => Value::Char(format!("{d:<8}")),
            other => return Err(type_error("DTOS()", &other)),
        },
        Func::Iif => {
            let condition = logical(arg().ok_or_else(missing)?, "IIF()")?;
            let when_true = arg().ok_or_else(missing)?;
            let when_false = arg().ok_or_else(missing)?;
            if condition {
                when_true
            } else {
                when_false
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        values: Vec<Value>,
        deleted: bool,
        recno: u32,
    }

    impl RecordContext for Row {
        fn value(&self, field: usize) -> Value {
            self.values[field].clone()
        }
        fn is_deleted(&self) -> bool {
            self.deleted
        }
        fn recno(&self) -> u32 {
            self.recno
        }
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::character("NAME", 10),
            FieldDef::numeric("BALANCE", 8, 2),
            FieldDef::logical("ACTIVE"),
            FieldDef::date("JOINED"),
        ]
    }

    fn row() -> Row {
        Row {
            values: vec![
                Value::Char("Smith     ".into()),
                Value::Number(42.5),
                Value::Logical(true),
                Value::Date("20230115".into()),
            ],
            deleted: false,
            recno: 7,
        }
    }

    fn check(source: &str) -> bool {
        Expr::compile(source, &fields())
            .unwrap()
            .eval_bool(&row(), true)
            .unwrap()
    }

    #[test]
    fn comparisons_and_logic() {
        assert!(check("BALANCE > 0"));
        assert!(check("balance >= 42.5 .AND. active"));
        assert!(check("BALANCE < 0 .OR. .NOT. BALANCE = 1"));
        assert!(check("NOT (BALANCE <> 42.5)"));
        assert!(check("BALANCE * 2 = 85"));
        assert!(!check("-BALANCE > 0"));
    }

    #[test]
    fn inexact_string_equality() {
        assert!(check("NAME = 'SM'"));
        assert!(!check("NAME == 'SM'"));
        assert!(check("NAME == 'SMITH'"));
        assert!(check("'MIT' $ NAME"));
        assert!(check("UPPER(TRIM(NAME)) + '!' = 'SMITH!'"));
    }

    #[test]
    fn functions() {
        assert!(check("DTOS(JOINED) >= '20230101'"));
        assert!(check("RECNO() = 7 .AND. .NOT. DELETED()"));
        assert!(check("STR(BALANCE, 6, 1) = '  42.5'"));
        assert!(check("VAL('12abc') = 12"));
        assert!(check("SUBSTR(NAME, 2, 3) = 'mit'"));
        assert!(check("LEFT(NAME, 2) == 'SM' .AND. RIGHT(TRIM(NAME), 2) == 'TH'"));
        assert!(check("IIF(ACTIVE, 1, 2) = 1"));
    }

    #[test]
    fn case_sensitivity_follows_setting() {
        let expr = Expr::compile("NAME = 'SMITH'", &fields()).unwrap();
        assert!(expr.eval_bool(&row(), true).unwrap());
        assert!(!expr.eval_bool(&row(), false).unwrap());
    }

    #[test]
    fn compile_errors() {
        for bad in ["", "BALANCE >", "NOSUCH = 1", "FOO(1)", "'open", "(1 + 2", "1 2", ".XOR."] {
            assert!(
                matches!(Expr::compile(bad, &fields()), Err(EngineError::Expression { .. })),
                "{bad} should not compile"
            );
        }
    }

    #[test]
    fn runtime_type_errors() {
        let expr = Expr::compile("NAME + 1", &fields()).unwrap();
        assert!(expr.eval(&row(), true).is_err());
        let expr = Expr::compile("BALANCE", &fields()).unwrap();
        assert!(expr.eval_bool(&row(), true).is_err());
        let expr = Expr::compile("BALANCE / 0 > 1", &fields()).unwrap();
        assert!(expr.eval(&row(), true).is_err());
    }
}
