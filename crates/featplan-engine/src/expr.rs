//! Small row-expression evaluator for the in-memory engine.
//!
//! Expressions are opaque strings at the compiler layer; this is where
//! they finally get interpreted. Supported: column references, integer,
//! float and single-quoted string literals (with `''` escaping), unary
//! minus, `+ - * /`, parentheses, and the functions `unix_timestamp(e)`
//! and `format_time(e, 'pattern')` used to derive declared timestamp
//! fields from the internal event time.

use featplan_core::prelude::*;
use featplan_core::time::format_millis;

/// Evaluate `expr` per row, cast to `result_type`, and add or replace the
/// column `result_name`.
pub fn evaluate(
    table: &Table,
    expr: &str,
    result_name: &str,
    result_type: &DataType,
) -> Result<Table> {
    let ast = Parser::new(expr)?.parse()?;
    let mut values = Vec::with_capacity(table.num_rows());
    for row_idx in 0..table.num_rows() {
        let raw = eval(&ast, table, row_idx)?;
        values.push(raw.cast(result_type)?);
    }
    Ok(table.with_column(Column::new(result_name, values)))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Scalar),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Scalar),
    Column(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    UnixTimestamp,
    FormatTime,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(Error::Expression(format!(
                "unexpected trailing token {:?}",
                tok
            ))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref tok) if tok == expected => Ok(()),
            other => Err(Error::Expression(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.factor()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.expr()?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    let func = match name.to_ascii_lowercase().as_str() {
                        "unix_timestamp" => Func::UnixTimestamp,
                        "format_time" => Func::FormatTime,
                        other => {
                            return Err(Error::Expression(format!(
                                "unknown function '{}'",
                                other
                            )))
                        }
                    };
                    Ok(Expr::Call { func, args })
                } else {
                    Ok(Expr::Column(name))
                }
            }
            other => Err(Error::Expression(format!(
                "unexpected token {:?} in expression",
                other
            ))),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' => {
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(Error::Expression(format!(
                                "unterminated string literal in '{}'",
                                src
                            )))
                        }
                    }
                }
                tokens.push(Token::Literal(Scalar::Str(s)));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        is_float = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let literal = if is_float {
                    text.parse::<f64>().ok().map(Scalar::F64)
                } else {
                    text.parse::<i64>().ok().map(Scalar::I64)
                };
                match literal {
                    Some(v) => tokens.push(Token::Literal(v)),
                    None => {
                        return Err(Error::Expression(format!("bad numeric literal '{}'", text)))
                    }
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Expression(format!(
                    "unexpected character '{}' in '{}'",
                    other, src
                )))
            }
        }
    }
    Ok(tokens)
}

fn eval(expr: &Expr, table: &Table, row_idx: usize) -> Result<Scalar> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(name) => {
            let col = table.require_column(name)?;
            Ok(col.values[row_idx].clone())
        }
        Expr::Neg(inner) => match eval(inner, table, row_idx)? {
            Scalar::Null => Ok(Scalar::Null),
            Scalar::I32(v) => Ok(Scalar::I32(-v)),
            Scalar::I64(v) => Ok(Scalar::I64(-v)),
            Scalar::F32(v) => Ok(Scalar::F32(-v)),
            Scalar::F64(v) => Ok(Scalar::F64(-v)),
            other => Err(Error::Expression(format!("cannot negate {:?}", other))),
        },
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, table, row_idx)?;
            let r = eval(rhs, table, row_idx)?;
            binary(*op, &l, &r)
        }
        Expr::Call { func, args } => call(*func, args, table, row_idx),
    }
}

fn binary(op: BinOp, l: &Scalar, r: &Scalar) -> Result<Scalar> {
    if l.is_null() || r.is_null() {
        return Ok(Scalar::Null);
    }
    let both_int = l.as_i64().is_some() && r.as_i64().is_some();
    if both_int && op != BinOp::Div {
        let (a, b) = (l.as_i64().unwrap_or(0), r.as_i64().unwrap_or(0));
        return Ok(Scalar::I64(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => unreachable!(),
        }));
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(Scalar::F64(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        })),
        _ => Err(Error::Expression(format!(
            "non-numeric operands {:?} and {:?}",
            l, r
        ))),
    }
}

fn call(func: Func, args: &[Expr], table: &Table, row_idx: usize) -> Result<Scalar> {
    match func {
        Func::UnixTimestamp => {
            let [arg] = args else {
                return Err(Error::Expression(
                    "unix_timestamp expects one argument".into(),
                ));
            };
            match eval(arg, table, row_idx)? {
                Scalar::Null => Ok(Scalar::Null),
                v => match v.as_i64() {
                    Some(ms) => Ok(Scalar::I64(ms.div_euclid(1000))),
                    None => Err(Error::Expression(format!(
                        "unix_timestamp expects epoch millis, got {:?}",
                        v
                    ))),
                },
            }
        }
        Func::FormatTime => {
            let [arg, pattern] = args else {
                return Err(Error::Expression(
                    "format_time expects (expr, 'pattern')".into(),
                ));
            };
            let Expr::Literal(Scalar::Str(pattern)) = pattern else {
                return Err(Error::Expression(
                    "format_time pattern must be a string literal".into(),
                ));
            };
            match eval(arg, table, row_idx)? {
                Scalar::Null => Ok(Scalar::Null),
                v => match v.as_i64() {
                    Some(ms) => Ok(Scalar::Str(format_millis(ms, pattern)?)),
                    None => Err(Error::Expression(format!(
                        "format_time expects epoch millis, got {:?}",
                        v
                    ))),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            Column::new("a", vec![Scalar::I64(4), Scalar::I64(10)]),
            Column::new("b", vec![Scalar::F64(0.5), Scalar::Null]),
            Column::new("__event_time", vec![Scalar::I64(10_000), Scalar::I64(20_000)]),
        ])
    }

    #[test]
    fn arithmetic_with_precedence() {
        let t = evaluate(&table(), "a + a * 2", "c", &DataType::Int64).unwrap();
        assert_eq!(
            t.column("c").unwrap().values,
            vec![Scalar::I64(12), Scalar::I64(30)]
        );
    }

    #[test]
    fn integer_and_float_literals() {
        let t = evaluate(&table(), "a * 1.5 + 2", "c", &DataType::Float64).unwrap();
        assert_eq!(
            t.column("c").unwrap().values,
            vec![Scalar::F64(8.0), Scalar::F64(17.0)]
        );
        assert!(matches!(
            evaluate(&table(), "a + 1.2.3", "c", &DataType::Float64),
            Err(Error::Expression(_))
        ));
    }

    #[test]
    fn null_propagates() {
        let t = evaluate(&table(), "a * b", "c", &DataType::Float64).unwrap();
        assert_eq!(
            t.column("c").unwrap().values,
            vec![Scalar::F64(2.0), Scalar::Null]
        );
    }

    #[test]
    fn result_is_cast_to_declared_type() {
        let t = evaluate(&table(), "a / 4", "c", &DataType::Int64).unwrap();
        assert_eq!(
            t.column("c").unwrap().values,
            vec![Scalar::I64(1), Scalar::I64(2)]
        );
    }

    #[test]
    fn time_functions() {
        let t = evaluate(
            &table(),
            "unix_timestamp(__event_time)",
            "ts",
            &DataType::Int64,
        )
        .unwrap();
        assert_eq!(
            t.column("ts").unwrap().values,
            vec![Scalar::I64(10), Scalar::I64(20)]
        );

        let t = evaluate(
            &table(),
            "format_time(__event_time, '%H:%M:%S')",
            "ts",
            &DataType::Utf8,
        )
        .unwrap();
        assert_eq!(
            t.column("ts").unwrap().values[0],
            Scalar::Str("00:00:10".into())
        );
    }

    #[test]
    fn unknown_column_is_schema_error() {
        let err = evaluate(&table(), "missing + 1", "c", &DataType::Int64).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn bad_syntax_is_expression_error() {
        let err = evaluate(&table(), "a +", "c", &DataType::Int64).unwrap_err();
        assert!(matches!(err, Error::Expression(_)));
    }
}
