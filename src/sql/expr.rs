//! Expression evaluation over rows and groups

use super::functions;
use super::parser::TableRef;
use crate::error::{Result, SpeakSqlError};
use crate::frame::{parse_number, Number, Value};
use regex::Regex;
use sqlparser::ast::{
    visit_expressions, BinaryOperator, DuplicateTreatment, Expr, Function, FunctionArg,
    FunctionArgExpr, FunctionArguments, Ident, TrimWhereField, UnaryOperator,
    Value as SqlValue,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Column names visible to expressions, plus the table they came from
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    columns: Vec<String>,
    table: Option<TableRef>,
}

impl Bindings {
    pub fn new(columns: Vec<String>, table: Option<TableRef>) -> Self {
        Self { columns, table }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name).or_else(|| {
            self.columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
        })
    }

    pub fn qualifier_matches(&self, qualifier: &str) -> bool {
        self.table
            .as_ref()
            .map(|t| t.matches(qualifier))
            .unwrap_or(false)
    }

    /// Error for an unknown column, with the closest existing name as a hint
    pub fn no_such_column(&self, name: &str) -> SpeakSqlError {
        let lowered = name.to_lowercase();
        let suggestion = self
            .columns
            .iter()
            .map(|c| (c, strsim::normalized_levenshtein(&c.to_lowercase(), &lowered)))
            .filter(|(_, score)| *score >= 0.6)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        match suggestion {
            Some((column, _)) => SpeakSqlError::Query(format!(
                "no such column: {} (did you mean '{}'?)",
                name, column
            )),
            None => SpeakSqlError::Query(format!("no such column: {}", name)),
        }
    }
}

/// What an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Row(&'a [Value]),
    Group(&'a [&'a [Value]]),
}

#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub input: Input<'a>,
    /// Already computed output columns, consulted when a name is not a column
    pub outputs: Option<(&'a [String], &'a [Value])>,
}

impl<'a> Scope<'a> {
    pub fn row(row: &'a [Value]) -> Self {
        Self {
            input: Input::Row(row),
            outputs: None,
        }
    }

    pub fn group(rows: &'a [&'a [Value]]) -> Self {
        Self {
            input: Input::Group(rows),
            outputs: None,
        }
    }

    pub fn with_outputs(mut self, names: &'a [String], values: &'a [Value]) -> Self {
        self.outputs = Some((names, values));
        self
    }

    pub fn column(&self, index: usize) -> Value {
        let row = match self.input {
            Input::Row(row) => Some(row),
            // bare columns in an aggregate query take the group's first row
            Input::Group(rows) => rows.first().copied(),
        };
        row.and_then(|r| r.get(index)).cloned().unwrap_or(Value::Null)
    }

    fn output(&self, name: &str) -> Option<Value> {
        let (names, values) = self.outputs?;
        names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .and_then(|i| values.get(i))
            .cloned()
    }
}

enum Arg<'e> {
    Expr(&'e Expr),
    Star,
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

pub struct Evaluator<'b> {
    bindings: &'b Bindings,
    like_cache: RefCell<HashMap<String, Regex>>,
}

impl<'b> Evaluator<'b> {
    pub fn new(bindings: &'b Bindings) -> Self {
        Self {
            bindings,
            like_cache: RefCell::new(HashMap::new()),
        }
    }

    /// True when the predicate holds; NULL counts as false
    pub fn matches(&self, expr: &Expr, scope: &Scope<'_>) -> Result<bool> {
        Ok(self.eval(expr, scope)?.truthy() == Some(true))
    }

    pub fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
        match expr {
            Expr::Identifier(ident) => self.identifier(ident, scope),
            Expr::CompoundIdentifier(parts) => self.compound_identifier(parts, scope),
            Expr::Value(value) => literal(value),
            Expr::Nested(inner) => self.eval(inner, scope),

            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => {
                    let l = self.eval(left, scope)?.truthy();
                    if l == Some(false) {
                        return Ok(Value::Boolean(false));
                    }
                    let r = self.eval(right, scope)?.truthy();
                    Ok(bool_value(and3(l, r)))
                }
                BinaryOperator::Or => {
                    let l = self.eval(left, scope)?.truthy();
                    if l == Some(true) {
                        return Ok(Value::Boolean(true));
                    }
                    let r = self.eval(right, scope)?.truthy();
                    Ok(bool_value(or3(l, r)))
                }
                _ => {
                    let l = self.eval(left, scope)?;
                    let r = self.eval(right, scope)?;
                    binary(op, &l, &r)
                }
            },

            Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr, scope)?;
                match op {
                    UnaryOperator::Not => Ok(bool_value(value.truthy().map(|b| !b))),
                    UnaryOperator::Minus => Ok(match value.to_number() {
                        Some(Number::Int(i)) => i
                            .checked_neg()
                            .map(Value::Integer)
                            .unwrap_or(Value::Float(-(i as f64))),
                        Some(Number::Real(f)) => Value::Float(-f),
                        None => Value::Null,
                    }),
                    UnaryOperator::Plus => Ok(value),
                    other => Err(SpeakSqlError::Query(format!(
                        "unsupported unary operator: {}",
                        other
                    ))),
                }
            }

            Expr::IsNull(inner) => Ok(Value::Boolean(self.eval(inner, scope)?.is_null())),
            Expr::IsNotNull(inner) => Ok(Value::Boolean(!self.eval(inner, scope)?.is_null())),
            Expr::IsTrue(inner) => Ok(Value::Boolean(
                self.eval(inner, scope)?.truthy() == Some(true),
            )),
            Expr::IsFalse(inner) => Ok(Value::Boolean(
                self.eval(inner, scope)?.truthy() == Some(false),
            )),

            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, scope)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                let mut found = false;
                for item in list {
                    match value.compare(&self.eval(item, scope)?) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        None => saw_null = true,
                        _ => {}
                    }
                }
                let result = if found {
                    Some(true)
                } else if saw_null {
                    None
                } else {
                    Some(false)
                };
                Ok(bool_value(negate(result, *negated)))
            }

            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.eval(expr, scope)?;
                let low = self.eval(low, scope)?;
                let high = self.eval(high, scope)?;
                let above = value.compare(&low).map(|o| o.is_ge());
                let below = value.compare(&high).map(|o| o.is_le());
                Ok(bool_value(negate(and3(above, below), *negated)))
            }

            Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            }
            | Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(SpeakSqlError::Query(
                        "LIKE ... ESCAPE is not supported".to_string(),
                    ));
                }
                let value = self.eval(expr, scope)?;
                let pattern = self.eval(pattern, scope)?;
                match (value.to_text(), pattern.to_text()) {
                    (Some(text), Some(pattern)) => {
                        let hit = self.like_regex(&pattern)?.is_match(&text);
                        Ok(Value::Boolean(hit != *negated))
                    }
                    _ => Ok(Value::Null),
                }
            }

            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
                ..
            } => {
                let operand = match operand {
                    Some(op) => Some(self.eval(op, scope)?),
                    None => None,
                };
                for (condition, result) in conditions.iter().zip(results) {
                    let hit = match &operand {
                        Some(op) => op.compare(&self.eval(condition, scope)?) == Some(Ordering::Equal),
                        None => self.matches(condition, scope)?,
                    };
                    if hit {
                        return self.eval(result, scope);
                    }
                }
                match else_result {
                    Some(else_result) => self.eval(else_result, scope),
                    None => Ok(Value::Null),
                }
            }

            Expr::Cast {
                expr, data_type, ..
            } => cast(self.eval(expr, scope)?, &data_type.to_string()),

            Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                let mut args = vec![self.eval(expr, scope)?];
                args.push(match substring_from {
                    Some(from) => self.eval(from, scope)?,
                    None => Value::Integer(1),
                });
                if let Some(length) = substring_for {
                    args.push(self.eval(length, scope)?);
                }
                functions::call_scalar("SUBSTR", &args)
            }

            Expr::Trim {
                expr,
                trim_where,
                trim_what,
                trim_characters,
                ..
            } => {
                let value = self.eval(expr, scope)?;
                let what = match (trim_what, trim_characters) {
                    (Some(what), _) => Some(self.eval(what, scope)?),
                    (None, Some(chars)) => match chars.first() {
                        Some(first) => Some(self.eval(first, scope)?),
                        None => None,
                    },
                    (None, None) => None,
                };
                let name = match trim_where {
                    Some(TrimWhereField::Leading) => "LTRIM",
                    Some(TrimWhereField::Trailing) => "RTRIM",
                    _ => "TRIM",
                };
                let mut args = vec![value];
                args.extend(what);
                functions::call_scalar(name, &args)
            }

            Expr::Function(func) => self.function(func, scope),

            Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => Err(
                SpeakSqlError::Query("subqueries are not supported".to_string()),
            ),

            other => Err(SpeakSqlError::Query(format!(
                "unsupported expression: {}",
                other
            ))),
        }
    }

    fn identifier(&self, ident: &Ident, scope: &Scope<'_>) -> Result<Value> {
        if let Some(index) = self.bindings.resolve(&ident.value) {
            return Ok(scope.column(index));
        }
        if let Some(value) = scope.output(&ident.value) {
            return Ok(value);
        }
        // SQLite reads an unresolvable "double quoted" name as a string literal
        if ident.quote_style == Some('"') {
            return Ok(Value::Text(ident.value.clone()));
        }
        Err(self.bindings.no_such_column(&ident.value))
    }

    fn compound_identifier(&self, parts: &[Ident], scope: &Scope<'_>) -> Result<Value> {
        match parts {
            [qualifier, column] if self.bindings.qualifier_matches(&qualifier.value) => {
                self.bindings
                    .resolve(&column.value)
                    .map(|index| scope.column(index))
                    .ok_or_else(|| self.bindings.no_such_column(&column.value))
            }
            _ => {
                let name = parts
                    .iter()
                    .map(|p| p.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                Err(SpeakSqlError::Query(format!("no such column: {}", name)))
            }
        }
    }

    fn function(&self, func: &Function, scope: &Scope<'_>) -> Result<Value> {
        let name = function_name(func);
        if func.over.is_some() {
            return Err(SpeakSqlError::Query(
                "window functions are not supported".to_string(),
            ));
        }

        let (args, distinct) = call_args(func)?;
        if functions::is_aggregate(&name, args.len()) {
            return self.aggregate(&name, &args, distinct, scope);
        }
        if distinct {
            return Err(SpeakSqlError::Query(format!(
                "DISTINCT is only valid in aggregate functions, not {}()",
                name
            )));
        }

        let values = args
            .iter()
            .map(|arg| match arg {
                Arg::Expr(expr) => self.eval(expr, scope),
                Arg::Star => Err(SpeakSqlError::Query(format!(
                    "* is not a valid argument to {}()",
                    name
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        functions::call_scalar(&name, &values)
    }

    fn aggregate(&self, name: &str, args: &[Arg<'_>], distinct: bool, scope: &Scope<'_>) -> Result<Value> {
        let rows = match scope.input {
            Input::Group(rows) => rows,
            Input::Row(_) => {
                return Err(SpeakSqlError::Query(format!(
                    "misuse of aggregate function {}()",
                    name
                )))
            }
        };

        let (arg, separator) = match (name, args) {
            ("COUNT", []) | ("COUNT", [Arg::Star]) => {
                return Ok(Value::Integer(rows.len() as i64));
            }
            ("GROUP_CONCAT", [Arg::Expr(expr), Arg::Expr(sep)]) => {
                let first = rows.first().copied().unwrap_or(&[]);
                let sep = self
                    .eval(sep, &Scope::row(first))?
                    .to_text()
                    .unwrap_or_else(|| ",".to_string());
                (*expr, sep)
            }
            (_, [Arg::Expr(expr)]) => (*expr, ",".to_string()),
            _ => {
                return Err(SpeakSqlError::Query(format!(
                    "wrong number of arguments to function {}()",
                    name
                )))
            }
        };

        let values = rows
            .iter()
            .map(|row| self.eval(arg, &Scope::row(row)))
            .collect::<Result<Vec<_>>>()?;

        functions::aggregate(name, values, distinct, &separator)
    }

    fn like_regex(&self, pattern: &str) -> Result<Regex> {
        if let Some(re) = self.like_cache.borrow().get(pattern) {
            return Ok(re.clone());
        }

        let mut source = String::from("(?is)^");
        for c in pattern.chars() {
            match c {
                '%' => source.push_str(".*"),
                '_' => source.push('.'),
                c => source.push_str(&regex::escape(&c.to_string())),
            }
        }
        source.push('$');

        let re = Regex::new(&source)
            .map_err(|e| SpeakSqlError::Query(format!("invalid LIKE pattern '{}': {}", pattern, e)))?;
        self.like_cache
            .borrow_mut()
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

/// Upper-cased, unqualified function name
pub fn function_name(func: &Function) -> String {
    func.name
        .0
        .last()
        .map(|ident| ident.value.to_uppercase())
        .unwrap_or_default()
}

fn call_args(func: &Function) -> Result<(Vec<Arg<'_>>, bool)> {
    match &func.args {
        FunctionArguments::None => Ok((Vec::new(), false)),
        FunctionArguments::Subquery(_) => Err(SpeakSqlError::Query(
            "subqueries are not supported".to_string(),
        )),
        FunctionArguments::List(list) => {
            let distinct = matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
            let args = list
                .args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Ok(Arg::Expr(expr)),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => Ok(Arg::Star),
                    other => Err(SpeakSqlError::Query(format!(
                        "unsupported function argument: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((args, distinct))
        }
    }
}

fn arg_count(func: &Function) -> usize {
    match &func.args {
        FunctionArguments::List(list) => list.args.len(),
        _ => 0,
    }
}

/// True when the expression calls an aggregate function anywhere inside it
pub fn contains_aggregate(expr: &Expr) -> bool {
    visit_expressions(expr, |e| {
        if let Expr::Function(func) = e {
            if func.over.is_none() && functions::is_aggregate(&function_name(func), arg_count(func)) {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    })
    .is_break()
}

fn literal(value: &SqlValue) -> Result<Value> {
    match value {
        SqlValue::Number(n, _) => parse_number(n)
            .map(Number::into_value)
            .ok_or_else(|| SpeakSqlError::Query(format!("invalid number literal: {}", n))),
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::Text(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Boolean(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(SpeakSqlError::Query(format!("unsupported literal: {}", other))),
    }
}

fn binary(op: &BinaryOperator, l: &Value, r: &Value) -> Result<Value> {
    let comparison = |test: fn(Ordering) -> bool| bool_value(l.compare(r).map(test));

    let value = match op {
        BinaryOperator::Eq => comparison(Ordering::is_eq),
        BinaryOperator::NotEq => comparison(Ordering::is_ne),
        BinaryOperator::Lt => comparison(Ordering::is_lt),
        BinaryOperator::LtEq => comparison(Ordering::is_le),
        BinaryOperator::Gt => comparison(Ordering::is_gt),
        BinaryOperator::GtEq => comparison(Ordering::is_ge),
        BinaryOperator::Plus => arithmetic(Arith::Add, l, r),
        BinaryOperator::Minus => arithmetic(Arith::Sub, l, r),
        BinaryOperator::Multiply => arithmetic(Arith::Mul, l, r),
        BinaryOperator::Divide => arithmetic(Arith::Div, l, r),
        BinaryOperator::Modulo => arithmetic(Arith::Rem, l, r),
        BinaryOperator::StringConcat => match (l.to_text(), r.to_text()) {
            (Some(a), Some(b)) => Value::Text(a + &b),
            _ => Value::Null,
        },
        other => {
            return Err(SpeakSqlError::Query(format!(
                "unsupported operator: {}",
                other
            )))
        }
    };
    Ok(value)
}

fn arithmetic(op: Arith, l: &Value, r: &Value) -> Value {
    let (a, b) = match (l.to_number(), r.to_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Value::Null,
    };

    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let exact = match op {
                Arith::Add => x.checked_add(y),
                Arith::Sub => x.checked_sub(y),
                Arith::Mul => x.checked_mul(y),
                Arith::Div if y == 0 => return Value::Null,
                Arith::Div => x.checked_div(y),
                Arith::Rem if y == 0 => return Value::Null,
                Arith::Rem => Some(x.checked_rem(y).unwrap_or(0)),
            };
            match exact {
                Some(i) => Value::Integer(i),
                None => arithmetic_real(op, x as f64, y as f64),
            }
        }
        (a, b) => arithmetic_real(op, a.as_f64(), b.as_f64()),
    }
}

fn arithmetic_real(op: Arith, x: f64, y: f64) -> Value {
    match op {
        Arith::Add => Value::Float(x + y),
        Arith::Sub => Value::Float(x - y),
        Arith::Mul => Value::Float(x * y),
        Arith::Div | Arith::Rem if y == 0.0 => Value::Null,
        Arith::Div => Value::Float(x / y),
        Arith::Rem => Value::Float(x % y),
    }
}

/// CAST following SQLite's type-name affinity rules
fn cast(value: Value, type_name: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let upper = type_name.to_uppercase();

    let result = if upper.contains("INT") {
        match value.to_number() {
            Some(Number::Int(i)) => Value::Integer(i),
            Some(Number::Real(f)) => Value::Integer(f.trunc() as i64),
            None => Value::Null,
        }
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") || upper.contains("STRING") {
        value.to_text().map(Value::Text).unwrap_or(Value::Null)
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        value
            .to_number()
            .map(|n| Value::Float(n.as_f64()))
            .unwrap_or(Value::Null)
    } else if upper.contains("BOOL") {
        bool_value(value.truthy())
    } else if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
        value.to_number().map(Number::into_value).unwrap_or(Value::Null)
    } else {
        return Err(SpeakSqlError::Query(format!(
            "unsupported CAST target type: {}",
            type_name
        )));
    };

    Ok(result)
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn negate(value: Option<bool>, negated: bool) -> Option<bool> {
    value.map(|b| b != negated)
}

fn bool_value(value: Option<bool>) -> Value {
    value.map(Value::Boolean).unwrap_or(Value::Null)
}
