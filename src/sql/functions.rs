//! Built-in scalar and aggregate functions

use crate::error::{Result, SpeakSqlError};
use crate::frame::{Number, Value, ValueKey};
use std::collections::HashSet;

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "TOTAL", "GROUP_CONCAT"];

/// MIN and MAX are only aggregates in their single-argument form.
pub fn is_aggregate(name: &str, arg_count: usize) -> bool {
    match name {
        "MIN" | "MAX" => arg_count <= 1,
        _ => AGGREGATES.contains(&name),
    }
}

/// Fold a column of already-evaluated values into one aggregate result.
/// `values` holds one entry per input row; NULLs are skipped.
pub fn aggregate(name: &str, values: Vec<Value>, distinct: bool, separator: &str) -> Result<Value> {
    let mut seen: HashSet<ValueKey> = HashSet::new();
    let values: Vec<Value> = values
        .into_iter()
        .filter(|v| !v.is_null())
        .filter(|v| !distinct || seen.insert(v.key()))
        .collect();

    let result = match name {
        "COUNT" => Value::Integer(values.len() as i64),
        "SUM" => sum(&values).map(Number::into_value).unwrap_or(Value::Null),
        "TOTAL" => Value::Float(sum(&values).map(Number::as_f64).unwrap_or(0.0)),
        "AVG" => {
            if values.is_empty() {
                Value::Null
            } else {
                let total: f64 = values
                    .iter()
                    .filter_map(Value::to_number)
                    .map(Number::as_f64)
                    .sum();
                Value::Float(total / values.len() as f64)
            }
        }
        "MIN" => values
            .into_iter()
            .min_by(|a, b| a.sort_cmp(b))
            .unwrap_or(Value::Null),
        "MAX" => values
            .into_iter()
            .max_by(|a, b| a.sort_cmp(b))
            .unwrap_or(Value::Null),
        "GROUP_CONCAT" => {
            if values.is_empty() {
                Value::Null
            } else {
                Value::Text(
                    values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(separator),
                )
            }
        }
        other => {
            return Err(SpeakSqlError::Query(format!(
                "no such aggregate function: {}",
                other
            )))
        }
    };

    Ok(result)
}

fn sum(values: &[Value]) -> Option<Number> {
    let mut numbers = values.iter().filter_map(Value::to_number);
    let first = numbers.next()?;
    Some(numbers.fold(first, |acc, n| match (acc, n) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map(Number::Int)
            .unwrap_or(Number::Real(a as f64 + b as f64)),
        (a, b) => Number::Real(a.as_f64() + b.as_f64()),
    }))
}

/// Evaluate a scalar function over its evaluated arguments
pub fn call_scalar(name: &str, args: &[Value]) -> Result<Value> {
    let value = match name {
        "UPPER" => {
            expect_args(name, args, 1, 1)?;
            map_text(&args[0], |s| s.to_uppercase())
        }
        "LOWER" => {
            expect_args(name, args, 1, 1)?;
            map_text(&args[0], |s| s.to_lowercase())
        }
        "LENGTH" => {
            expect_args(name, args, 1, 1)?;
            args[0]
                .to_text()
                .map(|s| Value::Integer(s.chars().count() as i64))
                .unwrap_or(Value::Null)
        }
        "ABS" => {
            expect_args(name, args, 1, 1)?;
            match args[0].to_number() {
                Some(Number::Int(i)) => Value::Integer(i.saturating_abs()),
                Some(Number::Real(f)) => Value::Float(f.abs()),
                None => Value::Null,
            }
        }
        "ROUND" => {
            expect_args(name, args, 1, 2)?;
            let digits = match args.get(1) {
                Some(v) => match v.to_number() {
                    Some(n) => n.as_f64() as i32,
                    None => return Ok(Value::Null),
                },
                None => 0,
            };
            match args[0].to_number() {
                Some(n) => {
                    let x = n.as_f64();
                    let factor = 10f64.powi(digits.clamp(0, 30));
                    let scaled = x * factor;
                    // past 2^52 an f64 has no fractional digits left to round
                    if !scaled.is_finite() || scaled.abs() >= 4_503_599_627_370_496.0 {
                        Value::Float(x)
                    } else {
                        Value::Float(scaled.round() / factor)
                    }
                }
                None => Value::Null,
            }
        }
        "COALESCE" => {
            expect_args(name, args, 1, usize::MAX)?;
            args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)
        }
        "IFNULL" => {
            expect_args(name, args, 2, 2)?;
            if args[0].is_null() {
                args[1].clone()
            } else {
                args[0].clone()
            }
        }
        "NULLIF" => {
            expect_args(name, args, 2, 2)?;
            if args[0].compare(&args[1]) == Some(std::cmp::Ordering::Equal) {
                Value::Null
            } else {
                args[0].clone()
            }
        }
        "TRIM" | "LTRIM" | "RTRIM" => {
            expect_args(name, args, 1, 2)?;
            let chars: Vec<char> = match args.get(1) {
                Some(set) => match set.to_text() {
                    Some(s) => s.chars().collect(),
                    None => return Ok(Value::Null),
                },
                None => vec![' '],
            };
            let leading = name != "RTRIM";
            let trailing = name != "LTRIM";
            map_text(&args[0], |s| trim_chars(s, &chars, leading, trailing))
        }
        "SUBSTR" | "SUBSTRING" => {
            expect_args(name, args, 2, 3)?;
            let start = match args[1].to_number() {
                Some(n) => n.as_f64() as i64,
                None => return Ok(Value::Null),
            };
            let length = match args.get(2) {
                Some(v) => match v.to_number() {
                    Some(n) => Some(n.as_f64() as i64),
                    None => return Ok(Value::Null),
                },
                None => None,
            };
            match args[0].to_text() {
                Some(s) => Value::Text(substr(&s, start, length)),
                None => Value::Null,
            }
        }
        "REPLACE" => {
            expect_args(name, args, 3, 3)?;
            match (args[0].to_text(), args[1].to_text(), args[2].to_text()) {
                (Some(s), Some(from), Some(to)) if !from.is_empty() => {
                    Value::Text(s.replace(&from, &to))
                }
                (Some(s), Some(_), Some(_)) => Value::Text(s),
                _ => Value::Null,
            }
        }
        "INSTR" => {
            expect_args(name, args, 2, 2)?;
            match (args[0].to_text(), args[1].to_text()) {
                (Some(haystack), Some(needle)) => {
                    let position = haystack
                        .find(&needle)
                        .map(|byte_idx| haystack[..byte_idx].chars().count() as i64 + 1)
                        .unwrap_or(0);
                    Value::Integer(position)
                }
                _ => Value::Null,
            }
        }
        "MIN" | "MAX" => {
            expect_args(name, args, 2, usize::MAX)?;
            if args.iter().any(Value::is_null) {
                Value::Null
            } else {
                let pick = args.iter().cloned().reduce(|best, v| {
                    let ord = v.sort_cmp(&best);
                    let better = if name == "MIN" { ord.is_lt() } else { ord.is_gt() };
                    if better {
                        v
                    } else {
                        best
                    }
                });
                pick.unwrap_or(Value::Null)
            }
        }
        other => {
            return Err(SpeakSqlError::Query(format!("no such function: {}", other)));
        }
    };

    Ok(value)
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(SpeakSqlError::Query(format!(
            "wrong number of arguments to function {}()",
            name
        )));
    }
    Ok(())
}

fn map_text(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    value
        .to_text()
        .map(|s| Value::Text(f(&s)))
        .unwrap_or(Value::Null)
}

pub fn trim_chars(s: &str, chars: &[char], leading: bool, trailing: bool) -> String {
    let mut out = s;
    if leading {
        out = out.trim_start_matches(|c| chars.contains(&c));
    }
    if trailing {
        out = out.trim_end_matches(|c| chars.contains(&c));
    }
    out.to_string()
}

/// 1-based substring; a negative start counts from the end of the string
pub fn substr(s: &str, start: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;

    let (mut begin, mut count) = match start {
        n if n > 0 => (n - 1, length.unwrap_or(len)),
        0 => (0, length.map(|l| l.saturating_sub(1)).unwrap_or(len)),
        n => (len + n, length.unwrap_or(len)),
    };
    if begin < 0 {
        count = count.saturating_add(begin);
        begin = 0;
    }
    if count <= 0 || begin >= len {
        return String::new();
    }
    let end = begin.saturating_add(count).min(len);
    chars[begin as usize..end as usize].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_keeps_integers_and_skips_nulls() {
        let values = vec![Value::Integer(2), Value::Null, Value::Integer(5)];
        assert_eq!(aggregate("SUM", values, false, ",").unwrap(), Value::Integer(7));
        let mixed = vec![Value::Integer(2), Value::Float(0.5)];
        assert_eq!(aggregate("SUM", mixed, false, ",").unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_empty_aggregates() {
        assert_eq!(aggregate("SUM", vec![], false, ",").unwrap(), Value::Null);
        assert_eq!(aggregate("TOTAL", vec![], false, ",").unwrap(), Value::Float(0.0));
        assert_eq!(aggregate("COUNT", vec![Value::Null], false, ",").unwrap(), Value::Integer(0));
        assert_eq!(aggregate("AVG", vec![], false, ",").unwrap(), Value::Null);
    }

    #[test]
    fn test_distinct_count_and_group_concat() {
        let values = vec![Value::from("a"), Value::from("b"), Value::from("a")];
        assert_eq!(aggregate("COUNT", values.clone(), true, ",").unwrap(), Value::Integer(2));
        assert_eq!(
            aggregate("GROUP_CONCAT", values, false, "|").unwrap(),
            Value::from("a|b|a")
        );
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call_scalar("UPPER", &[Value::from("abc")]).unwrap(), Value::from("ABC"));
        assert_eq!(call_scalar("LENGTH", &[Value::from("héllo")]).unwrap(), Value::Integer(5));
        assert_eq!(
            call_scalar("REPLACE", &[Value::from("a-b-c"), Value::from("-"), Value::from("+")]).unwrap(),
            Value::from("a+b+c")
        );
        assert_eq!(
            call_scalar("INSTR", &[Value::from("hello"), Value::from("ll")]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            call_scalar("TRIM", &[Value::from("xxhixx"), Value::from("x")]).unwrap(),
            Value::from("hi")
        );
    }

    #[test]
    fn test_substr_semantics() {
        assert_eq!(substr("abcdef", 2, Some(3)), "bcd");
        assert_eq!(substr("abcdef", -2, None), "ef");
        assert_eq!(substr("abcdef", 0, Some(2)), "a");
        assert_eq!(substr("abc", 10, None), "");
        assert_eq!(substr("abcdef", 2, Some(i64::MAX)), "bcdef");
        assert_eq!(substr("abcdef", -3, Some(i64::MAX)), "def");
        assert_eq!(substr("abcdef", 0, Some(i64::MIN)), "");
        assert_eq!(substr("abcdef", 2, Some(i64::MIN)), "");
    }

    #[test]
    fn test_round_and_abs() {
        assert_eq!(call_scalar("ROUND", &[Value::Float(2.567), Value::Integer(2)]).unwrap(), Value::Float(2.57));
        assert_eq!(call_scalar("ROUND", &[Value::Float(2.5)]).unwrap(), Value::Float(3.0));
        assert_eq!(call_scalar("ROUND", &[Value::Float(2.5), Value::Integer(400)]).unwrap(), Value::Float(2.5));
        assert_eq!(call_scalar("ROUND", &[Value::Float(1e300), Value::Integer(20)]).unwrap(), Value::Float(1e300));
        assert_eq!(call_scalar("ABS", &[Value::Integer(-3)]).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_null_handling_functions() {
        assert_eq!(
            call_scalar("COALESCE", &[Value::Null, Value::Integer(4)]).unwrap(),
            Value::Integer(4)
        );
        assert_eq!(
            call_scalar("NULLIF", &[Value::Integer(4), Value::Integer(4)]).unwrap(),
            Value::Null
        );
        assert_eq!(call_scalar("UPPER", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert!(call_scalar("SOUNDEX", &[Value::from("x")]).is_err());
        assert!(call_scalar("UPPER", &[]).is_err());
    }

    #[test]
    fn test_scalar_min_max() {
        assert!(!is_aggregate("MAX", 2));
        assert!(is_aggregate("MAX", 1));
        assert_eq!(
            call_scalar("MAX", &[Value::Integer(1), Value::Float(3.5), Value::Integer(2)]).unwrap(),
            Value::Float(3.5)
        );
    }
}
