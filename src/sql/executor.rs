//! Query executor
//! Runs a parsed `SELECT` against the tables of a catalog

use super::expr::{contains_aggregate, Bindings, Evaluator, Scope};
use super::parser::{QueryParser, SelectPlan};
use super::Catalog;
use crate::error::{Result, SpeakSqlError};
use crate::frame::{DataFrame, Number, Value, ValueKey};
use log::debug;
use sqlparser::ast::{visit_expressions_mut, Expr, SelectItem, Value as SqlValue};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

/// Where an output column gets its value from
#[derive(Debug, Clone, Copy)]
enum OutputSource<'p> {
    Column(usize),
    Expr(&'p Expr),
}

#[derive(Debug)]
struct OutputColumn<'p> {
    name: String,
    source: OutputSource<'p>,
}

/// A produced row together with its ORDER BY keys
type Produced = (Vec<Value>, Vec<Value>);

pub struct QueryExecutor<'c> {
    catalog: &'c Catalog,
}

impl<'c> QueryExecutor<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    /// Parse and run one SQL statement
    pub fn execute(&self, sql: &str) -> Result<DataFrame> {
        let plan = QueryParser::parse(sql)?;
        self.run(&plan)
    }

    pub fn run(&self, plan: &SelectPlan) -> Result<DataFrame> {
        let unit;
        let frame: &DataFrame = match &plan.table {
            Some(table) => self.catalog.get(&table.name).ok_or_else(|| {
                SpeakSqlError::Query(format!(
                    "no such table: {} (available: {})",
                    table.name,
                    self.catalog.table_names().join(", ")
                ))
            })?,
            None => {
                // SELECT without FROM evaluates once over an empty row
                unit = DataFrame {
                    columns: Vec::new(),
                    rows: vec![Vec::new()],
                };
                &unit
            }
        };

        let bindings = Bindings::new(frame.column_names(), plan.table.clone());
        let evaluator = Evaluator::new(&bindings);
        let outputs = expand_projection(plan, frame)?;
        let names: Vec<String> = outputs.iter().map(|o| o.name.clone()).collect();

        let selection = plan
            .selection
            .as_ref()
            .map(|predicate| inline_aliases(predicate, &outputs, &bindings));
        let mut filtered: Vec<&[Value]> = Vec::with_capacity(frame.num_rows());
        for row in &frame.rows {
            let keep = match &selection {
                Some(predicate) => evaluator.matches(predicate, &Scope::row(row))?,
                None => true,
            };
            if keep {
                filtered.push(row.as_slice());
            }
        }
        debug!("{} of {} rows passed the filter", filtered.len(), frame.num_rows());

        let aggregated = !plan.group_by.is_empty()
            || plan.having.is_some()
            || outputs.iter().any(|o| match o.source {
                OutputSource::Expr(expr) => contains_aggregate(expr),
                OutputSource::Column(_) => false,
            });

        let mut produced: Vec<Produced> = Vec::new();
        if aggregated {
            let groups = group_rows(plan, &outputs, &bindings, &evaluator, &filtered)?;
            debug!("Formed {} groups", groups.len());
            for group in &groups {
                let scope = Scope::group(group);
                let values = project(&outputs, &evaluator, &scope)?;
                if let Some(having) = &plan.having {
                    if !evaluator.matches(having, &scope.with_outputs(&names, &values))? {
                        continue;
                    }
                }
                let keys = sort_keys(plan, &names, &values, &evaluator, &scope)?;
                produced.push((values, keys));
            }
        } else {
            for row in &filtered {
                let scope = Scope::row(row);
                let values = project(&outputs, &evaluator, &scope)?;
                let keys = sort_keys(plan, &names, &values, &evaluator, &scope)?;
                produced.push((values, keys));
            }
        }

        if plan.distinct {
            let mut seen: HashSet<Vec<ValueKey>> = HashSet::new();
            produced.retain(|(values, _)| seen.insert(values.iter().map(Value::key).collect()));
        }

        if !plan.order_by.is_empty() {
            let directions: Vec<(bool, bool)> = plan
                .order_by
                .iter()
                .map(|order| {
                    let ascending = order.asc.unwrap_or(true);
                    (ascending, order.nulls_first.unwrap_or(ascending))
                })
                .collect();
            produced.sort_by(|a, b| compare_sort_keys(&a.1, &b.1, &directions));
        }

        let offset = match &plan.offset {
            Some(expr) => constant_integer(expr, "OFFSET")?.max(0) as usize,
            None => 0,
        };
        let limit = match &plan.limit {
            // a negative LIMIT means no limit
            Some(expr) => usize::try_from(constant_integer(expr, "LIMIT")?).ok(),
            None => None,
        };

        let rows: Vec<Vec<Value>> = produced
            .into_iter()
            .map(|(values, _)| values)
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let mut result = DataFrame::from_rows(names, rows)?;
        for (column, output) in result.columns.iter_mut().zip(&outputs) {
            if let Some(index) = source_column(output.source, &bindings) {
                column.data_type = frame.columns[index].data_type;
            }
        }
        Ok(result)
    }
}

fn expand_projection<'p>(plan: &'p SelectPlan, frame: &DataFrame) -> Result<Vec<OutputColumn<'p>>> {
    let all_columns = || {
        frame
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| OutputColumn {
                name: c.name.clone(),
                source: OutputSource::Column(i),
            })
            .collect::<Vec<_>>()
    };

    let mut outputs = Vec::new();
    for item in &plan.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => outputs.push(OutputColumn {
                name: output_name(expr),
                source: OutputSource::Expr(expr),
            }),
            SelectItem::ExprWithAlias { expr, alias } => outputs.push(OutputColumn {
                name: alias.value.clone(),
                source: OutputSource::Expr(expr),
            }),
            SelectItem::Wildcard(_) => {
                if plan.table.is_none() {
                    return Err(SpeakSqlError::Query("no tables specified".to_string()));
                }
                outputs.extend(all_columns());
            }
            SelectItem::QualifiedWildcard(qualifier, _) => {
                let qualifier = qualifier.to_string();
                let qualifier = qualifier.trim_matches(|c| c == '"' || c == '`');
                let known = plan
                    .table
                    .as_ref()
                    .map(|t| t.matches(qualifier))
                    .unwrap_or(false);
                if !known {
                    return Err(SpeakSqlError::Query(format!("no such table: {}", qualifier)));
                }
                outputs.extend(all_columns());
            }
        }
    }
    Ok(outputs)
}

/// Replace result aliases in a WHERE clause with the expressions they name.
/// Names that are real columns are left alone.
fn inline_aliases(predicate: &Expr, outputs: &[OutputColumn<'_>], bindings: &Bindings) -> Expr {
    let mut predicate = predicate.clone();
    let _ = visit_expressions_mut(&mut predicate, |expr| {
        if let Expr::Identifier(ident) = expr {
            if bindings.resolve(&ident.value).is_none() {
                let aliased = outputs.iter().find_map(|o| match o.source {
                    OutputSource::Expr(source) if o.name.eq_ignore_ascii_case(&ident.value) => Some(source),
                    _ => None,
                });
                if let Some(source) = aliased {
                    *expr = Expr::Nested(Box::new(source.clone()));
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });
    predicate
}

/// SQLite names a result column after its alias, else the bare column, else
/// the expression text.
fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|p| p.value.clone())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn source_column(source: OutputSource<'_>, bindings: &Bindings) -> Option<usize> {
    match source {
        OutputSource::Column(index) => Some(index),
        OutputSource::Expr(Expr::Identifier(ident)) => bindings.resolve(&ident.value),
        OutputSource::Expr(Expr::CompoundIdentifier(parts)) => match parts.as_slice() {
            [qualifier, column] if bindings.qualifier_matches(&qualifier.value) => {
                bindings.resolve(&column.value)
            }
            _ => None,
        },
        OutputSource::Expr(_) => None,
    }
}

fn project(outputs: &[OutputColumn<'_>], evaluator: &Evaluator<'_>, scope: &Scope<'_>) -> Result<Vec<Value>> {
    outputs
        .iter()
        .map(|output| match output.source {
            OutputSource::Column(index) => Ok(scope.column(index)),
            OutputSource::Expr(expr) => evaluator.eval(expr, scope),
        })
        .collect()
}

/// 1-based position from an integer literal, as used by `GROUP BY 1` and `ORDER BY 2`
fn ordinal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Value(SqlValue::Number(n, _)) => n.parse::<i64>().ok(),
        _ => None,
    }
}

fn group_rows<'r>(
    plan: &SelectPlan,
    outputs: &[OutputColumn<'_>],
    bindings: &Bindings,
    evaluator: &Evaluator<'_>,
    filtered: &[&'r [Value]],
) -> Result<Vec<Vec<&'r [Value]>>> {
    // without GROUP BY the whole input is one group, even when empty
    if plan.group_by.is_empty() {
        return Ok(vec![filtered.to_vec()]);
    }

    let mut key_sources = Vec::with_capacity(plan.group_by.len());
    for expr in &plan.group_by {
        let source = match ordinal(expr) {
            Some(position) => position
                .checked_sub(1)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| outputs.get(i))
                .map(|o| o.source)
                .ok_or_else(|| {
                    SpeakSqlError::Query(format!(
                        "GROUP BY term out of range - should be between 1 and {}",
                        outputs.len()
                    ))
                })?,
            None => match expr {
                // an output alias may stand in for its expression
                Expr::Identifier(ident) if bindings.resolve(&ident.value).is_none() => outputs
                    .iter()
                    .find(|o| o.name.eq_ignore_ascii_case(&ident.value))
                    .map(|o| o.source)
                    .unwrap_or(OutputSource::Expr(expr)),
                _ => OutputSource::Expr(expr),
            },
        };
        key_sources.push(source);
    }

    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<&'r [Value]>)> = Vec::new();

    for &row in filtered {
        let scope = Scope::row(row);
        let key_values = key_sources
            .iter()
            .map(|source| match source {
                OutputSource::Column(i) => Ok(scope.column(*i)),
                OutputSource::Expr(expr) => evaluator.eval(expr, &scope),
            })
            .collect::<Result<Vec<_>>>()?;
        let key: Vec<ValueKey> = key_values.iter().map(Value::key).collect();

        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                index.insert(key, groups.len());
                groups.push((key_values, vec![row]));
            }
        }
    }

    // groups come out in key order, as SQLite's sorter produces them
    groups.sort_by(|a, b| {
        a.0.iter()
            .zip(&b.0)
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    Ok(groups.into_iter().map(|(_, rows)| rows).collect())
}

fn sort_keys(
    plan: &SelectPlan,
    names: &[String],
    values: &[Value],
    evaluator: &Evaluator<'_>,
    scope: &Scope<'_>,
) -> Result<Vec<Value>> {
    plan.order_by
        .iter()
        .map(|order| {
            if let Some(position) = ordinal(&order.expr) {
                return position
                    .checked_sub(1)
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| values.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        SpeakSqlError::Query(format!(
                            "ORDER BY term out of range - should be between 1 and {}",
                            values.len()
                        ))
                    });
            }
            if let Expr::Identifier(ident) = &order.expr {
                if let Some(i) = names.iter().position(|n| n.eq_ignore_ascii_case(&ident.value)) {
                    return Ok(values[i].clone());
                }
            }
            evaluator.eval(&order.expr, &scope.with_outputs(names, values))
        })
        .collect()
}

fn compare_sort_keys(a: &[Value], b: &[Value], directions: &[(bool, bool)]) -> Ordering {
    for ((x, y), &(ascending, nulls_first)) in a.iter().zip(b).zip(directions) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if ascending => x.sort_cmp(y),
            (false, false) => x.sort_cmp(y).reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn constant_integer(expr: &Expr, clause: &str) -> Result<i64> {
    let bindings = Bindings::default();
    let value = Evaluator::new(&bindings).eval(expr, &Scope::row(&[]))?;
    match value.as_number() {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Real(f)) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(SpeakSqlError::Query(format!(
            "{} must be an integer, got {}",
            clause, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, DataType};

    fn catalog() -> Catalog {
        let frame = DataFrame::new(
            vec![
                Column::new("name", DataType::Text),
                Column::new("dept", DataType::Text),
                Column::new("salary", DataType::Integer),
                Column::new("rating", DataType::Float),
            ],
            vec![
                vec!["Ada".into(), "eng".into(), 120.into(), 4.5.into()],
                vec!["Bob".into(), "ops".into(), 80.into(), Value::Null],
                vec!["Cy".into(), "eng".into(), 100.into(), 3.9.into()],
                vec!["Dee".into(), "sales".into(), 90.into(), 4.1.into()],
                vec!["Eve".into(), "ops".into(), 85.into(), 4.8.into()],
            ],
        )
        .unwrap();
        Catalog::new().with_table("df", frame)
    }

    fn run(sql: &str) -> DataFrame {
        let catalog = catalog();
        QueryExecutor::new(&catalog).execute(sql).unwrap()
    }

    fn run_err(sql: &str) -> SpeakSqlError {
        let catalog = catalog();
        QueryExecutor::new(&catalog).execute(sql).unwrap_err()
    }

    fn column(frame: &DataFrame, index: usize) -> Vec<Value> {
        frame.column_values(index).cloned().collect()
    }

    #[test]
    fn test_count_star() {
        let result = run("SELECT COUNT(*) FROM df");
        assert_eq!(result.column_names(), vec!["COUNT(*)"]);
        assert_eq!(result.rows, vec![vec![Value::Integer(5)]]);
    }

    #[test]
    fn test_select_star_with_filter() {
        let result = run("SELECT * FROM df WHERE dept = \"eng\"");
        assert_eq!(result.num_columns(), 4);
        assert_eq!(column(&result, 0), vec![Value::from("Ada"), Value::from("Cy")]);
        assert_eq!(result.columns[2].data_type, DataType::Integer);
    }

    #[test]
    fn test_group_by_with_having_and_order() {
        let result = run(
            "SELECT dept, COUNT(*) AS n, SUM(salary) AS total FROM df \
             GROUP BY dept HAVING n > 1 ORDER BY total DESC",
        );
        assert_eq!(result.column_names(), vec!["dept", "n", "total"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("eng"), Value::Integer(2), Value::Integer(220)],
                vec![Value::from("ops"), Value::Integer(2), Value::Integer(165)],
            ]
        );
    }

    #[test]
    fn test_groups_come_out_sorted_by_key() {
        let result = run("SELECT dept, MAX(salary) FROM df GROUP BY 1");
        assert_eq!(
            column(&result, 0),
            vec![Value::from("eng"), Value::from("ops"), Value::from("sales")]
        );
        assert_eq!(
            column(&result, 1),
            vec![Value::Integer(120), Value::Integer(85), Value::Integer(90)]
        );
    }

    #[test]
    fn test_aggregate_over_empty_input() {
        let result = run("SELECT COUNT(*), SUM(salary), AVG(rating) FROM df WHERE salary > 1000");
        assert_eq!(
            result.rows,
            vec![vec![Value::Integer(0), Value::Null, Value::Null]]
        );
    }

    #[test]
    fn test_order_by_nulls_and_limit_offset() {
        let result = run("SELECT name FROM df ORDER BY rating");
        assert_eq!(column(&result, 0)[0], Value::from("Bob"));

        let result = run("SELECT name FROM df ORDER BY rating DESC LIMIT 2");
        assert_eq!(column(&result, 0), vec![Value::from("Eve"), Value::from("Ada")]);

        let result = run("SELECT name FROM df ORDER BY salary LIMIT 2 OFFSET 1");
        assert_eq!(column(&result, 0), vec![Value::from("Eve"), Value::from("Dee")]);

        let result = run("SELECT name FROM df ORDER BY rating DESC NULLS FIRST LIMIT 1");
        assert_eq!(column(&result, 0), vec![Value::from("Bob")]);
    }

    #[test]
    fn test_order_by_alias_and_ordinal() {
        let result = run("SELECT name, salary * 2 AS doubled FROM df ORDER BY doubled LIMIT 1");
        assert_eq!(result.rows, vec![vec![Value::from("Bob"), Value::Integer(160)]]);

        let result = run("SELECT name, salary FROM df ORDER BY 2 DESC LIMIT 1");
        assert_eq!(result.rows[0][0], Value::from("Ada"));
    }

    #[test]
    fn test_distinct() {
        let result = run("SELECT DISTINCT dept FROM df ORDER BY dept");
        assert_eq!(result.num_rows(), 3);
    }

    #[test]
    fn test_expression_output_names_and_types() {
        let result = run("SELECT UPPER(name), salary / 10 FROM df WHERE name = 'Ada'");
        assert_eq!(result.column_names(), vec!["UPPER(name)", "salary / 10"]);
        assert_eq!(result.rows[0], vec![Value::from("ADA"), Value::Integer(12)]);
    }

    #[test]
    fn test_select_without_from() {
        let result = run("SELECT 1 + 2 AS three");
        assert_eq!(result.rows, vec![vec![Value::Integer(3)]]);
    }

    #[test]
    fn test_table_alias_and_qualified_wildcard() {
        let result = run("SELECT e.* FROM df AS e WHERE e.salary < 85");
        assert_eq!(result.num_rows(), 1);
        assert_eq!(result.rows[0][0], Value::from("Bob"));
    }

    #[test]
    fn test_table_name_is_case_insensitive() {
        let result = run("SELECT name FROM DF WHERE salary = 90");
        assert_eq!(result.rows[0][0], Value::from("Dee"));
    }

    #[test]
    fn test_errors() {
        assert!(run_err("SELECT * FROM employees").to_string().contains("no such table: employees"));
        assert!(run_err("SELECT nme FROM df").to_string().contains("did you mean 'name'"));
        assert!(run_err("SELECT name FROM df WHERE COUNT(*) > 1").to_string().contains("misuse"));
        assert!(run_err("SELECT name FROM df ORDER BY 3").to_string().contains("out of range"));
        assert!(run_err("SELECT *").to_string().contains("no tables specified"));
        assert!(run_err("SELECT name FROM df LIMIT 'x'").to_string().contains("LIMIT"));
    }

    #[test]
    fn test_where_can_use_result_alias() {
        let result = run("SELECT name, salary * 12 AS annual FROM df WHERE annual > 1050 ORDER BY annual");
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("Dee"), Value::Integer(1080)],
                vec![Value::from("Cy"), Value::Integer(1200)],
                vec![Value::from("Ada"), Value::Integer(1440)],
            ]
        );

        // a real column wins over an alias of the same name
        let result = run("SELECT salary * 2 AS salary FROM df WHERE salary = 90");
        assert_eq!(result.rows, vec![vec![Value::Integer(180)]]);

        assert!(run_err("SELECT COUNT(*) AS n FROM df WHERE n > 1").to_string().contains("misuse"));
    }

    #[test]
    fn test_like_escape_is_rejected() {
        let err = run_err("SELECT name FROM df WHERE name LIKE 'A!%' ESCAPE '!'");
        assert!(err.to_string().contains("ESCAPE is not supported"));
    }

    #[test]
    fn test_substr_with_huge_length() {
        let result = run("SELECT SUBSTR(name, 2, 9223372036854775807) FROM df WHERE name = 'Ada'");
        assert_eq!(result.rows, vec![vec![Value::from("da")]]);
    }

    #[test]
    fn test_like_filter() {
        let result = run("SELECT name FROM df WHERE name LIKE '%E%' ORDER BY name");
        assert_eq!(column(&result, 0), vec![Value::from("Dee"), Value::from("Eve")]);
    }
}
