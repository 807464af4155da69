//! SQL front end
//!
//! Parses a statement with `sqlparser` (SQLite dialect) and lowers the
//! supported subset of `SELECT` into a [`SelectPlan`]. Everything outside that
//! subset is rejected here with a descriptive error so the executor only ever
//! sees shapes it knows how to run.

use crate::error::{Result, SpeakSqlError};
use sqlparser::ast::{
    Distinct, Expr, GroupByExpr, OrderByExpr, Query, SelectItem, SetExpr, Statement, TableFactor,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// The table named in `FROM`, with its optional alias
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// True when `qualifier` names this table or its alias
    pub fn matches(&self, qualifier: &str) -> bool {
        self.name.eq_ignore_ascii_case(qualifier)
            || self
                .alias
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case(qualifier))
                .unwrap_or(false)
    }
}

/// A single-table `SELECT` ready for execution
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub table: Option<TableRef>,
    pub projection: Vec<SelectItem>,
    pub distinct: bool,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

pub struct QueryParser;

impl QueryParser {
    /// Parse SQL text into a plan. Exactly one read-only statement is accepted.
    pub fn parse(sql: &str) -> Result<SelectPlan> {
        let dialect = SQLiteDialect {};
        let statements = Parser::parse_sql(&dialect, sql)?;

        let statement = match statements.as_slice() {
            [] => return Err(SpeakSqlError::SqlParse("empty query".to_string())),
            [single] => single,
            _ => {
                return Err(SpeakSqlError::Query(
                    "only a single statement can be executed".to_string(),
                ))
            }
        };

        match statement {
            Statement::Query(query) => Self::plan_query(query),
            _ => Err(SpeakSqlError::Query(
                "only SELECT statements are supported".to_string(),
            )),
        }
    }

    fn plan_query(query: &Query) -> Result<SelectPlan> {
        if query.with.is_some() {
            return Err(unsupported("WITH clauses"));
        }
        if query.fetch.is_some() {
            return Err(unsupported("FETCH clauses"));
        }
        if !query.limit_by.is_empty() {
            return Err(unsupported("LIMIT BY"));
        }

        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            SetExpr::SetOperation { op, .. } => {
                return Err(SpeakSqlError::Query(format!(
                    "compound SELECT ({}) is not supported",
                    op
                )))
            }
            SetExpr::Query(_) => return Err(unsupported("parenthesized queries")),
            other => {
                return Err(SpeakSqlError::Query(format!(
                    "unsupported query body: {}",
                    other
                )))
            }
        };

        let table = match select.from.as_slice() {
            [] => None,
            [from] => {
                if !from.joins.is_empty() {
                    return Err(unsupported("JOIN"));
                }
                match &from.relation {
                    TableFactor::Table { name, alias, .. } => Some(TableRef {
                        name: name
                            .0
                            .last()
                            .map(|ident| ident.value.clone())
                            .unwrap_or_default(),
                        alias: alias.as_ref().map(|a| a.name.value.clone()),
                    }),
                    TableFactor::Derived { .. } => return Err(unsupported("subqueries in FROM")),
                    other => {
                        return Err(SpeakSqlError::Query(format!(
                            "unsupported table reference: {}",
                            other
                        )))
                    }
                }
            }
            _ => return Err(unsupported("selecting from multiple tables")),
        };

        let distinct = match &select.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(Distinct::On(_)) => return Err(unsupported("DISTINCT ON")),
        };

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(unsupported("GROUP BY modifiers"));
                }
                exprs.clone()
            }
            GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
        };

        Ok(SelectPlan {
            table,
            projection: select.projection.clone(),
            distinct,
            selection: select.selection.clone(),
            group_by,
            having: select.having.clone(),
            order_by: query
                .order_by
                .as_ref()
                .map(|order_by| order_by.exprs.clone())
                .unwrap_or_default(),
            limit: query.limit.clone(),
            offset: query.offset.as_ref().map(|offset| offset.value.clone()),
        })
    }
}

fn unsupported(feature: &str) -> SpeakSqlError {
    SpeakSqlError::Query(format!("{} is not supported", feature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_select() {
        let plan = QueryParser::parse("SELECT name, age FROM df WHERE age > 30").unwrap();
        assert_eq!(
            plan.table,
            Some(TableRef {
                name: "df".to_string(),
                alias: None
            })
        );
        assert_eq!(plan.projection.len(), 2);
        assert!(plan.selection.is_some());
        assert!(!plan.distinct);
    }

    #[test]
    fn test_clauses_are_captured() {
        let plan = QueryParser::parse(
            "SELECT DISTINCT city, COUNT(*) AS n FROM people p GROUP BY city HAVING n > 1 ORDER BY n DESC LIMIT 5 OFFSET 2",
        )
        .unwrap();
        let table = plan.table.unwrap();
        assert!(table.matches("P"));
        assert!(table.matches("people"));
        assert!(plan.distinct);
        assert_eq!(plan.group_by.len(), 1);
        assert!(plan.having.is_some());
        assert_eq!(plan.order_by.len(), 1);
        assert!(plan.limit.is_some());
        assert!(plan.offset.is_some());
    }

    #[test]
    fn test_select_without_from() {
        let plan = QueryParser::parse("SELECT 1 + 1").unwrap();
        assert!(plan.table.is_none());
    }

    #[test]
    fn test_rejects_writes() {
        let err = QueryParser::parse("DELETE FROM df WHERE id = 1").unwrap_err();
        assert!(err.to_string().contains("only SELECT"));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let err = QueryParser::parse("SELECT 1; SELECT 2").unwrap_err();
        assert!(matches!(err, SpeakSqlError::Query(_)));
    }

    #[test]
    fn test_rejects_joins_and_unions() {
        assert!(QueryParser::parse("SELECT * FROM a JOIN b ON a.id = b.id").is_err());
        assert!(QueryParser::parse("SELECT x FROM a UNION SELECT x FROM b").is_err());
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = QueryParser::parse("SELEC * FROM df").unwrap_err();
        assert!(matches!(err, SpeakSqlError::SqlParse(_)));
    }
}
