//! Turning a model reply into a single runnable statement

use crate::error::{Result, SpeakSqlError};

/// Extract the first SQL statement from a model reply.
///
/// The reply is trimmed, a surrounding Markdown code fence and a leading bare
/// `SQL` label are dropped, and everything from the first `;` on is discarded.
pub fn extract_sql(reply: &str) -> Result<String> {
    let mut text = reply.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // drop the info string (`sql`, `sqlite`, ...) up to the end of the line
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        text = text.trim();
        if let Some(body) = text.strip_suffix("```") {
            text = body.trim();
        }
    }

    if let Some((first, rest)) = text.split_once('\n') {
        if first.trim().eq_ignore_ascii_case("sql") {
            text = rest.trim();
        }
    }

    let statement = text.split(';').next().unwrap_or_default().trim();
    if statement.is_empty() {
        return Err(SpeakSqlError::Llm("model returned no SQL".to_string()));
    }
    Ok(statement.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_reply() {
        assert_eq!(extract_sql("  SELECT COUNT(*) FROM df;\n").unwrap(), "SELECT COUNT(*) FROM df");
    }

    #[test]
    fn test_only_first_statement_is_kept() {
        let reply = "SELECT * FROM df WHERE a = 1; DROP TABLE df;";
        assert_eq!(extract_sql(reply).unwrap(), "SELECT * FROM df WHERE a = 1");
    }

    #[test]
    fn test_no_semicolon() {
        assert_eq!(extract_sql("SELECT name FROM df").unwrap(), "SELECT name FROM df");
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let reply = "```sql\nSELECT name\nFROM df\nWHERE age > 30;\n```";
        assert_eq!(extract_sql(reply).unwrap(), "SELECT name\nFROM df\nWHERE age > 30");

        let reply = "```\nSELECT 1\n```";
        assert_eq!(extract_sql(reply).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_sql_label_line_is_stripped() {
        assert_eq!(extract_sql("SQL\nSELECT 1;").unwrap(), "SELECT 1");
        // a statement that merely starts with the letters is untouched
        assert_eq!(extract_sql("SELECT sql FROM df").unwrap(), "SELECT sql FROM df");
    }

    #[test]
    fn test_empty_reply() {
        assert!(matches!(extract_sql("   "), Err(SpeakSqlError::Llm(_))));
        assert!(matches!(extract_sql(";SELECT 1"), Err(SpeakSqlError::Llm(_))));
        assert!(matches!(extract_sql("```sql\n```"), Err(SpeakSqlError::Llm(_))));
    }
}
