//! SQL identifier handling for operator-configured table and routine names.

use crate::StoreError;

/// Quote a table name, optionally schema-qualified (`schema.table`). Each part
/// is wrapped in double quotes, so the configured case is kept exactly.
pub fn quote_table_name(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    let parts = raw.split('.').collect::<Vec<_>>();
    if raw.is_empty() || parts.len() > 2 || parts.iter().any(|p| p.is_empty() || p.contains('\0')) {
        return Err(StoreError::InvalidIdentifier(raw.to_string()));
    }
    Ok(parts
        .iter()
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join("."))
}

/// Statement invoking a zero-argument routine and casting its result to text.
///
/// Routine names are emitted unquoted so they fold to lower case the same way
/// a hand-written `SELECT refresh_totals();` would, which means they must be
/// plain identifiers. A trailing `()` is tolerated.
pub fn routine_call_sql(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_suffix("()").unwrap_or(trimmed);
    let parts = name.split('.').collect::<Vec<_>>();
    if name.is_empty() || parts.len() > 2 || !parts.iter().all(|p| is_plain_identifier(p)) {
        return Err(StoreError::InvalidIdentifier(raw.to_string()));
    }
    Ok(format!("SELECT ({name}())::text"))
}

fn is_plain_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_quoted_per_part() {
        assert_eq!(quote_table_name("JobTrans").unwrap(), "\"JobTrans\"");
        assert_eq!(quote_table_name(" mes.job_trans ").unwrap(), "\"mes\".\"job_trans\"");
        assert_eq!(quote_table_name("we\"ird").unwrap(), "\"we\"\"ird\"");
    }

    #[test]
    fn malformed_table_names_are_rejected() {
        for raw in ["", "  ", "a..b", ".t", "a.b.c", "bad\0name"] {
            assert!(
                matches!(quote_table_name(raw), Err(StoreError::InvalidIdentifier(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn routine_calls_cast_to_text() {
        assert_eq!(
            routine_call_sql("refresh_realtime").unwrap(),
            "SELECT (refresh_realtime())::text"
        );
        assert_eq!(
            routine_call_sql("reporting.refresh_history()").unwrap(),
            "SELECT (reporting.refresh_history())::text"
        );
    }

    #[test]
    fn routine_names_must_be_plain_identifiers() {
        for raw in ["", "1abc", "drop table x; --", "f(1)", "a.b.c", "\"Quoted\""] {
            assert!(
                matches!(routine_call_sql(raw), Err(StoreError::InvalidIdentifier(_))),
                "{raw:?}"
            );
        }
    }
}
