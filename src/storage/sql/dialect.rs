use sea_orm::DbBackend;

use crate::errors::{StoreError, StoreResult};

/// SQL dialects the raw engine speaks.
///
/// Statements are written once with `?` placeholders and rewritten for
/// backends that number their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn for_backend(backend: DbBackend) -> StoreResult<Self> {
        match backend {
            DbBackend::Sqlite => Ok(Dialect::Sqlite),
            DbBackend::Postgres => Ok(Dialect::Postgres),
            other => Err(StoreError::Unsupported(format!(
                "the sql engine has no dialect for {other:?}; use engine = \"orm\""
            ))),
        }
    }

    pub fn backend(self) -> DbBackend {
        match self {
            Dialect::Sqlite => DbBackend::Sqlite,
            Dialect::Postgres => DbBackend::Postgres,
        }
    }

    /// Rewrite `?` placeholders into this dialect's form. Question marks
    /// inside single-quoted literals are left alone.
    pub fn bind(self, sql: &str) -> String {
        if self == Dialect::Sqlite {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 16);
        let mut in_literal = false;
        let mut n = 0;
        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '?' if !in_literal => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(ch),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_keeps_question_marks() {
        let sql = "SELECT 1 FROM t WHERE a = ? AND b = ?";
        assert_eq!(Dialect::Sqlite.bind(sql), sql);
    }

    #[test]
    fn test_postgres_numbers_placeholders() {
        assert_eq!(
            Dialect::Postgres.bind("UPDATE t SET a = ? WHERE b = ? AND c = ?"),
            "UPDATE t SET a = $1 WHERE b = $2 AND c = $3"
        );
    }

    #[test]
    fn test_postgres_skips_literals() {
        assert_eq!(
            Dialect::Postgres.bind("SELECT '?' || ? FROM t WHERE x = 'a''?'"),
            "SELECT '?' || $1 FROM t WHERE x = 'a''?'"
        );
    }

    #[test]
    fn test_mysql_is_unsupported() {
        let err = Dialect::for_backend(DbBackend::MySql).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
