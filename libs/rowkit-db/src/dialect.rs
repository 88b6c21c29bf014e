//! Per-engine SQL details.

use crate::DbEngine;

/// Placeholder style and identifier quoting for one engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// `$1, $2, ...`, double-quoted identifiers.
    Postgres,
    /// `?`, backtick-quoted identifiers.
    MySql,
    /// `?`, double-quoted identifiers.
    Sqlite,
}

impl Dialect {
    #[must_use]
    pub fn for_engine(engine: DbEngine) -> Self {
        match engine {
            DbEngine::Postgres => Dialect::Postgres,
            DbEngine::MySql => Dialect::MySql,
            DbEngine::Sqlite => Dialect::Sqlite,
        }
    }

    /// Write the placeholder for the 1-based parameter `index`.
    pub fn write_placeholder(self, out: &mut String, index: usize) {
        match self {
            Dialect::Postgres => {
                out.push('$');
                out.push_str(&index.to_string());
            }
            Dialect::MySql | Dialect::Sqlite => out.push('?'),
        }
    }

    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        let mut s = String::new();
        self.write_placeholder(&mut s, index);
        s
    }

    /// Quote an identifier, doubling any embedded quote character.
    #[must_use]
    pub fn quote_identifier(self, ident: &str) -> String {
        let q = match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        };
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }
}
