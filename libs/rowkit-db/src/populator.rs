//! Schema/data population from SQL scripts.
//!
//! Scripts are split into statements on `;` outside quotes and comments.
//! Comments are stripped; empty statements are skipped.

use std::path::Path;

use crate::named::{skip_block_comment, skip_dollar_quoted, skip_line_comment, skip_quoted};
use crate::{DbConn, DbError, Result};

/// Outcome of [`ScriptPopulator::populate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Statements that ran successfully.
    pub executed: usize,
    /// Statements that failed and were tolerated.
    pub ignored: usize,
}

/// Executes SQL scripts in order against one connection.
#[derive(Clone, Debug, Default)]
pub struct ScriptPopulator {
    scripts: Vec<Script>,
    ignore_failed_drops: bool,
    continue_on_error: bool,
}

#[derive(Clone, Debug)]
struct Script {
    name: String,
    text: String,
}

impl ScriptPopulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_script(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.scripts.push(Script {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    /// Read a script file now; the file name becomes the script name.
    ///
    /// # Errors
    /// Returns `DbError::Io` if the file cannot be read.
    pub fn add_script_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Ok(self.add_script(path.display().to_string(), text))
    }

    /// Tolerate failures of `DROP` statements (dropping objects that do not exist yet).
    #[must_use]
    pub fn ignore_failed_drops(mut self, ignore: bool) -> Self {
        self.ignore_failed_drops = ignore;
        self
    }

    /// Tolerate every failing statement.
    #[must_use]
    pub fn continue_on_error(mut self, cont: bool) -> Self {
        self.continue_on_error = cont;
        self
    }

    #[must_use]
    pub fn ignores_failed_drops(&self) -> bool {
        self.ignore_failed_drops
    }

    #[must_use]
    pub fn continues_on_error(&self) -> bool {
        self.continue_on_error
    }

    #[must_use]
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Run every statement of every script, in order.
    ///
    /// # Errors
    /// Returns `DbError::Script` for the first failing statement that is not tolerated.
    pub async fn populate(&self, mut conn: DbConn<'_>) -> Result<PopulateReport> {
        let mut report = PopulateReport::default();
        for script in &self.scripts {
            for (index, statement) in split_statements(&script.text).into_iter().enumerate() {
                let index = index + 1;
                match conn.execute_raw(&statement).await {
                    Ok(_) => {
                        tracing::debug!(script = %script.name, index, "statement executed");
                        report.executed += 1;
                    }
                    Err(e) if self.tolerates(&statement) => {
                        tracing::warn!(
                            script = %script.name,
                            index,
                            statement = %statement,
                            error = %e,
                            "ignoring failed statement"
                        );
                        report.ignored += 1;
                    }
                    Err(source) => {
                        return Err(DbError::Script {
                            index,
                            statement,
                            source,
                        });
                    }
                }
            }
        }
        tracing::info!(
            scripts = self.scripts.len(),
            executed = report.executed,
            ignored = report.ignored,
            "database populated"
        );
        Ok(report)
    }

    fn tolerates(&self, statement: &str) -> bool {
        self.continue_on_error || (self.ignore_failed_drops && is_drop(statement))
    }
}

fn is_drop(statement: &str) -> bool {
    statement
        .trim_start()
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("drop"))
}

/// Split a script into trimmed statements, dropping comments and empty statements.
///
/// Semicolons inside literals and `$tag$` bodies do not end a statement.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let bytes = script.as_bytes();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut copied_from = 0;
    let mut i = 0;

    let mut finish = |current: &mut String| {
        let stmt = current.trim();
        if !stmt.is_empty() {
            statements.push(stmt.to_owned());
        }
        current.clear();
    };

    while let Some(&b) = bytes.get(i) {
        let next = bytes.get(i + 1).copied();
        match (b, next) {
            (b'\'' | b'"' | b'`', _) => i = skip_quoted(bytes, i),
            (b'$', _) => i = skip_dollar_quoted(bytes, i).unwrap_or(i + 1),
            (b'-', Some(b'-')) => {
                current.push_str(&script[copied_from..i]);
                i = skip_line_comment(bytes, i);
                copied_from = i;
            }
            (b'/', Some(b'*')) => {
                current.push_str(&script[copied_from..i]);
                current.push(' ');
                i = skip_block_comment(bytes, i);
                copied_from = i;
            }
            (b';', _) => {
                current.push_str(&script[copied_from..i]);
                finish(&mut current);
                i += 1;
                copied_from = i;
            }
            _ => i += 1,
        }
    }
    current.push_str(&script[copied_from..]);
    finish(&mut current);
    statements
}
