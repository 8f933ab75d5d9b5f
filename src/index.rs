//! Post-load index creation.
//!
//! One `CREATE INDEX` per requested column. A failure (index already present,
//! unknown column) is recorded against that column and the remaining indices
//! are still attempted; the load that preceded this stage stays valid.

use log::{info, warn};

use crate::{sink::RelationalSink, table};

/// Index name for `column` on `table`: `<column>_idx_<table>`.
pub fn index_name(table: &str, column: &str) -> String {
    format!("{column}_idx_{table}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    pub column: String,
    pub index: String,
    pub error: Option<String>,
}

impl IndexOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub table: String,
    pub outcomes: Vec<IndexOutcome>,
}

impl IndexReport {
    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &IndexOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn render(&self) -> String {
        let headers = vec![
            "index".to_string(),
            "column".to_string(),
            "status".to_string(),
            "detail".to_string(),
        ];
        let rows = self
            .outcomes
            .iter()
            .map(|outcome| {
                let (status, detail) = match &outcome.error {
                    None => ("created", String::new()),
                    Some(error) => ("WARNING", error.clone()),
                };
                vec![
                    outcome.index.clone(),
                    outcome.column.clone(),
                    status.to_string(),
                    detail,
                ]
            })
            .collect::<Vec<_>>();
        table::render_table(&headers, &rows)
    }
}

pub fn build_indices(
    sink: &mut dyn RelationalSink,
    table: &str,
    columns: &[String],
) -> IndexReport {
    let outcomes = columns
        .iter()
        .map(|column| {
            let index = index_name(table, column);
            let error = match sink.create_index(table, &index, column) {
                Ok(()) => {
                    info!("Created index {index} on {table}({column})");
                    None
                }
                Err(err) => {
                    warn!("Could not create index {index} on {table}({column}): {err:#}");
                    Some(format!("{err:#}"))
                }
            };
            IndexOutcome {
                column: column.clone(),
                index,
                error,
            }
        })
        .collect();
    IndexReport {
        table: table.to_string(),
        outcomes,
    }
}
