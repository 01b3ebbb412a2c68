//! SQL statement synthesis.
//!
//! Every builder returns a [`SqlQuery`]: statement text with positional `?N`
//! placeholders plus the text parameters to bind, in order. Identifiers have
//! already passed the allow-list and are quoted here; only raw conditions are
//! spliced in verbatim.

use crate::record::{Condition, FieldSet, Identifier};

/// Catalog lookup for an existing table, parameterized on the name.
///
/// Table names are case-insensitive in SQLite, so the match is too.
pub const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE";

/// Name of the auto-increment primary key every auto-created table carries.
pub const ID_COLUMN: &str = "id";

/// SQL statement with positional text parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<String>,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    /// Statement with each placeholder replaced by its quoted value.
    ///
    /// For log output only. Never execute the result.
    pub fn render_bound(&self) -> String {
        let mut out = String::with_capacity(self.statement.len());
        let mut rest = self.statement.as_str();
        let mut values = self.params.iter();

        while let Some(pos) = rest.find('?') {
            out.push_str(&rest[..pos]);
            let digits = rest[pos + 1..]
                .bytes()
                .take_while(|b| b.is_ascii_digit())
                .count();
            match values.next() {
                Some(value) => {
                    out.push('\'');
                    out.push_str(&value.replace('\'', "''"));
                    out.push('\'');
                }
                None => out.push_str(&rest[pos..pos + 1 + digits]),
            }
            rest = &rest[pos + 1 + digits..];
        }
        out.push_str(rest);
        out
    }
}

/// `CREATE TABLE` with an `id` primary key and one text column per field.
///
/// A field named `id` is covered by the primary key and gets no extra column.
pub fn create_table(table: &Identifier, fields: &FieldSet) -> SqlQuery {
    let mut columns = vec![format!("{ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT")];
    columns.extend(
        fields
            .columns()
            .filter(|col| !col.same_as(ID_COLUMN))
            .map(|col| format!("{} VARCHAR(255)", col.quoted())),
    );
    SqlQuery::new(format!(
        "CREATE TABLE {} ({})",
        table.quoted(),
        columns.join(", ")
    ))
}

pub fn insert(table: &Identifier, fields: &FieldSet) -> SqlQuery {
    let columns: Vec<String> = fields.columns().map(Identifier::quoted).collect();
    let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
    SqlQuery::new(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        columns.join(", "),
        placeholders.join(", ")
    ))
    .with_params(fields.values().map(str::to_string).collect())
}

pub fn update(table: &Identifier, fields: &FieldSet, condition: &Condition) -> SqlQuery {
    let assignments: Vec<String> = fields
        .columns()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col.quoted(), i + 1))
        .collect();
    let mut params: Vec<String> = fields.values().map(str::to_string).collect();
    let filter = where_clause(condition, &mut params);
    SqlQuery::new(format!(
        "UPDATE {} SET {}{}",
        table.quoted(),
        assignments.join(", "),
        filter
    ))
    .with_params(params)
}

pub fn delete(table: &Identifier, condition: &Condition) -> SqlQuery {
    let mut params = Vec::new();
    let filter = where_clause(condition, &mut params);
    SqlQuery::new(format!("DELETE FROM {}{}", table.quoted(), filter)).with_params(params)
}

pub fn select(table: &Identifier, condition: &Condition) -> SqlQuery {
    let mut params = Vec::new();
    let filter = where_clause(condition, &mut params);
    SqlQuery::new(format!("SELECT * FROM {}{}", table.quoted(), filter)).with_params(params)
}

// Appends any bound value to `params` so placeholder numbering continues.
fn where_clause(condition: &Condition, params: &mut Vec<String>) -> String {
    match condition {
        Condition::All => String::new(),
        Condition::Raw(expr) => format!(" WHERE {expr}"),
        Condition::Eq { column, value } => {
            params.push(value.clone());
            format!(" WHERE {} = ?{}", column.quoted(), params.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Identifier {
        Identifier::new("users").unwrap()
    }

    fn alice() -> FieldSet {
        FieldSet::new()
            .with_field("name", "alice")
            .unwrap()
            .with_field("age", "30")
            .unwrap()
    }

    #[test]
    fn test_create_table_statement() {
        let query = create_table(&users(), &alice());
        assert_eq!(
            query.statement,
            "CREATE TABLE \"users\" (id INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" VARCHAR(255), \"age\" VARCHAR(255))"
        );
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_create_table_skips_explicit_id() {
        let fields = alice().with_field("ID", "7").unwrap();
        let query = create_table(&users(), &fields);
        assert!(!query.statement.contains("\"ID\""));
    }

    #[test]
    fn test_insert_statement() {
        let query = insert(&users(), &alice());
        assert_eq!(
            query.statement,
            "INSERT INTO \"users\" (\"name\", \"age\") VALUES (?1, ?2)"
        );
        assert_eq!(query.params, vec!["alice", "30"]);
    }

    #[test]
    fn test_update_statement_numbers_condition_after_fields() {
        let query = update(&users(), &alice(), &Condition::raw("id = 1"));
        assert_eq!(
            query.statement,
            "UPDATE \"users\" SET \"name\" = ?1, \"age\" = ?2 WHERE id = 1"
        );

        let query = update(&users(), &alice(), &Condition::eq("id", "1").unwrap());
        assert_eq!(
            query.statement,
            "UPDATE \"users\" SET \"name\" = ?1, \"age\" = ?2 WHERE \"id\" = ?3"
        );
        assert_eq!(query.params, vec!["alice", "30", "1"]);
    }

    #[test]
    fn test_delete_and_select_statements() {
        assert_eq!(
            delete(&users(), &Condition::raw("age > 3")).statement,
            "DELETE FROM \"users\" WHERE age > 3"
        );
        assert_eq!(
            select(&users(), &Condition::all()).statement,
            "SELECT * FROM \"users\""
        );
        let query = select(&users(), &Condition::eq("name", "bob").unwrap());
        assert_eq!(query.statement, "SELECT * FROM \"users\" WHERE \"name\" = ?1");
        assert_eq!(query.params, vec!["bob"]);
    }

    #[test]
    fn test_render_bound_is_cosmetic() {
        let query = insert(&users(), &alice().with_field("note", "it's").unwrap());
        assert_eq!(
            query.render_bound(),
            "INSERT INTO \"users\" (\"name\", \"age\", \"note\") VALUES ('alice', '30', 'it''s')"
        );
        // The executable statement keeps its placeholders.
        assert!(query.statement.contains("?3"));
    }
}
