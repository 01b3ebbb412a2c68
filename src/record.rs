//! Value types passed into and out of the store: identifiers, field sets,
//! filter conditions and rows.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, StoreError};

const MAX_IDENTIFIER_LEN: usize = 64;

/// A table or column name that passed the allow-list.
///
/// First character is an ASCII letter or `_`, the rest ASCII alphanumerics or
/// `_`. Rendered into SQL double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason| StoreError::InvalidIdentifier {
            name: name.clone(),
            reason,
        };

        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return Err(invalid("cannot be empty"));
        };
        if !(first == '_' || first.is_ascii_alphabetic()) {
            return Err(invalid("must start with a letter or underscore"));
        }
        if !chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric()) {
            return Err(invalid("may only contain letters, digits and underscores"));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("is longer than 64 characters"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SQL form, e.g. `"users"`.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// SQLite compares identifiers case-insensitively.
    pub fn same_as(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered column name to text value mapping describing one record.
///
/// Insertion order is column order in the generated SQL. Inserting a name that
/// is already present (ignoring ASCII case) replaces its value in place.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<(Identifier, String)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field, validating its name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(col, _)| col.same_as(name)) {
            slot.1 = value;
            return Ok(());
        }
        self.fields.push((Identifier::new(name)?, value));
        Ok(())
    }

    /// Builder form of [`FieldSet::insert`].
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name.as_ref(), value)?;
        }
        Ok(set)
    }

    /// Parse a `key=value` request body.
    ///
    /// Pairs are separated by `&` or newlines; the first `=` splits key from
    /// value. Blank segments are skipped.
    pub fn parse_form(body: &str) -> Result<Self> {
        let mut set = Self::new();
        for segment in body.split(|c: char| c == '&' || c == '\n') {
            let segment = segment.trim_end_matches('\r');
            if segment.trim().is_empty() {
                continue;
            }
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| StoreError::MalformedForm(segment.to_string()))?;
            set.insert(name.trim(), value)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(col, _)| col.same_as(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &Identifier> {
        self.fields.iter().map(|(col, _)| col)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }
}

/// Filter applied to update, delete and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Every row; no WHERE clause.
    All,
    /// Trusted SQL boolean expression placed verbatim after `WHERE`.
    Raw(String),
    /// `"column" = ?` with the value bound as a parameter.
    Eq { column: Identifier, value: String },
}

impl Condition {
    pub fn all() -> Self {
        Condition::All
    }

    pub fn raw(expr: impl Into<String>) -> Self {
        Condition::Raw(expr.into())
    }

    pub fn eq(column: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Condition::Eq {
            column: Identifier::new(column)?,
            value: value.into(),
        })
    }

    /// Reject raw expressions that are blank or contain a statement separator.
    pub fn validate(&self) -> Result<()> {
        if let Condition::Raw(expr) = self {
            if expr.trim().is_empty() {
                return Err(StoreError::InvalidCondition(
                    "condition cannot be empty".to_string(),
                ));
            }
            if expr.contains(';') {
                return Err(StoreError::InvalidCondition(format!(
                    "condition may not contain ';': {expr}"
                )));
            }
        }
        Ok(())
    }
}

impl From<&str> for Condition {
    fn from(expr: &str) -> Self {
        Condition::raw(expr)
    }
}

impl From<String> for Condition {
    fn from(expr: String) -> Self {
        Condition::Raw(expr)
    }
}

/// One result row: column name to text value. NULL columns are left out.
pub type Row = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_allow_list() {
        assert!(Identifier::new("users").is_ok());
        assert!(Identifier::new("_tmp_2").is_ok());
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("2fast").is_err());
        assert!(Identifier::new("users; DROP TABLE x").is_err());
        assert!(Identifier::new("na\"me").is_err());
        assert!(Identifier::new("a".repeat(65)).is_err());
        assert_eq!(Identifier::new("users").unwrap().quoted(), "\"users\"");
    }

    #[test]
    fn test_field_set_keeps_order_and_replaces() {
        let mut fields = FieldSet::new();
        fields.insert("name", "alice").unwrap();
        fields.insert("age", "30").unwrap();
        fields.insert("NAME", "bob").unwrap();

        let columns: Vec<_> = fields.columns().map(|c| c.as_str()).collect();
        assert_eq!(columns, vec!["name", "age"]);
        assert_eq!(fields.values().collect::<Vec<_>>(), vec!["bob", "30"]);
        assert_eq!(fields.get("Name"), Some("bob"));
    }

    #[test]
    fn test_parse_form() {
        let fields = FieldSet::parse_form("name=alice&age=30&note=a=b&").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("note"), Some("a=b"));

        let fields = FieldSet::parse_form("key=value\r\nother=\n").unwrap();
        assert_eq!(fields.get("key"), Some("value"));
        assert_eq!(fields.get("other"), Some(""));

        assert!(matches!(
            FieldSet::parse_form("novalue"),
            Err(StoreError::MalformedForm(_))
        ));
        assert!(matches!(
            FieldSet::parse_form("bad-name=1"),
            Err(StoreError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_condition_validation() {
        assert!(Condition::from("id = 1").validate().is_ok());
        assert!(Condition::all().validate().is_ok());
        assert!(Condition::raw("  ").validate().is_err());
        assert!(Condition::raw("1=1; DROP TABLE users").validate().is_err());
        assert!(Condition::eq("bad col", "x").is_err());
    }
}
