//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde::Serialize;

use crate::shared::ProtocolError;

pub const DEFAULT_ID_COLUMN: &str = "user_id";
pub const DEFAULT_SEPARATOR: &str = "_";

/// How a record's matching identifier is built from its columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierConfig {
    Single(String),
    Combined {
        columns: Vec<String>,
        separator: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Single,
    Combined,
}

/// Wire form: `{"mode": "single"|"combined", "columns": [...], "separator": "_"}`
#[derive(Serialize, Deserialize)]
struct RawIdentifierConfig {
    mode: Mode,
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    separator: Option<String>,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        IdentifierConfig::Single(String::from(DEFAULT_ID_COLUMN))
    }
}

impl IdentifierConfig {
    pub fn from_json(json: &str) -> Result<IdentifierConfig, ProtocolError> {
        let raw: RawIdentifierConfig = serde_json::from_str(json)
            .map_err(|e| ProtocolError::ErrorConfig(format!("identifier config: {}", e)))?;
        match raw.mode {
            Mode::Single => match raw.columns.as_slice() {
                [column] => Ok(IdentifierConfig::Single(column.clone())),
                _ => Err(ProtocolError::ErrorConfig(String::from(
                    "Single mode requires exactly one column",
                ))),
            },
            Mode::Combined if raw.columns.is_empty() => Err(ProtocolError::ErrorConfig(
                String::from("Combined mode requires at least one column"),
            )),
            Mode::Combined => Ok(IdentifierConfig::Combined {
                columns: raw.columns,
                separator: raw
                    .separator
                    .unwrap_or_else(|| String::from(DEFAULT_SEPARATOR)),
            }),
        }
    }

    pub fn to_json(&self) -> String {
        let raw = match self {
            IdentifierConfig::Single(c) => RawIdentifierConfig {
                mode: Mode::Single,
                columns: vec![c.clone()],
                separator: None,
            },
            IdentifierConfig::Combined { columns, separator } => RawIdentifierConfig {
                mode: Mode::Combined,
                columns: columns.clone(),
                separator: Some(separator.clone()),
            },
        };
        // a struct of strings always serializes
        serde_json::to_string(&raw).unwrap_or_default()
    }

    pub fn columns(&self) -> Vec<&str> {
        match self {
            IdentifierConfig::Single(c) => vec![c.as_str()],
            IdentifierConfig::Combined { columns, .. } => {
                columns.iter().map(String::as_str).collect()
            }
        }
    }

    /// Positions of the identifier columns in `headers`
    pub fn column_indices(&self, headers: &[String]) -> Result<Vec<usize>, ProtocolError> {
        self.columns()
            .iter()
            .map(|c| {
                headers.iter().position(|h| h == c).ok_or_else(|| {
                    ProtocolError::ErrorData(format!("identifier column '{}' not in header", c))
                })
            })
            .collect()
    }

    /// Builds the identifier of one row given the resolved column positions
    pub fn identifier(&self, row: &[String], indices: &[usize]) -> String {
        let parts = indices
            .iter()
            .map(|&i| row.get(i).map(String::as_str).unwrap_or(""));
        match self {
            IdentifierConfig::Single(_) => parts.take(1).collect(),
            IdentifierConfig::Combined { separator, .. } => {
                parts.collect::<Vec<&str>>().join(separator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_single_and_combined() {
        assert_eq!(
            IdentifierConfig::from_json(r#"{"mode":"single","columns":["email"]}"#).unwrap(),
            IdentifierConfig::Single(String::from("email"))
        );
        let combined = IdentifierConfig::from_json(
            r#"{"mode":"combined","columns":["customer_id","email"]}"#,
        )
        .unwrap();
        assert_eq!(
            combined,
            IdentifierConfig::Combined {
                columns: strings(&["customer_id", "email"]),
                separator: String::from("_"),
            }
        );
        assert_eq!(IdentifierConfig::from_json(&combined.to_json()).unwrap(), combined);
    }

    #[test]
    fn single_mode_needs_one_column() {
        assert!(matches!(
            IdentifierConfig::from_json(r#"{"mode":"single","columns":["a","b"]}"#),
            Err(ProtocolError::ErrorConfig(_))
        ));
        assert!(IdentifierConfig::from_json(r#"{"mode":"other","columns":["a"]}"#).is_err());
    }

    #[test]
    fn builds_identifiers_from_rows() {
        let headers = strings(&["customer_id", "age", "email"]);
        let row = strings(&["1001", "34", "a@x.org"]);

        let single = IdentifierConfig::default();
        assert!(single.column_indices(&headers).is_err());

        let combined = IdentifierConfig::Combined {
            columns: strings(&["customer_id", "email"]),
            separator: String::from("|"),
        };
        let idx = combined.column_indices(&headers).unwrap();
        assert_eq!(idx, vec![0, 2]);
        assert_eq!(combined.identifier(&row, &idx), "1001|a@x.org");

        let by_id = IdentifierConfig::Single(String::from("customer_id"));
        let idx = by_id.column_indices(&headers).unwrap();
        assert_eq!(by_id.identifier(&row, &idx), "1001");
    }
}
