//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

extern crate common;

use std::collections::HashSet;
use std::path::Path;

use common::files;
use common::timer;

use crate::identifier::IdentifierConfig;
use crate::shared::ProtocolError;
use crate::shared::TDomain;
use crate::shared::TFeatures;

/// Label columns tried in order when the requested one is absent
pub const LABEL_FALLBACKS: [&str; 2] = ["will_purchase", "purchase_amount"];

/// One party's local table split into identifiers, features and the
/// optional label column
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartyData {
    pub identifiers: Vec<String>,
    pub feature_names: Vec<String>,
    pub features: TFeatures,
    pub label_name: Option<String>,
    pub labels: Option<Vec<TDomain>>,
}

impl PartyData {
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Keeps the rows at `rows`, in that order
    pub fn select_rows(&self, rows: &[usize]) -> PartyData {
        PartyData {
            identifiers: rows.iter().map(|&r| self.identifiers[r].clone()).collect(),
            feature_names: self.feature_names.clone(),
            features: rows.iter().map(|&r| self.features[r].clone()).collect(),
            label_name: self.label_name.clone(),
            labels: self
                .labels
                .as_ref()
                .map(|l| rows.iter().map(|&r| l[r]).collect()),
        }
    }
}

/// Picks the label column: the requested name if present, otherwise the
/// first fallback candidate found in the header
pub fn find_label_column(headers: &[String], requested: Option<&str>) -> Option<usize> {
    requested
        .and_then(|r| headers.iter().position(|h| h == r))
        .or_else(|| {
            LABEL_FALLBACKS
                .iter()
                .find_map(|c| headers.iter().position(|h| h == c))
        })
}

fn parse_value(v: &str, row: usize, column: &str) -> Result<TDomain, ProtocolError> {
    v.parse::<TDomain>().map_err(|_| {
        ProtocolError::ErrorData(format!(
            "row {}: column '{}' value '{}' is not numeric",
            row + 1,
            column,
            v
        ))
    })
}

/// Loads a CSV with a header row. Rows whose identifier was already seen
/// are dropped, keeping the first occurrence.
pub fn load_party_data<T>(
    path: T,
    id_config: &IdentifierConfig,
    label: Option<&str>,
) -> Result<PartyData, ProtocolError>
where
    T: AsRef<Path>,
{
    let mut t = timer::Timer::new_silent("load");
    let name = path.as_ref().display().to_string();
    let (headers, rows) = files::read_csv_with_headers(&path)?;

    let id_idx = id_config.column_indices(&headers)?;
    let label_idx = find_label_column(&headers, label);
    let feature_idx = (0..headers.len())
        .filter(|i| !id_idx.contains(i) && Some(*i) != label_idx)
        .collect::<Vec<usize>>();

    let mut data = PartyData {
        feature_names: feature_idx.iter().map(|&i| headers[i].clone()).collect(),
        label_name: label_idx.map(|i| headers[i].clone()),
        labels: label_idx.map(|_| Vec::with_capacity(rows.len())),
        ..PartyData::default()
    };

    let mut seen = HashSet::with_capacity(rows.len());
    for (r, row) in rows.iter().enumerate() {
        let id = id_config.identifier(row, &id_idx);
        if !seen.insert(id.clone()) {
            continue;
        }
        let x = feature_idx
            .iter()
            .map(|&i| parse_value(&row[i], r, &headers[i]))
            .collect::<Result<Vec<TDomain>, ProtocolError>>()?;
        if let (Some(i), Some(labels)) = (label_idx, data.labels.as_mut()) {
            labels.push(parse_value(&row[i], r, &headers[i])?);
        }
        data.identifiers.push(id);
        data.features.push(x);
    }

    if data.len() < rows.len() {
        warn!(
            "{}: dropped {} rows with duplicate identifiers",
            name,
            rows.len() - data.len()
        );
    }
    t.qps("text read", rows.len());
    info!(
        "Data initialised with dimensions: cols: {}, rows: {}, label: {}",
        data.feature_names.len(),
        data.len(),
        data.label_name.as_deref().unwrap_or("-")
    );
    Ok(data)
}
