//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use protocol::fileio::*;
use protocol::identifier::IdentifierConfig;
use protocol::shared::ProtocolError;

fn combined() -> IdentifierConfig {
    IdentifierConfig::from_json(r#"{"mode": "combined", "columns": ["first_name", "last_name"]}"#)
        .unwrap()
}

#[test]
fn test_load_combined_identifiers() {
    let data = load_party_data("./tests/party_b.csv", &combined(), Some("purchase_amount")).unwrap();
    assert_eq!(data.identifiers, vec!["ann_lee", "bob_ray", "cid_moe"]);
    assert_eq!(data.feature_names, vec!["visits"]);
    assert_eq!(data.features, vec![vec![3.0], vec![5.0], vec![1.0]]);
    assert_eq!(data.label_name.as_deref(), Some("purchase_amount"));
    assert_eq!(data.labels, Some(vec![10.0, 12.5, 4.0]));
}

#[test]
fn test_label_fallback_and_selection() {
    let data = load_party_data("./tests/party_b.csv", &combined(), Some("churn")).unwrap();
    assert_eq!(data.label_name.as_deref(), Some("purchase_amount"));

    let picked = data.select_rows(&[2, 0]);
    assert_eq!(picked.identifiers, vec!["cid_moe", "ann_lee"]);
    assert_eq!(picked.labels, Some(vec![4.0, 10.0]));
}

#[test]
fn test_missing_identifier_column() {
    let res = load_party_data("./tests/party_b.csv", &IdentifierConfig::default(), None);
    assert!(matches!(res, Err(ProtocolError::ErrorData(_))));
}

#[test]
fn test_non_numeric_value() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "user_id,age").unwrap();
    writeln!(f, "u1,old").unwrap();
    let res = load_party_data(f.path(), &IdentifierConfig::default(), None);
    assert!(matches!(res, Err(ProtocolError::ErrorData(_))));
}
