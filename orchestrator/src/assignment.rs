//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::files::read_csv_headers;
use serde::Serialize;

use crate::error::Result;
use crate::error::SessionError;

/// One worker slot of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartySlot {
    pub index: usize,
    pub user: String,
    pub input: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartyAssignment {
    pub slots: Vec<PartySlot>,
}

impl PartyAssignment {
    /// Orders the uploads by file name. The first file whose header holds
    /// `label` becomes party 0, the lead's file if none does. The rest
    /// follow in file name order.
    pub fn build(
        uploads: &BTreeMap<String, PathBuf>,
        lead: &str,
        label: &str,
    ) -> Result<PartyAssignment> {
        let mut files = uploads
            .iter()
            .map(|(user, path)| (user.clone(), path.clone()))
            .collect::<Vec<(String, PathBuf)>>();
        files.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()).then(a.0.cmp(&b.0)));

        let mut holder = None;
        for (pos, (user, path)) in files.iter().enumerate() {
            let headers = read_csv_headers(path).map_err(|e| {
                SessionError::InvalidRequest(format!("cannot read upload of {}: {}", user, e))
            })?;
            if headers.iter().any(|h| h == label) {
                holder = Some(pos);
                break;
            }
        }
        let first = match holder {
            Some(pos) => pos,
            None => {
                warn!(
                    "No uploaded file has label column '{}', lead {} becomes party 0",
                    label, lead
                );
                files
                    .iter()
                    .position(|(user, _)| user == lead)
                    .ok_or(SessionError::NotParticipant)?
            }
        };
        let head = files.remove(first);

        let slots = std::iter::once(head)
            .chain(files)
            .enumerate()
            .map(|(index, (user, input))| PartySlot { index, user, input })
            .collect();
        Ok(PartyAssignment { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn party_of(&self, user: &str) -> Option<usize> {
        self.slots.iter().find(|s| s.user == user).map(|s| s.index)
    }

    pub fn user_of(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(|s| s.user.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn uploads(dir: &std::path::Path, files: &[(&str, &str, &str)]) -> BTreeMap<String, PathBuf> {
        files
            .iter()
            .map(|(user, name, header)| {
                let path = dir.join(name);
                fs::write(&path, format!("{}\n", header)).unwrap();
                (user.to_string(), path)
            })
            .collect()
    }

    #[test]
    fn label_holder_is_party_zero_regardless_of_lead() {
        let dir = tempdir().unwrap();
        let up = uploads(
            dir.path(),
            &[
                ("carol", "c.csv", "user_id,z"),
                ("alice", "a.csv", "user_id,x,price"),
                ("bob", "b.csv", "user_id,y"),
            ],
        );
        let a = PartyAssignment::build(&up, "carol", "price").unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.user_of(0), Some("alice"));
        assert_eq!(a.user_of(1), Some("bob"));
        assert_eq!(a.user_of(2), Some("carol"));
        assert_eq!(a.party_of("carol"), Some(2));
    }

    #[test]
    fn lead_takes_party_zero_without_label() {
        let dir = tempdir().unwrap();
        let up = uploads(
            dir.path(),
            &[("alice", "a.csv", "user_id,x"), ("bob", "b.csv", "user_id,y")],
        );
        let a = PartyAssignment::build(&up, "bob", "price").unwrap();
        assert_eq!(a.user_of(0), Some("bob"));
        assert_eq!(a.user_of(1), Some("alice"));
    }

    #[test]
    fn first_label_holder_by_file_name_wins() {
        let dir = tempdir().unwrap();
        let up = uploads(
            dir.path(),
            &[
                ("zed", "b.csv", "user_id,price"),
                ("amy", "c.csv", "user_id,price"),
                ("lee", "a.csv", "user_id,x"),
            ],
        );
        let a = PartyAssignment::build(&up, "lee", "price").unwrap();
        assert_eq!(a.user_of(0), Some("zed"));
        assert_eq!(a.user_of(1), Some("lee"));
        assert_eq!(a.user_of(2), Some("amy"));
    }

    #[test]
    fn last_file_holding_the_label_leads_for_every_lead() {
        let dir = tempdir().unwrap();
        let up = uploads(
            dir.path(),
            &[
                ("ann", "a.csv", "user_id,x"),
                ("ben", "b.csv", "user_id,y"),
                ("cat", "c.csv", "user_id,z"),
                ("dan", "d.csv", "user_id,w,price"),
            ],
        );
        for lead in ["ann", "ben", "cat", "dan"] {
            let a = PartyAssignment::build(&up, lead, "price").unwrap();
            let order = (0..a.len()).filter_map(|i| a.user_of(i)).collect::<Vec<_>>();
            assert_eq!(order, vec!["dan", "ann", "ben", "cat"], "lead {}", lead);
            assert_eq!(a.slots[0].input, dir.path().join("d.csv"));
            assert!(a.slots.iter().enumerate().all(|(i, s)| s.index == i));
        }
    }

    #[test]
    fn lead_without_the_label_is_not_moved_first() {
        let dir = tempdir().unwrap();
        let up = uploads(
            dir.path(),
            &[("lead", "a.csv", "user_id,x"), ("guest", "b.csv", "user_id,price")],
        );
        let a = PartyAssignment::build(&up, "lead", "price").unwrap();
        assert_eq!(a.party_of("guest"), Some(0));
        assert_eq!(a.party_of("lead"), Some(1));
    }
}
