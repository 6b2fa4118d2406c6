//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::path::PathBuf;

use protocol::artifact::ResultArtifact;

use crate::error::Result;
use crate::error::SessionError;

pub fn load_result(path: &Path) -> Result<ResultArtifact> {
    if !path.exists() {
        return Err(SessionError::MissingArtifact(String::from(
            "Results not available yet",
        )));
    }
    ResultArtifact::read(path).map_err(|e| {
        SessionError::MissingArtifact(format!("Results could not be read: {}", e))
    })
}

/// Location of the trained model named by a result
pub fn model_file(result: &ResultArtifact) -> Result<PathBuf> {
    let path = result
        .summary
        .model_path
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| SessionError::MissingArtifact(String::from("Model file not available")))?;
    if !path.exists() {
        return Err(SessionError::MissingArtifact(String::from(
            "Model file not found",
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_result_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_result(&dir.path().join("result.json")).unwrap_err();
        assert_eq!(err.to_string(), "Results not available yet");
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingArtifact);

        std::fs::write(dir.path().join("result.json"), "{").unwrap();
        let err = load_result(&dir.path().join("result.json")).unwrap_err();
        assert!(err.to_string().starts_with("Results could not be read"));
    }
}
