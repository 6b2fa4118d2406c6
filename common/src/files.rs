//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

extern crate csv;

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{0} has no header row")]
    MissingHeader(String),
}

fn reader<T: AsRef<Path>>(filename: T) -> Result<csv::Reader<std::fs::File>, FileError> {
    let path = filename.as_ref().display().to_string();
    csv::ReaderBuilder::new()
        .delimiter(b',')
        .flexible(false)
        .has_headers(true)
        .from_path(filename)
        .map_err(|source| FileError::Csv { path, source })
}

/// Reads only the header row of a CSV file
pub fn read_csv_headers<T>(filename: T) -> Result<Vec<String>, FileError>
where
    T: AsRef<Path>,
{
    let path = filename.as_ref().display().to_string();
    let mut rdr = reader(filename)?;
    let headers = rdr
        .headers()
        .map_err(|source| FileError::Csv {
            path: path.clone(),
            source,
        })?
        .iter()
        .map(|h| String::from(h.trim()))
        .collect::<Vec<String>>();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(FileError::MissingHeader(path));
    }
    Ok(headers)
}

/// Reads CSV file with a header row into the header and a vector of rows,
/// where each row is represented as a vector of trimmed strings
pub fn read_csv_with_headers<T>(filename: T) -> Result<(Vec<String>, Vec<Vec<String>>), FileError>
where
    T: AsRef<Path>,
{
    let path = filename.as_ref().display().to_string();
    let headers = read_csv_headers(&filename)?;
    let mut rdr = reader(&filename)?;
    let rows = rdr
        .records()
        .map(|r| {
            r.map(|x| x.iter().map(|z| String::from(z.trim())).collect())
                .map_err(|source| FileError::Csv {
                    path: path.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<Vec<String>>, FileError>>()?;
    debug!("Read {} rows from {}", rows.len(), path);
    Ok((headers, rows))
}

/// Writes a header row followed by the rows
pub fn write_vec_to_csv<T>(
    headers: &[String],
    rows: &[Vec<String>],
    path: T,
) -> Result<(), Box<dyn std::error::Error>>
where
    T: AsRef<Path>,
{
    let mut wr = csv::WriterBuilder::new()
        .buffer_capacity(1024)
        .from_path(path)?;
    wr.write_record(headers)?;
    for line in rows.iter() {
        wr.write_record(line)?;
    }
    wr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn header_only_file() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "user_id, age").unwrap();
        let (h, rows) = read_csv_with_headers(f.path()).unwrap();
        assert_eq!(h, vec!["user_id", "age"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn ragged_rows_are_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "a,b\n1,2\n3").unwrap();
        assert!(matches!(
            read_csv_with_headers(f.path()),
            Err(FileError::Csv { .. })
        ));
    }

    #[test]
    fn empty_file_has_no_header() {
        let f = NamedTempFile::new().unwrap();
        assert!(matches!(
            read_csv_headers(f.path()),
            Err(FileError::MissingHeader(_))
        ));
    }
}
