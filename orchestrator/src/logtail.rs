//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Follows one party's log file the way `tail -f` does.

use std::io;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::supervisor::ExitCodes;

const LINE_BUFFER: usize = 64;

pub fn sentinel(party: usize) -> String {
    format!("[Party {}] MPC task complete", party)
}

struct Follower {
    path: PathBuf,
    party: usize,
    exits: watch::Receiver<ExitCodes>,
    poll: Duration,
    out: mpsc::Sender<String>,
}

impl Follower {
    fn exited(&self) -> bool {
        self.exits
            .borrow()
            .get(self.party)
            .map_or(true, |code| code.is_some())
    }

    async fn run(self) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        let prefix = Regex::new(&format!(r"^\[Party {}\] ", self.party))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let done = sentinel(self.party);

        let mut pos = file.seek(SeekFrom::End(0)).await?;
        let mut pending: Vec<u8> = vec![];
        let mut finished = false;
        loop {
            // sampled before reading so a final write is never missed
            let exited = self.exited();

            let len = file.metadata().await?.len();
            if len < pos {
                debug!("{} was truncated, rewinding", self.path.display());
                pos = file.seek(SeekFrom::Start(0)).await?;
                pending.clear();
            }
            // bytes are decoded per whole line, a chunk may split a character
            let read = file.read_to_end(&mut pending).await?;
            pos += read as u64;

            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let raw = pending.drain(..=end).collect::<Vec<u8>>();
                let line = String::from_utf8_lossy(&raw[..end])
                    .trim_end_matches('\r')
                    .to_string();
                if !prefix.is_match(&line) {
                    continue;
                }
                if line.starts_with(&done) {
                    finished = true;
                }
                if self.out.send(line).await.is_err() {
                    return Ok(());
                }
            }

            if exited && (finished || read == 0) {
                let rest = String::from_utf8_lossy(&pending).into_owned();
                if prefix.is_match(&rest) {
                    let _ = self.out.send(rest).await;
                }
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll) => {}
                _ = self.out.closed() => return Ok(()),
            }
        }
    }
}

/// Streams the lines of `path` that belong to `party`, starting from the
/// end of the file. The stream ends once the party's process has exited
/// and the log is drained, or when the receiver is dropped.
pub fn tail(
    path: PathBuf,
    party: usize,
    exits: watch::Receiver<ExitCodes>,
    poll: Duration,
) -> mpsc::Receiver<String> {
    let (out, rx) = mpsc::channel(LINE_BUFFER);
    let follower = Follower {
        path,
        party,
        exits,
        poll,
        out,
    };
    tokio::spawn(async move {
        let path = follower.path.clone();
        if let Err(e) = follower.run().await {
            warn!("Stopped following {}: {}", path.display(), e);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::time::timeout;

    fn append(path: &std::path::Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = vec![];
        while let Some(l) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            lines.push(l);
        }
        lines
    }

    #[tokio::test]
    async fn follows_new_lines_of_one_party() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s").join("log_1.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[Party 1] old line\n").unwrap();

        let (tx, exits) = watch::channel(vec![None, None]);
        let rx = tail(path.clone(), 1, exits, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;

        append(&path, "[Party 1] Loaded 3 samples\n[Party 0] not mine\nnoise\n[Party 1] half");
        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, " a line\n[Party 1] MPC task complete\n");
        tx.send_modify(|codes| codes[1] = Some(0));

        assert_eq!(
            collect(rx).await,
            vec![
                "[Party 1] Loaded 3 samples",
                "[Party 1] half a line",
                "[Party 1] MPC task complete",
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_character_split_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_0.log");
        std::fs::write(&path, "").unwrap();
        let (tx, exits) = watch::channel(vec![None]);
        let rx = tail(path.clone(), 0, exits, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let line = "[Party 0] Café résumé\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&line[..split]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.write_all(&line[split..]).unwrap();
        tx.send_modify(|codes| codes[0] = Some(0));

        assert_eq!(collect(rx).await, vec!["[Party 0] Café résumé"]);
    }

    #[tokio::test]
    async fn creates_missing_log_and_stops_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new").join("log_0.log");
        let (_tx, exits) = watch::channel(vec![Some(1)]);
        let rx = tail(path.clone(), 0, exits, Duration::from_millis(10));
        assert!(collect(rx).await.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn dropping_the_receiver_stops_the_follower() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_0.log");
        let (tx, exits) = watch::channel(vec![None]);
        let rx = tail(path, 0, exits, Duration::from_millis(10));
        drop(rx);
        timeout(Duration::from_secs(5), tx.closed()).await.unwrap();
    }
}
