//! Lease file loading.
//!
//! A load reads the whole file through the record parser and produces a
//! fresh [`Snapshot`]. Any bad line or duplicate identity fails the entire
//! load, so a half-edited file can never replace a good table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{Family, parse_record};
use crate::table::Snapshot;

/// Returns true for lines the parser never sees: blanks and `#` comments.
fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Loads the lease file at `path` for the given family.
///
/// # Errors
///
/// - [`Error::Read`] if the file cannot be opened or read
/// - [`Error::Parse`] for the first line the record parser rejects
/// - [`Error::DuplicateKey`] if an identity is declared twice
pub async fn load<P: AsRef<Path>>(path: P, family: Family) -> Result<Snapshot> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let snapshot = load_from_reader(BufReader::new(file), path, family)
        .await?
        .with_source(path);

    info!(
        "Loaded {} {} lease(s) from {}",
        snapshot.len(),
        family,
        path.display()
    );
    Ok(snapshot)
}

/// Builds a snapshot from any line-oriented reader.
///
/// `path` is only used to label errors.
pub async fn load_from_reader<R>(reader: R, path: &Path, family: Family) -> Result<Snapshot>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut records = HashMap::new();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })? {
        line_number += 1;
        let line = line.trim();
        if is_skipped(line) {
            continue;
        }

        let (key, config) = parse_record(line, family).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            line: line_number,
            source,
        })?;

        match records.entry(key) {
            Entry::Occupied(entry) => {
                let (_, first_line) = *entry.get();
                return Err(Error::DuplicateKey {
                    path: path.to_path_buf(),
                    line: line_number,
                    first_line,
                    key: entry.key().clone(),
                });
            }
            Entry::Vacant(entry) => {
                debug!("{}:{}: {} -> {}", path.display(), line_number, entry.key(), config);
                entry.insert((config, line_number));
            }
        }
    }

    let records = records
        .into_iter()
        .map(|(key, (config, _))| (key, config))
        .collect();
    Ok(Snapshot::from_parsed(family, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::LookupKey;
    use crate::record::{LeaseConfig, ParseError};
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr};

    fn lease_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn mac(text: &str) -> LookupKey {
        LookupKey::Mac(text.parse().unwrap())
    }

    #[tokio::test]
    async fn test_load_valid_v4_file() {
        let file = lease_file(concat!(
            "00:11:22:33:44:55 192.0.2.100\n",
            "11:22:33:44:55:66 192.0.2.101\n",
            "# this is a comment\n",
            "\n",
            "Subscriber-ID:\"Test subscriber 1\" 192.0.2.110\n",
            "Subscriber-ID:\"Test subscriber \\\"2\\\"\" 192.0.2.111\n",
            "Circuit-ID:\"circuit1\" 192.0.2.111\n",
            "Remote-ID:\"remote1\" 192.0.2.111\n",
            "22:33:44:55:66:77 10.10.10.50,255.255.255.0,10.10.10.1\n",
            "22:33:44:55:66:78 10.10.10.50,255.255.255.0\n",
            "   22:33:44:55:66:79 10.10.10.50,0.0.0.0   \n",
        ));

        let snapshot = load(file.path(), Family::V4).await.unwrap();
        assert_eq!(snapshot.len(), 9);
        assert_eq!(snapshot.source(), Some(file.path()));
        assert_eq!(
            snapshot.get(&mac("00:11:22:33:44:55")),
            Some(&LeaseConfig::v4(Ipv4Addr::new(192, 0, 2, 100)))
        );
        assert_eq!(
            snapshot
                .get(&LookupKey::SubscriberId("Test subscriber \"2\"".to_string()))
                .map(LeaseConfig::address),
            Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 111)))
        );
        assert!(snapshot.get(&LookupKey::CircuitId(b"circuit1".to_vec())).is_some());
        assert!(snapshot.get(&LookupKey::RemoteId(b"remote1".to_vec())).is_some());
        assert_eq!(
            snapshot.get(&mac("22:33:44:55:66:77")),
            Some(&LeaseConfig::v4_with_gateway(
                Ipv4Addr::new(10, 10, 10, 50),
                Ipv4Addr::new(255, 255, 255, 0),
                Ipv4Addr::new(10, 10, 10, 1),
            ))
        );
        assert_eq!(
            snapshot.get(&mac("22:33:44:55:66:79")).and_then(LeaseConfig::netmask),
            Some(Ipv4Addr::UNSPECIFIED)
        );
    }

    #[tokio::test]
    async fn test_load_valid_v6_file() {
        let file = lease_file(
            "00:11:22:33:44:55 2001:db8::10:1\n11:22:33:44:55:66 2001:db8::10:2\n# comment\n",
        );
        let snapshot = load(file.path(), Family::V6).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get(&mac("11:22:33:44:55:66")).map(LeaseConfig::address),
            Some("2001:db8::10:2".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_one_bad_line_fails_whole_load() {
        let file = lease_file(
            "00:11:22:33:44:55 192.0.2.100\nabcd 192.0.2.102\n11:22:33:44:55:66 192.0.2.101\n",
        );
        let error = load(file.path(), Family::V4).await.unwrap_err();
        match error {
            Error::Parse { line, source, .. } => {
                assert_eq!(line, 2);
                assert_eq!(source, ParseError::InvalidHardwareAddr("abcd".to_string()));
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_is_load_error() {
        let file = lease_file(
            "00:11:22:33:44:55 192.0.2.100\n# gap\n00-11-22-33-44-55 192.0.2.101\n",
        );
        let error = load(file.path(), Family::V4).await.unwrap_err();
        match error {
            Error::DuplicateKey {
                line, first_line, key, ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(first_line, 1);
                assert_eq!(key, mac("00:11:22:33:44:55"));
            }
            other => panic!("Expected DuplicateKey error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_text_under_different_kinds_is_not_duplicate() {
        let file = lease_file(
            "Circuit-ID:\"port1\" 192.0.2.1\nRemote-ID:\"port1\" 192.0.2.2\nSubscriber-ID:\"port1\" 192.0.2.3\n",
        );
        let snapshot = load(file.path(), Family::V4).await.unwrap();
        assert_eq!(snapshot.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let error = load("/nonexistent/leases.txt", Family::V4).await.unwrap_err();
        assert!(matches!(error, Error::Read { .. }));
    }

    #[tokio::test]
    async fn test_load_from_reader() {
        let text: &[u8] = b"# only comments\n\n#00:11:22:33:44:55 192.0.2.1\n";
        let snapshot = load_from_reader(text, Path::new("inline"), Family::V4)
            .await
            .unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.source(), None);
    }
}
