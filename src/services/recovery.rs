/// On-disk recovery for the indexer
///
/// The indexer refuses to open index or wallet databases written by an
/// incompatible version. That condition is classified from stderr text and
/// recovered by wiping the stale files and retrying the interrupted
/// operation exactly once.
use std::path::{Path, PathBuf};

use crate::network::Network;

/// Fixed stderr signatures indicating on-disk schema incompatibility.
pub const VERSION_MISMATCH_SIGNATURES: &[&str] = &[
    "Manual upgrade required",
    "Expected file format version",
    "failed to open index",
    "failed to open wallet database",
];

/// True if the text carries any schema-incompatibility signature.
pub fn is_version_mismatch(text: &str) -> bool {
    VERSION_MISMATCH_SIGNATURES
        .iter()
        .any(|signature| text.contains(signature))
}

/// Two-state attempt machine making the "recover at most once" invariant
/// structural: only a `First` attempt may transition into recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartAttempt {
    First,
    Recovered,
}

impl StartAttempt {
    pub fn may_recover(self) -> bool {
        matches!(self, StartAttempt::First)
    }
}

/// Candidate locations of the indexer's index file and wallet databases for
/// the given network. Both the current per-network layout and the legacy
/// flat layout are listed, since the location itself may have moved across
/// the version boundary being recovered from.
pub fn stale_data_paths(data_dir: &Path, network: Network) -> Vec<PathBuf> {
    let network_dir = match network.subdir() {
        Some(sub) => data_dir.join(sub),
        None => data_dir.to_path_buf(),
    };

    let mut paths = vec![network_dir.join("index.redb"), network_dir.join("wallets")];
    if network_dir != data_dir {
        paths.push(data_dir.join("index.redb"));
        paths.push(data_dir.join("wallets"));
    }
    paths
}

/// Delete stale index and wallet data for the network. Returns the paths
/// actually removed; paths that do not exist are skipped silently.
pub fn wipe_stale_data(data_dir: &Path, network: Network) -> std::io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in stale_data_paths(data_dir, network) {
        if !path.exists() {
            continue;
        }
        log::warn!("Removing stale indexer data: {}", path.display());
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_matches_signatures() {
        assert!(is_version_mismatch("error: Manual upgrade required"));
        assert!(is_version_mismatch(
            "Expected file format version 13, got 11"
        ));
        assert!(is_version_mismatch("failed to open index at /tmp/index.redb"));
        assert!(is_version_mismatch("failed to open wallet database"));
    }

    #[test]
    fn test_classifier_rejects_unrelated_errors() {
        assert!(!is_version_mismatch("Connection refused"));
        assert!(!is_version_mismatch("Bitcoin RPC error"));
        assert!(!is_version_mismatch("Network timeout"));
        assert!(!is_version_mismatch(""));
    }

    #[test]
    fn test_attempt_machine_recovers_only_once() {
        assert!(StartAttempt::First.may_recover());
        assert!(!StartAttempt::Recovered.may_recover());
    }

    #[test]
    fn test_stale_paths_cover_both_layouts() {
        let data_dir = PathBuf::from("/data/ord");
        let paths = stale_data_paths(&data_dir, Network::Regtest);
        assert!(paths.contains(&PathBuf::from("/data/ord/regtest/index.redb")));
        assert!(paths.contains(&PathBuf::from("/data/ord/regtest/wallets")));
        assert!(paths.contains(&PathBuf::from("/data/ord/index.redb")));
        assert!(paths.contains(&PathBuf::from("/data/ord/wallets")));
    }

    #[test]
    fn test_stale_paths_mainnet_single_layout() {
        let data_dir = PathBuf::from("/data/ord");
        let paths = stale_data_paths(&data_dir, Network::Mainnet);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/ord/index.redb"),
                PathBuf::from("/data/ord/wallets"),
            ]
        );
    }

    #[test]
    fn test_wipe_removes_existing_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let net_dir = tmp.path().join("regtest");
        std::fs::create_dir_all(net_dir.join("wallets")).unwrap();
        std::fs::write(net_dir.join("index.redb"), b"stale").unwrap();

        let removed = wipe_stale_data(tmp.path(), Network::Regtest).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!net_dir.join("index.redb").exists());
        assert!(!net_dir.join("wallets").exists());

        // Second wipe finds nothing left.
        let removed = wipe_stale_data(tmp.path(), Network::Regtest).unwrap();
        assert!(removed.is_empty());
    }
}
