/// Wallet output parsing
///
/// The indexer's CLI output format is not a stable contract: newer builds
/// print JSON, older ones free text, and either may change shape. Every
/// extractor therefore tries a strict JSON decode first and falls back to
/// pattern extraction, and both paths stay under direct test.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::network::Network;

fn inscription_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9a-f]{64}i[0-9]+\b").expect("hardcoded regex"))
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9]+\b").expect("hardcoded regex"))
}

/// JSON documents found in the output: the whole text first, then each
/// individual line (the binary mixes log lines with its JSON answer).
fn json_candidates(output: &str) -> Vec<Value> {
    let mut candidates = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(output.trim()) {
        candidates.push(value);
    } else {
        for line in output.lines() {
            if let Ok(value) = serde_json::from_str::<Value>(line.trim()) {
                candidates.push(value);
            }
        }
    }
    candidates
}

/// Extract a receive address: JSON `address` / `addresses[0]`, else the
/// first token carrying the network's bech32 prefix.
pub fn address(output: &str, network: Network) -> Option<String> {
    for value in json_candidates(output) {
        if let Some(addr) = value.get("address").and_then(Value::as_str) {
            return Some(addr.to_string());
        }
        if let Some(addr) = value
            .get("addresses")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(Value::as_str)
        {
            return Some(addr.to_string());
        }
    }

    let pattern = format!(r"\b{}[0-9a-z]{{8,87}}\b", network.address_prefix());
    Regex::new(&pattern)
        .ok()?
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Extract an inscription id: JSON `inscriptions[].id` / `inscription`,
/// else the first `hex64 "i" index` token.
pub fn inscription_id(output: &str) -> Option<String> {
    for value in json_candidates(output) {
        if let Some(id) = value
            .get("inscriptions")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|entry| entry.get("id"))
            .and_then(Value::as_str)
        {
            return Some(id.to_string());
        }
        if let Some(id) = value.get("inscription").and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }

    inscription_regex()
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Extract a spendable balance in minimal units: JSON `cardinal` / `total`,
/// else the first bare integer.
pub fn balance(output: &str) -> Option<u64> {
    for value in json_candidates(output) {
        if let Some(n) = value.get("cardinal").and_then(Value::as_u64) {
            return Some(n);
        }
        if let Some(n) = value.get("total").and_then(Value::as_u64) {
            return Some(n);
        }
    }

    integer_regex()
        .find(output)
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str =
        "275ce589dd24cfba74d79a1d12606fbae9a20575d9c18e12b15a40e4a56a25c3i0";

    #[test]
    fn test_address_from_json_object() {
        let out = r#"{"address": "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080"}"#;
        assert_eq!(
            address(out, Network::Regtest).as_deref(),
            Some("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080")
        );
    }

    #[test]
    fn test_address_from_json_array() {
        let out = r#"{"addresses": ["bcrt1qabc000011112222", "bcrt1qother"]}"#;
        assert_eq!(
            address(out, Network::Regtest).as_deref(),
            Some("bcrt1qabc000011112222")
        );
    }

    #[test]
    fn test_address_regex_fallback_respects_network_prefix() {
        let out = "your new address: bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080 (keep it safe)";
        assert!(address(out, Network::Regtest).is_some());
        // Same text parsed for mainnet finds nothing: wrong prefix.
        assert!(address(out, Network::Mainnet).is_none());
    }

    #[test]
    fn test_address_json_mixed_with_log_lines() {
        let out = "syncing index...\n{\"address\": \"tb1qmixedcase000001\"}\ndone\n";
        assert_eq!(
            address(out, Network::Signet).as_deref(),
            Some("tb1qmixedcase000001")
        );
    }

    #[test]
    fn test_inscription_id_from_json() {
        let out = format!(r#"{{"commit": "ff", "inscriptions": [{{"id": "{}", "location": "x"}}]}}"#, ID);
        assert_eq!(inscription_id(&out).as_deref(), Some(ID));
    }

    #[test]
    fn test_inscription_id_regex_fallback() {
        let out = format!("inscribed as {} in block 9", ID);
        assert_eq!(inscription_id(&out).as_deref(), Some(ID));
    }

    #[test]
    fn test_inscription_id_absent() {
        assert!(inscription_id("nothing inscribed here").is_none());
        // 63 hex chars is not an id
        assert!(inscription_id(&format!("{}i0", "a".repeat(63))).is_none());
    }

    #[test]
    fn test_balance_from_json() {
        assert_eq!(
            balance(r#"{"cardinal": 50000, "ordinal": 2, "total": 50002}"#),
            Some(50000)
        );
        assert_eq!(balance(r#"{"total": 123}"#), Some(123));
    }

    #[test]
    fn test_balance_bare_integer_fallback() {
        assert_eq!(balance("balance: 98765 sats"), Some(98765));
        assert_eq!(balance("0"), Some(0));
        assert!(balance("no digits at all").is_none());
    }
}
