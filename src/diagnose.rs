/// Operator-facing error mapping
///
/// A fixed table of error-text patterns to a human-readable message, an
/// optional suggestion and an optional remediation command. Unmatched
/// errors fall back to "{context}: {raw message}".
#[derive(Debug, PartialEq)]
pub struct Remedy {
    pub message: String,
    pub suggestion: Option<&'static str>,
    pub command: Option<&'static str>,
}

struct Pattern {
    needle: &'static str,
    message: &'static str,
    suggestion: Option<&'static str>,
    command: Option<&'static str>,
}

const TABLE: &[Pattern] = &[
    Pattern {
        needle: "is the node running",
        message: "The node's cookie file is missing, so nothing can authenticate to it.",
        suggestion: Some("Start the services first."),
        command: Some("ord-harness start"),
    },
    Pattern {
        needle: "Connection refused",
        message: "Nothing is listening where a service was expected.",
        suggestion: Some("Start the services first."),
        command: Some("ord-harness start"),
    },
    Pattern {
        needle: "does not answer node RPC",
        message: "Another process occupies the node's RPC port.",
        suggestion: Some("Stop the conflicting process or configure a different RPC_PORT."),
        command: None,
    },
    Pattern {
        needle: "did not become ready",
        message: "A service started but never reached readiness; it was left running.",
        suggestion: Some("Inspect the service logs (RUST_LOG=debug) for what it is stuck on."),
        command: None,
    },
    Pattern {
        needle: "Manual upgrade required",
        message: "The indexer's on-disk data predates the installed version.",
        suggestion: Some("Reset wipes the local index and wallet databases so they can rebuild."),
        command: Some("ord-harness reset"),
    },
    Pattern {
        needle: "Insufficient funds",
        message: "The active wallet cannot cover the operation.",
        suggestion: Some("On regtest, mine funds into the wallet."),
        command: Some("ord-harness mine 101"),
    },
    Pattern {
        needle: "only available on regtest",
        message: "Mining is refused outside the local regtest network.",
        suggestion: Some("Switch HARNESS_NETWORK to regtest for local development."),
        command: None,
    },
];

/// Map raw error text to operator guidance.
pub fn diagnose(context: &str, raw: &str) -> Remedy {
    for pattern in TABLE {
        if raw.contains(pattern.needle) {
            return Remedy {
                message: pattern.message.to_string(),
                suggestion: pattern.suggestion,
                command: pattern.command,
            };
        }
    }
    Remedy {
        message: format!("{}: {}", context, raw),
        suggestion: None,
        command: None,
    }
}
