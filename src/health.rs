/// Indexer health probing
///
/// The `/blockcount` endpoint doubles as the functional readiness probe: the
/// indexer may be listening before its catch-up pass completes, so "healthy"
/// requires a parseable height, not merely an accepted socket.
use reqwest::StatusCode;

#[derive(Debug, PartialEq, Eq)]
pub enum IndexerHealth {
    Healthy { block_count: u64 },
    Unhealthy { reason: String },
}

impl IndexerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, IndexerHealth::Healthy { .. })
    }
}

/// Probe `/blockcount` and classify the answer.
///
/// 200 with a non-negative integer body is healthy. A 500 is almost always
/// the indexer holding a stale node cookie, so it gets a distinct
/// classification that the workflow recovers from by restarting the indexer.
pub async fn check_indexer(http: &reqwest::Client, base_url: &str) -> IndexerHealth {
    let url = format!("{}/blockcount", base_url);
    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            return IndexerHealth::Unhealthy {
                reason: format!("request failed: {}", e),
            }
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::OK {
        match body.trim().parse::<u64>() {
            Ok(block_count) => IndexerHealth::Healthy { block_count },
            Err(_) => IndexerHealth::Unhealthy {
                reason: format!("Invalid blockcount response: {:?}", body.trim()),
            },
        }
    } else if status == StatusCode::INTERNAL_SERVER_ERROR {
        IndexerHealth::Unhealthy {
            reason: "HTTP 500 - likely auth failure between the indexer and the node".to_string(),
        }
    } else {
        IndexerHealth::Unhealthy {
            reason: format!("HTTP {}", status.as_u16()),
        }
    }
}

/// Readiness/sync flavor of the same probe: `Some(height)` when the indexer
/// answered with a parseable height, `None` for anything else ("not yet
/// ready", never an error).
pub async fn fetch_block_count(http: &reqwest::Client, base_url: &str) -> Option<u64> {
    match check_indexer(http, base_url).await {
        IndexerHealth::Healthy { block_count } => Some(block_count),
        IndexerHealth::Unhealthy { .. } => None,
    }
}
