//! Concurrent source fan-out.
//!
//! Every configured source is queried at once under one deadline. Within the
//! deadline a failing source only lowers availability for its role; past it
//! the whole fetch is abandoned.

use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use signal_core::{MarketDataSource, SourceError, SourceFailure, SourceRole, SymbolKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PipelineError;

const DIMENSION_ROLES: [(SourceRole, &str); 5] = [
    (SourceRole::Market, "market"),
    (SourceRole::Technical, "technical"),
    (SourceRole::Sentiment, "sentiment"),
    (SourceRole::OnChain, "onChain"),
    (SourceRole::Risk, "risk"),
];

/// Result of one fan-out: the merged payload plus per-source outcomes.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub payload: Value,
    pub successful: Vec<String>,
    pub failed: Vec<SourceFailure>,
}

pub async fn fetch_payload(
    sources: &[Arc<dyn MarketDataSource>],
    key: &SymbolKey,
    deadline: Duration,
) -> Result<FetchOutcome, PipelineError> {
    let futures: Vec<_> = sources
        .iter()
        .map(|source| {
            let source = Arc::clone(source);
            async move {
                debug!("Fetching {} from {}", key, source.name());
                let result = source.fetch(key).await.and_then(|value| {
                    if value.is_object() {
                        Ok(value)
                    } else {
                        Err(SourceError::InvalidData("payload is not a JSON object".to_string()))
                    }
                });
                (source.name().to_string(), source.role(), result)
            }
        })
        .collect();

    let results = tokio::time::timeout(deadline, join_all(futures))
        .await
        .map_err(|_| {
            warn!("Fetch for {} timed out after {:?}", key, deadline);
            PipelineError::TimeoutExceeded {
                key: key.clone(),
                timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }
        })?;

    let mut payload = Value::Object(Map::new());
    let mut successful = Vec::new();
    let mut failed = Vec::new();
    let mut by_role: HashMap<SourceRole, (u32, u32)> = HashMap::new();
    let mut all_live = true;

    for (name, role, result) in results {
        let tally = by_role.entry(role).or_insert((0, 0));
        tally.1 += 1;
        match result {
            Ok(fragment) => {
                tally.0 += 1;
                if let Some(flag) = fragment.get("isLiveData") {
                    all_live &= flag.as_bool() == Some(true);
                }
                deep_merge(&mut payload, fragment);
                successful.push(name);
            }
            Err(e) => {
                warn!("Source {} failed for {}: {}", name, key, e);
                failed.push(SourceFailure {
                    source: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    // One stale fragment makes the whole payload stale
    if !all_live {
        if let Some(root) = payload.as_object_mut() {
            root.insert("isLiveData".to_string(), Value::Bool(false));
        }
    }

    inject_quality(&mut payload, &by_role, &successful, &failed);

    Ok(FetchOutcome {
        payload,
        successful,
        failed,
    })
}

/// Recursively merges `incoming` into `target`; later scalars win.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                match existing.get_mut(&k) {
                    Some(slot) if slot.is_object() && v.is_object() => deep_merge(slot, v),
                    _ => {
                        existing.insert(k, v);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

/// Adds role availability and the source report to the payload's
/// `dataQuality`. Values a source already reported are kept.
fn inject_quality(
    payload: &mut Value,
    by_role: &HashMap<SourceRole, (u32, u32)>,
    successful: &[String],
    failed: &[SourceFailure],
) {
    let Some(root) = payload.as_object_mut() else {
        return;
    };
    let quality = root
        .entry("dataQuality")
        .or_insert_with(|| Value::Object(Map::new()));
    if !quality.is_object() {
        *quality = Value::Object(Map::new());
    }
    let Some(quality) = quality.as_object_mut() else {
        return;
    };

    for (role, name) in DIMENSION_ROLES {
        if let Some((ok, total)) = by_role.get(&role) {
            if *total > 0 && !quality.contains_key(name) {
                quality.insert(name.to_string(), json!(f64::from(*ok) / f64::from(*total) * 100.0));
            }
        }
    }

    let sources = quality
        .entry("sources")
        .or_insert_with(|| json!({"successful": [], "failed": []}));
    if let Some(sources) = sources.as_object_mut() {
        append(sources, "successful", successful.iter().map(|s| json!(s)));
        append(
            sources,
            "failed",
            failed
                .iter()
                .map(|f| json!({"source": f.source, "reason": f.reason})),
        );
    }
}

fn append(obj: &mut Map<String, Value>, field: &str, items: impl Iterator<Item = Value>) {
    let slot = obj.entry(field).or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = slot {
        list.extend(items);
    } else {
        *slot = Value::Array(items.collect());
    }
}
