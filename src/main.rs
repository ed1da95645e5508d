//! RUM BBS indexer binary.
//!
//! Reads its configuration from the environment (a `.env` file is honored)
//! and runs the polling pipeline until Ctrl+C.

use rum_bbs_indexer::{
    GroupConfig, Result, RumIndexer, RumIndexerConfigBuilder, RumIndexerError, StreamRole,
    TelemetryConfig, init_telemetry,
};
use std::collections::HashMap;

/// Parses `RUM_STREAMS`: `groupId:role=chainId,role=chainId;groupId:...`.
fn parse_streams(raw: &str) -> Result<HashMap<String, Vec<(StreamRole, String)>>> {
    let mut out = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (group_id, feeds) = entry.split_once(':').ok_or_else(|| {
            RumIndexerError::ConfigError(format!("RUM_STREAMS entry without ':': {entry}"))
        })?;
        let mut roles = Vec::new();
        for feed in feeds.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (role, chain_id) = feed.split_once('=').ok_or_else(|| {
                RumIndexerError::ConfigError(format!("RUM_STREAMS feed without '=': {feed}"))
            })?;
            let role = role.trim().parse().map_err(RumIndexerError::ConfigError)?;
            roles.push((role, chain_id.trim().to_string()));
        }
        out.insert(group_id.trim().to_string(), roles);
    }
    Ok(out)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RumIndexerError::ConfigError(format!("{name} is not valid: {raw}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _telemetry = init_telemetry(TelemetryConfig::default());

    let streams = match std::env::var("RUM_STREAMS") {
        Ok(raw) => parse_streams(&raw)?,
        Err(_) => HashMap::new(),
    };

    let mut builder = RumIndexerConfigBuilder::new()
        .with_database(std::env::var("DATABASE_URL")?)
        .with_quorum(std::env::var("QUORUM_URL")?);
    if let Ok(jwt) = std::env::var("QUORUM_JWT") {
        builder = builder.with_jwt(jwt);
    }

    let group_ids = std::env::var("GROUP_IDS")?;
    for group_id in group_ids.split(',').map(str::trim).filter(|g| !g.is_empty()) {
        let mut group = GroupConfig::single(group_id);
        for (role, chain_id) in streams.get(group_id).into_iter().flatten() {
            group = group.with_stream(*role, chain_id.clone());
        }
        builder = builder.with_group(group);
    }

    if let Some(ms) = env_parse("POLL_INTERVAL_MS")? {
        builder = builder.with_poll_interval_ms(ms);
    }
    if let Some(size) = env_parse("BATCH_SIZE")? {
        builder = builder.with_batch_size(size);
    }

    let indexer = RumIndexer::new(builder.build()?).await?;
    indexer.start().await
}
