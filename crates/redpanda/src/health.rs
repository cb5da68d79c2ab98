//! Startup topic verification.

use crate::config::RedpandaConfig;
use crate::connection::connect;
use std::collections::HashSet;

/// Returns the required topics that do not exist.
///
/// When the cluster cannot be reached every topic is reported missing.
pub async fn verify_topics(config: &RedpandaConfig, topics: &[&str]) -> Vec<String> {
    let all_missing = || topics.iter().map(|t| t.to_string()).collect();

    let Ok(client) = connect(config).await else {
        return all_missing();
    };
    match client.list_topics().await {
        Ok(existing_topics) => {
            let existing: HashSet<_> = existing_topics.iter().map(|t| t.name.as_str()).collect();
            topics
                .iter()
                .filter(|t| !existing.contains(*t))
                .map(|t| t.to_string())
                .collect()
        }
        Err(_) => all_missing(),
    }
}
