use thiserror::Error;

/// Everything that can go wrong while harvesting.
///
/// Variants split into two classes, see [`HarvestError::is_fatal`]:
/// transient fetch failures are counted and skipped by the worker that hit
/// them, everything else halts the pipeline at the next stage barrier.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("empty payload from {url}")]
    EmptyPayload { url: String },

    #[error("no detail page of group {group} yielded items")]
    EmptyGroup { group: String },

    #[error("response from {url} does not match the expected schema: {source}")]
    Schema {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("school id {id:?} is not numeric")]
    InvalidEntityId { id: String },

    #[error("malformed join tuple on line {line}: {content:?}")]
    MalformedJoinTuple { line: usize, content: String },

    #[error("collector `{collector}` rejected record {record:?}: {reason}")]
    CollectorInvariant {
        collector: &'static str,
        record: String,
        reason: &'static str,
    },

    #[error("collector for stage `{stage}` stopped before its producers finished")]
    CollectorClosed { stage: &'static str },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("task of stage `{stage}` did not complete: {source}")]
    Join {
        stage: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Fatal errors abort the whole run; transient ones only skip an item.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HarvestError::Transport { .. }
                | HarvestError::Status { .. }
                | HarvestError::EmptyPayload { .. }
                | HarvestError::EmptyGroup { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_are_transient() {
        let status = HarvestError::Status {
            url: "u".into(),
            status: 404,
        };
        let empty = HarvestError::EmptyPayload { url: "u".into() };
        assert!(!status.is_fatal());
        assert!(!empty.is_fatal());
    }

    #[test]
    fn schema_and_collector_breaks_are_fatal() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let schema = HarvestError::Schema {
            url: "u".into(),
            source,
        };
        let invariant = HarvestError::CollectorInvariant {
            collector: "join_tuples",
            record: "1,2".into(),
            reason: "too short",
        };
        assert!(schema.is_fatal());
        assert!(invariant.is_fatal());
        assert!(HarvestError::CollectorClosed { stage: "detail" }.is_fatal());
    }
}
