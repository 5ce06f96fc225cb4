//! Typed events published by the executor, and the query language
//! subscribers filter them with.

use veris_app::{ResponseBeginBlock, ResponseDeliverTx, ResponseEndBlock};
use veris_consensus::ValidatorUpdate;
use veris_types::to_hex;
use veris_wire::block::{Block, Evidence, Header, Tx};

// ============================================================================
// Event data
// ============================================================================

/// The event subjects carried on the bus.
#[derive(Clone, Debug)]
pub enum EventData {
    NewBlock {
        block: Block,
        result_begin_block: ResponseBeginBlock,
        result_end_block: ResponseEndBlock,
    },
    NewBlockHeader {
        header: Header,
        num_txs: u64,
    },
    Tx {
        height: u64,
        index: u32,
        tx: Tx,
        result: ResponseDeliverTx,
    },
    ValidatorSetUpdates {
        updates: Vec<ValidatorUpdate>,
    },
    Evidence {
        evidence: Evidence,
        height: u64,
    },
}

impl EventData {
    /// The subject name, always present as the `event` attribute.
    pub fn subject(&self) -> &'static str {
        match self {
            EventData::NewBlock { .. } => "NewBlock",
            EventData::NewBlockHeader { .. } => "NewBlockHeader",
            EventData::Tx { .. } => "Tx",
            EventData::ValidatorSetUpdates { .. } => "ValidatorSetUpdates",
            EventData::Evidence { .. } => "Evidence",
        }
    }

    /// The key/value attributes queries match against.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut attrs = vec![("event".to_string(), self.subject().to_string())];
        match self {
            EventData::NewBlock { block, .. } => {
                attrs.push(("height".to_string(), block.header.height.to_string()));
            }
            EventData::NewBlockHeader { header, .. } => {
                attrs.push(("height".to_string(), header.height.to_string()));
            }
            EventData::Tx {
                height, index, tx, ..
            } => {
                attrs.push(("height".to_string(), height.to_string()));
                attrs.push(("index".to_string(), index.to_string()));
                attrs.push((
                    "tx_hash".to_string(),
                    to_hex(&veris_crypto::hash_bytes(tx)),
                ));
            }
            EventData::ValidatorSetUpdates { .. } => {}
            EventData::Evidence { height, .. } => {
                attrs.push(("height".to_string(), height.to_string()));
            }
        }
        attrs
    }
}

// ============================================================================
// Query
// ============================================================================

/// A subscription filter: a conjunction of `key=value` conditions.
///
/// A query matches an event when every condition equals one of the event's
/// attributes. The empty query matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    conditions: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParseError {
    pub input: String,
}

impl std::fmt::Display for QueryParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed query: {:?}", self.input)
    }
}

impl std::error::Error for QueryParseError {}

impl Query {
    /// Match everything.
    pub fn all() -> Self {
        Query::default()
    }

    /// Match one event subject: `event = <subject>`.
    pub fn for_subject(subject: &str) -> Self {
        Query::all().and("event", subject)
    }

    /// Add a condition.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    /// Parse `key=value AND key=value ...`. Whitespace around keys, values,
    /// and the `AND` keyword is ignored.
    pub fn parse(input: &str) -> Result<Self, QueryParseError> {
        let mut query = Query::all();
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(query);
        }
        for clause in trimmed.split(" AND ") {
            let Some((key, value)) = clause.split_once('=') else {
                return Err(QueryParseError {
                    input: input.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim().trim_matches('\'');
            if key.is_empty() || value.is_empty() {
                return Err(QueryParseError {
                    input: input.to_string(),
                });
            }
            query = query.and(key, value);
        }
        Ok(query)
    }

    pub fn matches(&self, attributes: &[(String, String)]) -> bool {
        self.conditions
            .iter()
            .all(|(k, v)| attributes.iter().any(|(ak, av)| ak == k && av == v))
    }

    pub fn matches_event(&self, event: &EventData) -> bool {
        self.matches(&event.attributes())
    }
}
