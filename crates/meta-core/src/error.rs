//! Metadata model errors

/// Error raised when a metadata value violates one of its invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to parse value [{value}] for setting [{key}]: expected {expected}")]
    InvalidSetting {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("Missing required setting [{0}]")]
    MissingSetting(String),
    #[error(
        "the number of routing shards [{routing_num_shards}] must be a multiple of the number of shards [{number_of_shards}]"
    )]
    RoutingShardsNotMultiple {
        routing_num_shards: u32,
        number_of_shards: u32,
    },
    #[error("primary term set for shard [{shard}] but index has only [{number_of_shards}] shards")]
    PrimaryTermOutOfRange { shard: u32, number_of_shards: u32 },
    #[error("Failed to parse mapping [{type_name}]: {reason}")]
    MappingParse { type_name: String, reason: String },
}
