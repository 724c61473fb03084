/// Event type discriminators. Keep these stable; changing them is a breaking
/// change for dashboards.
pub const EVENT_CHAT_COMPLETION_SUMMARY: &str = "LlmChatCompletionSummary";
pub const EVENT_CHAT_COMPLETION_MESSAGE: &str = "LlmChatCompletionMessage";
pub const EVENT_EMBEDDING: &str = "LlmEmbedding";

/// Custom attributes under this prefix are copied (stripped) onto LLM events.
pub const LLM_ATTRIBUTE_PREFIX: &str = "llm.";

/// Transaction attribute marking that at least one LLM call happened.
pub const LLM_TRANSACTION_MARKER: &str = "llm";

/// Segment names are `Llm/<operation>/<Vendor>/<method>`.
pub const SEGMENT_ROOT: &str = "Llm";

/// Metric names are `Supportability/<language>/ML/<Vendor>/<version>`.
pub const SUPPORTABILITY_ROOT: &str = "Supportability";
pub const SUPPORTABILITY_ML: &str = "ML";
