use derive_more::{Display, Error};

/// Error taxonomy for the analytics engine.
///
/// Identifier/classification/seeding failures are non-fatal to the auction:
/// the coordinator annotates them into the event logs and re-raises them to
/// the host framework. Transport failures are isolated per submission.
#[derive(Debug, Display, Error)]
pub enum AnalyticsError {
    #[display("Configuration error: {message}")]
    Config { message: String },

    #[display("No recognized correlation identifier in payload: {dump}")]
    IdentifierMissing { dump: String },

    #[display("Payload matches no known shape: {dump}")]
    UnclassifiableShape { dump: String },

    #[display("Cannot seed a bid context from a '{kind}' payload")]
    InvalidBidContextSeed { kind: String },

    #[display("Invalid debug event: {message}")]
    InvalidEvent { message: String },

    #[display("Transport error: {message}")]
    Transport { message: String },
}
