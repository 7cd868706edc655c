use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    /// Duplicate candidate email.
    AlreadyExists(String),
    Validation(String),
    /// Lost the booking race or the slot is not bookable.
    SlotUnavailable(Ulid),
    /// Weekly cap for the interviewer is exhausted.
    CapacityExceeded(u32),
    /// Illegal state-machine transition.
    InvalidState(String),
    LimitExceeded(&'static str),
    /// Could not acquire the store within the bound — retryable.
    Timeout,
    WalError(String),
}

impl EngineError {
    /// Machine-readable kind, surfaced to API callers so the UI can decide
    /// how to react (e.g. refresh the slot list on SLOT_UNAVAILABLE).
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => "VALIDATION_ERROR",
            EngineError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            EngineError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::Timeout => "TIMEOUT",
            EngineError::WalError(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(email) => {
                write!(f, "already registered: {email}")
            }
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::SlotUnavailable(id) => {
                write!(f, "slot {id} is not available for booking")
            }
            EngineError::CapacityExceeded(cap) => {
                write!(f, "weekly interview cap of {cap} reached")
            }
            EngineError::InvalidState(msg) => write!(f, "invalid state transition: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Timeout => write!(f, "store busy, try again"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
