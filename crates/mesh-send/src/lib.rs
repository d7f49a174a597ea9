//! Outbound envelope construction, signing, dispatch, and dead-letter drain.

pub mod drain;
pub mod retry;
pub mod sender;
pub mod stage;

pub use drain::{DrainReport, Drainer};
pub use retry::RetryPolicy;
pub use sender::{BroadcastOutcome, SendOptions, Sender};
pub use stage::{encode_attachment, stage_attachment, StagedAttachment, StageError, STAGE_THRESHOLD_BYTES};
