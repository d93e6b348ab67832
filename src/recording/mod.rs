pub mod action_log;
pub mod detector;
pub mod frame;
pub mod locator;
pub mod pipeline;
pub mod recorder;
pub mod throttle;

pub use action_log::{ActionLog, ExportOptions, SequenceGap, SessionError};
pub use detector::{detect_credential_field, CredentialDetection, ElementSignature, FieldRole, PatternTable};
pub use frame::{frame_id, FrameRegistry};
pub use locator::{generate_locators, LocatorOptions};
pub use pipeline::{HandleOutcome, PipelineConfig, RecordingPipeline};
pub use recorder::{BrowserRecorder, RecorderError, StartOptions, RECORDER_BINDING, RECORDER_SCRIPT};
pub use throttle::ScrollDebouncer;
