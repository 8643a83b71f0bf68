//! 能力层：Capability trait、注册表、执行器，以及 search / video-search / transcript-fetch /
//! read-file / write-file / list-directory / delegate 七个能力

pub mod delegate;
pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod search;
pub mod transcript;

pub use delegate::{DelegateCapability, DelegationBridge, TOP_LEVEL_DEPTH};
pub use executor::CapabilityExecutor;
pub use filesystem::{ListDirectoryCapability, ReadFileCapability, Sandbox, WriteFileCapability};
pub use registry::{Capability, CapabilityRegistry, CapabilityResult, InputShape, InvocationContext};
pub use search::{VideoSearchCapability, WebSearchCapability};
pub use transcript::{TranscriptFetchCapability, TranscriptProvider, YoutubeTranscripts};
