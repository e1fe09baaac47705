//! Common imports for working with the call engine
//!
//! ```
//! use voicedesk_call_engine::prelude::*;
//! ```

pub use crate::ai::{AiInbound, AiOutbound, AiProvider, TurnTracker};
pub use crate::api::{ApiAuth, ApiContext, Principal, RateLimiter};
pub use crate::carrier::{CarrierEvent, CarrierEventKind, CarrierResponse};
pub use crate::config::{EngineConfig, GeneralConfig, RoutingConfig, SessionTimeouts};
pub use crate::engine::{CarrierSink, EngineStats, LoggingCarrier, VoiceDeskEngine};
pub use crate::error::{EngineError, Result};
pub use crate::server::{VoiceDeskServer, VoiceDeskServerBuilder};
pub use crate::session::{
    Command, SessionEvent, SessionState, TerminationOutcome,
};
pub use crate::spam::{AllowAllClassifier, BlocklistClassifier, SpamClassifier, SpamVerdict};
pub use crate::translation::{
    PassthroughTranslator, Translation, TranslationProvider, TranslationService,
};
pub use crate::voicemail::{VoicemailMessage, VoicemailStore};

pub use voicedesk_directory_core::{
    Agent, AgentStatus, Department, FallbackTarget, RoutingCriteria, Tenant,
};
pub use voicedesk_infra_common::{
    AgentId, CallId, CallbackId, DepartmentId, EndpointId, SessionId, TenantId,
};
