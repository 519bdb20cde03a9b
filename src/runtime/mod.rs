pub mod backend;
pub mod probe;
pub mod process;
pub mod types;

pub use backend::{AgentRuntime, Script, ScriptedRuntime};
pub use probe::{AdbProbe, DeviceProbe, ProbeError, ProbeResult, with_timeout};
pub use process::{ProcessRuntime, ProcessRuntimeConfig};
pub use types::{
    AgentError, AgentEvent, AgentResult, EventReceiver, EventSender, RuntimeEvent, RuntimeInfo,
    StepEvent,
};
