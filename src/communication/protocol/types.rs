use serde::{Deserialize, Serialize};

/// One frame on the control or reporting channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Start,
    Reset,
    Stop,
    Shutdown,
    /// Sent by a peer that is about to close its end of the connection.
    CloseConnection,
    Initialise(InitialiseMessage),
    RegisterTests(RegisterTestsMessage),
    ReportStatistics(ReportStatisticsMessage),
    ProcessStatus(ProcessStatusMessage),
}

impl Message {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Message::Start => "start",
            Message::Reset => "reset",
            Message::Stop => "stop",
            Message::Shutdown => "shutdown",
            Message::CloseConnection => "close_connection",
            Message::Initialise(_) => "initialise",
            Message::RegisterTests(_) => "register_tests",
            Message::ReportStatistics(_) => "report_statistics",
            Message::ProcessStatus(_) => "process_status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialiseMessage {
    pub worker_id: String,
    pub report_to_console: bool,
    pub wait_for_start: bool,
    #[serde(default)]
    pub wait_for_stop: bool,
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub number: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTestsMessage {
    pub tests: Vec<TestDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatistics {
    pub test: u32,
    pub successes: u64,
    pub errors: u64,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatisticsMessage {
    pub worker_id: String,
    pub delta: Vec<TestStatistics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Started,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatusMessage {
    pub worker_id: String,
    pub state: ProcessState,
    pub running_threads: usize,
    pub total_threads: usize,
}
