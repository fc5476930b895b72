//! Installation run supervision: PTY spawning, output relay, progress log and
//! the single-run registry.

pub mod kill_tree;
pub mod progress_log;
pub mod pty_supervisor;
pub mod registry;
pub mod relay;
pub mod timeout_kill;

pub use progress_log::{LogSlice, ProgressLog, ProgressReader, ProgressWriter};
pub use pty_supervisor::{MasterEndpoint, PtyMaster, PtyProcess, PtySupervisor};
pub use registry::{RunRegistry, RunStarted, RunState, RunStatus};
pub use relay::{OutputRelay, RelayEnd, RelayOutcome};
