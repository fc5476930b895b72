pub mod error;
pub mod record;
pub mod traits;
pub mod types;

pub use error::InstallError;
pub use record::{OutputMode, ProgressRecord, RecordStatus};
pub use traits::BlockDeviceProbe;
pub use types::{
    InstallRequest, NetworkConfigRequest, NetworkMethod, Secret, StaticAddress, UserRequest,
};
