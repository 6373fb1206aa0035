pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod local_store;
pub mod model;
pub mod remote;
pub mod scheduler;
pub mod state;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use engine::{PushReport, SyncEngine};
pub use error::{ConfigError, LocalStoreError, RemoteError, SyncError};
pub use local_store::{KeyValueStore, LocalStore, MemoryStore, SqliteStore};
pub use model::{Counters, Dataset, Movement, MovementKind};
pub use remote::{RemoteStore, WriteBatch};
pub use scheduler::{SkipReason, SyncOutcome, SyncScheduler};
pub use state::SharedDataset;
pub use status::{LogReporter, StatusBoard, StatusKind, StatusReporter, StatusSignal};
