pub mod client;
pub mod coll;
pub mod comm;
pub mod config;
pub mod datatype;
pub mod error;
pub mod progress;
pub mod request;
pub mod sched;
pub mod transport;
pub mod types;

pub use client::SchedClient;
pub use coll::{Algorithm, DeviceCollectives, Dispatcher, ScatterArgs, SelectionTable, Selector};
pub use comm::{CommKind, Communicator};
pub use config::SchedConfig;
pub use datatype::{Combiner, Datatype, get_contents, get_envelope};
pub use error::{Result, SchedError};
pub use progress::{ProgressEngine, RequestGroup};
pub use request::Request;
pub use sched::Schedule;
pub use transport::{LocalFabric, Transport};
pub use types::{Rank, RecvBuf, Root};
