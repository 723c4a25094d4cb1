pub mod crypto;
pub mod error;
pub mod grouping;
pub mod key_lock;
pub mod name_filter;
pub mod partition_filter;

pub use error::*;
pub use grouping::*;
pub use key_lock::KeyLock;
pub use name_filter::NameFilter;
pub use partition_filter::{FilterResult, PartitionColumnValue, PartitionFilter};
