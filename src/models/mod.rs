pub mod catalog;
pub mod datasource;
pub mod job;
pub mod table;
pub mod task;

pub use catalog::*;
pub use datasource::*;
pub use job::*;
pub use table::*;
pub use task::*;
