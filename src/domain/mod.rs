pub mod calendar;
pub mod region;
pub mod table;
pub mod types;

pub use region::*;
pub use table::*;
pub use types::*;
