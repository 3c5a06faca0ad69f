pub mod alert;
pub mod common;
pub mod device;
pub mod diagnosis;
pub mod harvest;
pub mod log;
pub mod plant;
pub mod stats;
pub mod sync;
pub mod watch;
