pub mod frame;
pub mod serial;

pub use frame::parse_frame;
pub use serial::{SensorLink, SensorLinkError, SerialSensor};
