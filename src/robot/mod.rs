pub mod xarm;

pub use xarm::{Arm, ArmError, XArmDriver};
