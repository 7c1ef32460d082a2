pub mod mapper;
pub mod setpoint;
pub mod timeline;

pub use mapper::ContinuousMapper;
pub use setpoint::{device_ids, ActuatorSetpoint, Channel, MachineControls};
pub use timeline::{TimelineBand, TimelineCue, TimelineMapper};
