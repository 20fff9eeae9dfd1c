pub mod fifo;
pub mod buffer;
pub mod commands;
pub mod topology;
pub mod roundrobin;
pub mod buslist;
pub mod error;

pub use crate::buffer::ModbusBuffer;
pub use crate::buslist::{AppliedCylinderForces, BusList, BusListKind, HardpointSteps, OneShotBusList, OneShotCommand, OuterLoop};
pub use crate::commands::{AdcScanRate, FrameFactory, FunctionCode, IlcMode, IlcTimings};
pub use crate::error::{IlcError, IlcResult};
pub use crate::fifo::FpgaChannel;
pub use crate::topology::{IlcKind, IlcMap, SubnetTopology};
