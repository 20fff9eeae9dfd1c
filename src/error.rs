//! definition of the general ilc bus error type

use core::fmt;

/**
    object reporting an unexpected result regarding the ilc bus

    Only construction-time problems are reported through this type: an invalid
    static topology, or a misuse of the crate detected while assembling a bus
    list. The per-cycle build/update path never raises, a bug there produces
    wrong wire data and is the response validator's to detect.
*/
#[derive(Clone, Debug)]
pub enum IlcError {
    /// error caused by the FPGA communication support
    ///
    /// these errors are exterior to this library, raised by the [crate::fifo::FpgaChannel] implementor
    Io(&'static str),

    /// invalid static topology given at construction
    ///
    /// the topology is rejected as a whole, no partial subnet data is built
    Topology(TopologyError),

    /// misuse of the library by the caller
    Master(&'static str),
}

/// convenient alias to simplify return annotations
pub type IlcResult<T = ()> = core::result::Result<T, IlcError>;

impl fmt::Display for IlcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(message) => write!(f, "IlcError::Io: {}", message),
            Self::Topology(detail) => write!(f, "IlcError::Topology: {}", detail),
            Self::Master(message) => write!(f, "IlcError::Master: {}", message),
        }
    }
}

impl std::error::Error for IlcError {}

impl From<TopologyError> for IlcError {
    fn from(src: TopologyError) -> Self {
        IlcError::Topology(src)
    }
}

/// reason for refusing a static actuator topology table
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TopologyError {
    /// a table row references a subnet outside 1 ..= SUBNET_COUNT
    BadSubnet { actuator: i32, subnet: u8 },
    /// a table row uses a reserved or zero device address
    BadAddress { actuator: i32, address: u8 },
    /// two table rows claim the same address on the same subnet
    DuplicateAddress { subnet: u8, address: u8 },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSubnet { actuator, subnet } => {
                write!(f, "actuator {} placed on invalid subnet {}", actuator, subnet)
            }
            Self::BadAddress { actuator, address } => {
                write!(f, "actuator {} uses reserved address {}", actuator, address)
            }
            Self::DuplicateAddress { subnet, address } => {
                write!(f, "address {} used twice on subnet {}", address, subnet)
            }
        }
    }
}
