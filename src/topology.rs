/*!
    static device topology of the five actuator subnets.

    Subnets 1-4 carry the pneumatic force actuators (FA), subnet 5 the electromechanical
    hardpoint actuators (HP) and the hardpoint monitors (HM). The topology is built once from
    the configuration tables and never changes shape afterwards; only the per-FA disabled flag
    is runtime-mutable, to mute a misbehaving actuator without rebuilding anything.

    Address ranges are disjoint by convention: 1-16 single-axis (one cylinder), 17 and above
    dual-axis (primary + secondary cylinder), 248/249 reserved for the electromechanical and
    pneumatic broadcasts.
*/

use heapless::Vec;

use crate::error::TopologyError;

/// independent communication channels multiplexed through the FPGA
pub const SUBNET_COUNT: usize = 5;
/// force actuators across all subnets
pub const FA_COUNT: usize = 156;
/// hardpoint actuators, all on the last subnet
pub const HP_COUNT: usize = 6;
/// hardpoint monitors, all on the last subnet
pub const HM_COUNT: usize = 6;
/// secondary cylinders across all dual-axis force actuators
pub const SECONDARY_COUNT: usize = 112;

/// highest single-axis device address; 17 and above are dual-axis
pub const SAA_MAX_ADDRESS: u8 = 16;
/// highest hardpoint address, one per step slot of the broadcast step frame
pub const HP_MAX_ADDRESS: u8 = 78;
/// broadcast address of the electromechanical devices
pub const BROADCAST_ELECTROMECHANICAL: u8 = 248;
/// broadcast address of the pneumatic devices
pub const BROADCAST_PNEUMATIC: u8 = 249;

/// the three device classes living on the subnets
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IlcKind {
    ForceActuator,
    HardpointActuator,
    HardpointMonitor,
}

/**
    one inner-loop controller on a subnet.

    `data_index` is the device's slot in every global per-class array (applied forces,
    expected responses, telemetry); the x/y/secondary indices are the slots in the axis
    decompositions, absent on single-axis devices and on non-FA classes.
*/
#[derive(Copy, Clone, Debug)]
pub struct IlcMap {
    pub kind: IlcKind,
    /// subnet the device answers on, 1-based as in the configuration tables
    pub subnet: u8,
    pub address: u8,
    pub actuator_id: i32,
    pub data_index: usize,
    pub x_data_index: Option<usize>,
    pub y_data_index: Option<usize>,
    pub secondary_data_index: Option<usize>,
    /// when true the device is skipped by every schedule, buffer layout unaffected
    pub disabled: bool,
}

/// one force actuator row of the configuration tables
#[derive(Copy, Clone, Debug)]
pub struct FaTableRow {
    pub subnet: u8,
    pub address: u8,
    pub actuator_id: i32,
    pub index: usize,
    pub x_index: Option<usize>,
    pub y_index: Option<usize>,
    pub secondary_index: Option<usize>,
}

/// one hardpoint actuator or monitor row of the configuration tables
#[derive(Copy, Clone, Debug)]
pub struct ActuatorTableRow {
    pub subnet: u8,
    pub address: u8,
    pub actuator_id: i32,
    pub index: usize,
}

/// ordered device lists of one subnet
#[derive(Debug, Default)]
struct Container {
    fa: Vec<IlcMap, FA_COUNT>,
    hp: Vec<IlcMap, HP_COUNT>,
    hm: Vec<IlcMap, HM_COUNT>,
}

/**
    address book of every ILC, grouped per subnet and per device class.

    Built once at configuration load and shared by reference with every bus list built
    afterwards. Construction is all-or-nothing: any invalid table row rejects the whole
    topology.
*/
#[derive(Debug)]
pub struct SubnetTopology {
    subnets: [Container; SUBNET_COUNT],
}

impl SubnetTopology {
    pub fn new(
        fa_rows: &[FaTableRow],
        hp_rows: &[ActuatorTableRow],
        hm_rows: &[ActuatorTableRow],
        disabled_fa: &[i32],
    ) -> Result<Self, TopologyError> {
        let mut subnets: [Container; SUBNET_COUNT] = Default::default();

        for row in fa_rows {
            let subnet = Self::check_placement(&mut subnets, row.subnet, row.address, row.actuator_id)?;
            let map = IlcMap {
                kind: IlcKind::ForceActuator,
                subnet: row.subnet,
                address: row.address,
                actuator_id: row.actuator_id,
                data_index: row.index,
                x_data_index: row.x_index,
                y_data_index: row.y_index,
                secondary_data_index: row.secondary_index,
                disabled: disabled_fa.contains(&row.actuator_id),
            };
            let _ = subnets[subnet].fa.push(map);
        }
        for row in hp_rows {
            let subnet = Self::check_placement(&mut subnets, row.subnet, row.address, row.actuator_id)?;
            // hardpoints feed the broadcast step frame by address, so the slot range binds them
            if row.address > HP_MAX_ADDRESS {
                return Err(TopologyError::BadAddress {
                    actuator: row.actuator_id,
                    address: row.address,
                });
            }
            let _ = subnets[subnet].hp.push(Self::plain_map(IlcKind::HardpointActuator, row));
        }
        for row in hm_rows {
            let subnet = Self::check_placement(&mut subnets, row.subnet, row.address, row.actuator_id)?;
            let _ = subnets[subnet].hm.push(Self::plain_map(IlcKind::HardpointMonitor, row));
        }

        Ok(Self { subnets })
    }

    fn plain_map(kind: IlcKind, row: &ActuatorTableRow) -> IlcMap {
        IlcMap {
            kind,
            subnet: row.subnet,
            address: row.address,
            actuator_id: row.actuator_id,
            data_index: row.index,
            x_data_index: None,
            y_data_index: None,
            secondary_data_index: None,
            disabled: false,
        }
    }

    /// validate subnet and address of one row, returns the 0-based subnet index
    fn check_placement(
        subnets: &mut [Container; SUBNET_COUNT],
        subnet: u8,
        address: u8,
        actuator: i32,
    ) -> Result<usize, TopologyError> {
        if subnet == 0 || subnet as usize > SUBNET_COUNT {
            return Err(TopologyError::BadSubnet { actuator, subnet });
        }
        if address == 0 || address >= BROADCAST_ELECTROMECHANICAL {
            return Err(TopologyError::BadAddress { actuator, address });
        }
        let index = (subnet - 1) as usize;
        let container = &subnets[index];
        if container.fa.iter()
            .chain(container.hp.iter())
            .chain(container.hm.iter())
            .any(|map| map.address == address)
        {
            return Err(TopologyError::DuplicateAddress { subnet, address });
        }
        Ok(index)
    }

    pub fn fa_count(&self, subnet: usize) -> usize {
        self.subnets[subnet].fa.len()
    }
    pub fn fa(&self, subnet: usize, index: usize) -> &IlcMap {
        &self.subnets[subnet].fa[index]
    }
    pub fn fas(&self, subnet: usize) -> &[IlcMap] {
        &self.subnets[subnet].fa
    }

    pub fn hp_count(&self, subnet: usize) -> usize {
        self.subnets[subnet].hp.len()
    }
    pub fn hp(&self, subnet: usize, index: usize) -> &IlcMap {
        &self.subnets[subnet].hp[index]
    }
    pub fn hps(&self, subnet: usize) -> &[IlcMap] {
        &self.subnets[subnet].hp
    }

    pub fn hm_count(&self, subnet: usize) -> usize {
        self.subnets[subnet].hm.len()
    }
    pub fn hm(&self, subnet: usize, index: usize) -> &IlcMap {
        &self.subnets[subnet].hm[index]
    }
    pub fn hms(&self, subnet: usize) -> &[IlcMap] {
        &self.subnets[subnet].hm
    }

    /// device answering at `address` on the 0-based `subnet`, if any
    pub fn ilc_at(&self, subnet: usize, address: u8) -> Option<&IlcMap> {
        let container = &self.subnets[subnet];
        container.fa.iter()
            .chain(container.hp.iter())
            .chain(container.hm.iter())
            .find(|map| map.address == address)
    }

    /// device with the given actuator id, searched across every subnet and class
    pub fn map_of(&self, actuator_id: i32) -> Option<&IlcMap> {
        self.subnets.iter()
            .flat_map(|container| {
                container.fa.iter()
                    .chain(container.hp.iter())
                    .chain(container.hm.iter())
            })
            .find(|map| map.actuator_id == actuator_id)
    }

    /// mute one force actuator; every bus list built or updated afterwards skips it
    pub fn disable_fa(&mut self, actuator_id: i32) {
        self.set_fa_disabled(actuator_id, true);
    }
    pub fn enable_fa(&mut self, actuator_id: i32) {
        self.set_fa_disabled(actuator_id, false);
    }
    pub fn enable_all_fa(&mut self) {
        for container in &mut self.subnets {
            for map in &mut container.fa {
                map.disabled = false;
            }
        }
    }

    fn set_fa_disabled(&mut self, actuator_id: i32, disabled: bool) {
        for container in &mut self.subnets {
            if let Some(map) = container.fa.iter_mut().find(|map| map.actuator_id == actuator_id) {
                map.disabled = disabled;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fa_row(subnet: u8, address: u8, actuator_id: i32, index: usize) -> FaTableRow {
        FaTableRow {
            subnet,
            address,
            actuator_id,
            index,
            x_index: None,
            y_index: None,
            secondary_index: if address > SAA_MAX_ADDRESS { Some(index) } else { None },
        }
    }

    #[test]
    fn builds_and_indexes() {
        let topology = SubnetTopology::new(
            &[fa_row(1, 5, 101, 0), fa_row(1, 20, 102, 1), fa_row(2, 3, 103, 2)],
            &[ActuatorTableRow { subnet: 5, address: 1, actuator_id: 1, index: 0 }],
            &[ActuatorTableRow { subnet: 5, address: 84, actuator_id: 2, index: 0 }],
            &[],
        ).unwrap();

        assert_eq!(topology.fa_count(0), 2);
        assert_eq!(topology.fa_count(1), 1);
        assert_eq!(topology.hp_count(4), 1);
        assert_eq!(topology.hm_count(4), 1);
        assert_eq!(topology.ilc_at(0, 20).unwrap().actuator_id, 102);
        assert!(topology.ilc_at(0, 84).is_none());
        assert_eq!(topology.map_of(2).unwrap().kind, IlcKind::HardpointMonitor);
        assert!(topology.map_of(999).is_none());
    }

    #[test]
    fn rejects_bad_rows() {
        assert_eq!(
            SubnetTopology::new(&[fa_row(6, 1, 101, 0)], &[], &[], &[]).unwrap_err(),
            TopologyError::BadSubnet { actuator: 101, subnet: 6 },
        );
        assert_eq!(
            SubnetTopology::new(&[fa_row(1, 249, 101, 0)], &[], &[], &[]).unwrap_err(),
            TopologyError::BadAddress { actuator: 101, address: 249 },
        );
        assert_eq!(
            SubnetTopology::new(&[fa_row(1, 5, 101, 0), fa_row(1, 5, 102, 1)], &[], &[], &[]).unwrap_err(),
            TopologyError::DuplicateAddress { subnet: 1, address: 5 },
        );
        // a hardpoint past the step slots would overrun the broadcast step frame
        assert_eq!(
            SubnetTopology::new(
                &[],
                &[ActuatorTableRow { subnet: 5, address: 79, actuator_id: 1, index: 0 }],
                &[],
                &[],
            ).unwrap_err(),
            TopologyError::BadAddress { actuator: 1, address: 79 },
        );
    }

    #[test]
    fn disable_toggles_only_the_flag() {
        let mut topology = SubnetTopology::new(
            &[fa_row(1, 5, 101, 0), fa_row(1, 20, 102, 1)],
            &[], &[], &[101],
        ).unwrap();

        assert!(topology.fa(0, 0).disabled);
        assert!(!topology.fa(0, 1).disabled);

        topology.enable_fa(101);
        topology.disable_fa(102);
        assert!(!topology.fa(0, 0).disabled);
        assert!(topology.fa(0, 1).disabled);

        topology.enable_all_fa();
        assert!(!topology.fa(0, 1).disabled);
        assert_eq!(topology.fa_count(0), 2);
    }
}
