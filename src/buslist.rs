/*!
    cyclic and one-shot transmission schedules for the five subnets.

    A [BusList] is the complete per-cycle command FIFO content for one mirror state. It is
    built once on state entry and rebuilt only on the next state entry; in between, [BusList::update]
    seeks back to the recorded frame slots and rewrites only the values that change each cycle:
    force setpoints, step counts, the broadcast counter, the rotating status-poll target and the
    LVDT duty-cycle block. Frame count and word order never change after build, so every offset
    recorded at build time stays valid for the whole state.

    The caller replaces the instance wholesale on a state transition. Round-robin cursors and
    the LVDT countdown belong to the instance and start fresh with it.
*/

use core::time::Duration;
use log::debug;

use crate::buffer::ModbusBuffer;
use crate::commands::{
    AdcScanRate, FrameFactory, FunctionCode, IlcMode, DAA_SLOTS, SAA_SLOTS, STEP_COUNT,
};
use crate::error::IlcResult;
use crate::fifo::{self, FpgaChannel, SUBNET_TX};
use crate::roundrobin;
use crate::topology::{
    IlcKind, SubnetTopology, FA_COUNT, HM_COUNT, HP_COUNT, SAA_MAX_ADDRESS, SECONDARY_COUNT,
    SUBNET_COUNT,
};

/// mirror state the schedule is built for
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BusListKind {
    /// status polling only, no broadcast commands reach the devices
    #[default]
    Parked,
    /// force demands to the FAs, step commands to the HPs
    Raised,
    /// force demands to the FAs, the HPs hold position through freeze frames
    Active,
    /// freeze frames everywhere, sensor values latched for a coherent snapshot
    FreezeSensor,
}

/// cycle-wide state shared by every broadcast frame of one control cycle
#[derive(Copy, Clone, Debug, Default)]
pub struct OuterLoop {
    /// 4-bit counter letting devices detect skipped or duplicated cycles
    pub broadcast_counter: u8,
    pub slew_flag: bool,
}

/// per-cylinder force setpoints, indexed by the topology data indices
pub struct AppliedCylinderForces {
    pub primary: [i32; FA_COUNT],
    pub secondary: [i32; SECONDARY_COUNT],
}

impl Default for AppliedCylinderForces {
    fn default() -> Self {
        Self { primary: [0; FA_COUNT], secondary: [0; SECONDARY_COUNT] }
    }
}

/// commanded hardpoint motor steps, indexed by the topology data indices
#[derive(Copy, Clone, Debug, Default)]
pub struct HardpointSteps {
    pub commanded: [i8; HP_COUNT],
}

/**
    named handle on a frame rewritten every cycle.

    A bare integer offset silently goes stale when the frame composition upstream changes;
    carrying the expected function code turns that into an immediate assertion failure on the
    next seek instead of corrupt wire data.
*/
#[derive(Copy, Clone, Debug)]
struct FrameSlot {
    offset: usize,
    function: u8,
}

/// LVDT duty cycle: one real poll every five cycles per monitor
const LVDT_PERIOD: i8 = 5;

/**
    cyclic schedule of one mirror state.

    Exposes the per-device expected-response tables consumed by the response validator: every
    scheduled message accounts for exactly one entry, so a missing answer is always detectable.
*/
pub struct BusList {
    kind: BusListKind,
    buffer: ModbusBuffer,
    /// broadcast force demand (FA subnets) or pneumatic freeze frame
    broadcast_slots: [Option<FrameSlot>; SUBNET_COUNT],
    /// broadcast step motor or electromechanical freeze frame (HP subnets)
    step_slots: [Option<FrameSlot>; SUBNET_COUNT],
    /// rotating report-server-status poll
    status_slots: [Option<FrameSlot>; SUBNET_COUNT],
    /// start of the LVDT block (HM subnets), raw offset since the block may hold NOP words
    lvdt_slots: [Option<usize>; SUBNET_COUNT],
    rr_cursor: [usize; SUBNET_COUNT],
    lvdt_clock: i8,
    expected_fa: [u8; FA_COUNT],
    expected_hp: [u8; HP_COUNT],
    expected_hm: [u8; HM_COUNT],
}

impl BusList {
    /**
        build the full multi-subnet schedule for `kind`.

        Called once on mirror-state entry. The returned instance owns the buffer and all
        per-cycle cursors; drop it on state exit and build the next state's list fresh.
    */
    pub fn build(
        kind: BusListKind,
        topology: &SubnetTopology,
        factory: &FrameFactory,
        outer: &OuterLoop,
        forces: &AppliedCylinderForces,
        steps: &HardpointSteps,
    ) -> Self {
        debug!("building {:?} bus list", kind);
        let mut list = Self {
            kind,
            buffer: ModbusBuffer::new(),
            broadcast_slots: [None; SUBNET_COUNT],
            step_slots: [None; SUBNET_COUNT],
            status_slots: [None; SUBNET_COUNT],
            lvdt_slots: [None; SUBNET_COUNT],
            rr_cursor: [0; SUBNET_COUNT],
            lvdt_clock: 0,
            expected_fa: [0; FA_COUNT],
            expected_hp: [0; HP_COUNT],
            expected_hm: [0; HM_COUNT],
        };

        for subnet in 0..SUBNET_COUNT {
            let block = start_subnet(&mut list.buffer, subnet);

            if topology.fa_count(subnet) > 0 {
                match kind {
                    BusListKind::Raised | BusListKind::Active => {
                        list.broadcast_slots[subnet] = Some(FrameSlot {
                            offset: list.buffer.index(),
                            function: FunctionCode::ForceDemand as u8,
                        });
                        let (saa, daa_primary, daa_secondary) =
                            gather_cylinder_forces(topology, subnet, forces);
                        factory.broadcast_force_demand(
                            &mut list.buffer,
                            outer.broadcast_counter,
                            outer.slew_flag,
                            &saa,
                            &daa_primary,
                            &daa_secondary,
                        );
                        list.buffer.write_timestamp();
                    }
                    BusListKind::FreezeSensor => {
                        list.broadcast_slots[subnet] = Some(FrameSlot {
                            offset: list.buffer.index(),
                            function: FunctionCode::FreezeSensorValues as u8,
                        });
                        factory.broadcast_pneumatic_freeze_sensor(
                            &mut list.buffer, outer.broadcast_counter);
                        list.buffer.write_timestamp();
                    }
                    BusListKind::Parked => {}
                }

                for fa in topology.fas(subnet) {
                    if !fa.disabled {
                        factory.pneumatic_force_status(&mut list.buffer, fa.address);
                        list.expected_fa[fa.data_index] = 1;
                    } else {
                        list.expected_fa[fa.data_index] = 0;
                    }
                }

                let cursor = skip_disabled(topology, subnet, list.rr_cursor[subnet]);
                list.rr_cursor[subnet] = cursor;
                let target = topology.fa(subnet, cursor);
                list.status_slots[subnet] = Some(FrameSlot {
                    offset: list.buffer.index(),
                    function: FunctionCode::ReportServerStatus as u8,
                });
                factory.report_server_status(&mut list.buffer, target.address);
                list.expected_fa[target.data_index] = 2;
            }

            if topology.hp_count(subnet) > 0 {
                match kind {
                    BusListKind::Raised => {
                        list.step_slots[subnet] = Some(FrameSlot {
                            offset: list.buffer.index(),
                            function: FunctionCode::StepMotor as u8,
                        });
                        let hp_steps = gather_hp_steps(topology, subnet, steps);
                        factory.broadcast_step_motor(
                            &mut list.buffer, outer.broadcast_counter, &hp_steps);
                        list.buffer.write_timestamp();
                    }
                    BusListKind::Active | BusListKind::FreezeSensor => {
                        list.step_slots[subnet] = Some(FrameSlot {
                            offset: list.buffer.index(),
                            function: FunctionCode::FreezeSensorValues as u8,
                        });
                        factory.broadcast_electromechanical_freeze_sensor(
                            &mut list.buffer, outer.broadcast_counter);
                        list.buffer.write_timestamp();
                    }
                    BusListKind::Parked => {}
                }

                for hp in topology.hps(subnet) {
                    if !hp.disabled {
                        factory.electromechanical_force_status(&mut list.buffer, hp.address);
                        factory.report_server_status(&mut list.buffer, hp.address);
                        list.expected_hp[hp.data_index] = 2;
                    } else {
                        list.expected_hp[hp.data_index] = 0;
                    }
                }
            }

            for hm in topology.hms(subnet) {
                if !hm.disabled {
                    factory.report_dca_pressure(&mut list.buffer, hm.address);
                    factory.report_dca_status(&mut list.buffer, hm.address);
                    factory.report_server_status(&mut list.buffer, hm.address);
                    list.expected_hm[hm.data_index] = 3;
                } else {
                    list.expected_hm[hm.data_index] = 0;
                }
            }
            if topology.hm_count(subnet) > 0 {
                // placeholders at build, the first update swaps in the real polls
                list.lvdt_slots[subnet] = Some(list.buffer.index());
                for hm in topology.hms(subnet) {
                    if !hm.disabled {
                        factory.nop_report_lvdt(&mut list.buffer);
                    }
                }
            }

            end_subnet(&mut list.buffer, block);
        }

        let length = list.buffer.index();
        list.buffer.set_length(length);
        list
    }

    /**
        rewrite the per-cycle fields in place.

        Advances the shared broadcast counter, refreshes setpoints and step counts at the
        recorded slots, rotates the status poll to the next enabled FA and steps the LVDT
        duty cycle. Buffer length and frame layout are untouched.
    */
    pub fn update(
        &mut self,
        topology: &SubnetTopology,
        factory: &FrameFactory,
        outer: &mut OuterLoop,
        forces: &AppliedCylinderForces,
        steps: &HardpointSteps,
    ) {
        outer.broadcast_counter = roundrobin::broadcast_counter(outer.broadcast_counter);

        for subnet in 0..SUBNET_COUNT {
            if topology.fa_count(subnet) > 0 {
                if let Some(slot) = self.broadcast_slots[subnet] {
                    self.seek(slot);
                    match self.kind {
                        BusListKind::Raised | BusListKind::Active => {
                            let (saa, daa_primary, daa_secondary) =
                                gather_cylinder_forces(topology, subnet, forces);
                            factory.broadcast_force_demand(
                                &mut self.buffer,
                                outer.broadcast_counter,
                                outer.slew_flag,
                                &saa,
                                &daa_primary,
                                &daa_secondary,
                            );
                        }
                        BusListKind::FreezeSensor => {
                            factory.broadcast_pneumatic_freeze_sensor(
                                &mut self.buffer, outer.broadcast_counter);
                        }
                        BusListKind::Parked => {}
                    }
                }

                // the previous target keeps its regular poll, so it reverts to one answer
                let previous = topology.fa(subnet, self.rr_cursor[subnet]);
                self.expected_fa[previous.data_index] = 1;
                let advanced = roundrobin::inc(self.rr_cursor[subnet], topology.fa_count(subnet));
                let cursor = skip_disabled(topology, subnet, advanced);
                self.rr_cursor[subnet] = cursor;
                let target = topology.fa(subnet, cursor);
                if let Some(slot) = self.status_slots[subnet] {
                    self.seek(slot);
                    factory.report_server_status(&mut self.buffer, target.address);
                }
                self.expected_fa[target.data_index] = 2;
            }

            if topology.hp_count(subnet) > 0 {
                if let Some(slot) = self.step_slots[subnet] {
                    self.seek(slot);
                    match self.kind {
                        BusListKind::Raised => {
                            let hp_steps = gather_hp_steps(topology, subnet, steps);
                            factory.broadcast_step_motor(
                                &mut self.buffer, outer.broadcast_counter, &hp_steps);
                        }
                        BusListKind::Active | BusListKind::FreezeSensor => {
                            factory.broadcast_electromechanical_freeze_sensor(
                                &mut self.buffer, outer.broadcast_counter);
                        }
                        BusListKind::Parked => {}
                    }
                }
            }

            if let Some(offset) = self.lvdt_slots[subnet] {
                self.buffer.set_index(offset);
                for hm in topology.hms(subnet) {
                    if !hm.disabled {
                        if self.lvdt_clock == 0 {
                            factory.report_lvdt(&mut self.buffer, hm.address);
                            self.expected_hm[hm.data_index] = 4;
                        } else {
                            factory.nop_report_lvdt(&mut self.buffer);
                            self.expected_hm[hm.data_index] = 3;
                        }
                    }
                }
            }
        }

        self.lvdt_clock -= 1;
        if self.lvdt_clock < 0 {
            self.lvdt_clock = LVDT_PERIOD - 1;
        }
    }

    fn seek(&mut self, slot: FrameSlot) {
        debug_assert_eq!(
            fifo::data_byte(self.buffer.get(slot.offset + 1)),
            slot.function,
            "frame slot went stale",
        );
        self.buffer.set_index(slot.offset);
    }

    /// push the whole schedule to the FPGA command FIFO
    pub fn write(&self, fpga: &mut impl FpgaChannel, timeout: Duration) -> IlcResult {
        fpga.write_command_fifo(self.buffer.words(), timeout)
    }

    pub fn kind(&self) -> BusListKind {
        self.kind
    }

    pub fn buffer(&self) -> &ModbusBuffer {
        &self.buffer
    }

    /// answers expected from each FA this cycle, keyed by data index
    pub fn expected_fa_responses(&self) -> &[u8; FA_COUNT] {
        &self.expected_fa
    }
    pub fn expected_hp_responses(&self) -> &[u8; HP_COUNT] {
        &self.expected_hp
    }
    pub fn expected_hm_responses(&self) -> &[u8; HM_COUNT] {
        &self.expected_hm
    }
}

/// open a subnet block: FPGA target, length placeholder, transmit trigger
fn start_subnet(buffer: &mut ModbusBuffer, subnet: usize) -> usize {
    buffer.write_raw(SUBNET_TX[subnet] as u16);
    let block = buffer.index();
    buffer.write_raw(0);
    buffer.write_software_trigger();
    block
}

/// close a subnet block and back-patch the word count into the placeholder
fn end_subnet(buffer: &mut ModbusBuffer, block: usize) {
    buffer.write_trigger_irq();
    buffer.set(block, (buffer.index() - block - 1) as u16);
}

/// first enabled FA at or after `cursor`, wrapping; callers guarantee one FA is enabled
fn skip_disabled(topology: &SubnetTopology, subnet: usize, cursor: usize) -> usize {
    let mut cursor = cursor;
    while topology.fa(subnet, cursor).disabled {
        cursor = roundrobin::inc(cursor, topology.fa_count(subnet));
    }
    cursor
}

/// scatter one subnet's cylinder forces into the broadcast setpoint slots
fn gather_cylinder_forces(
    topology: &SubnetTopology,
    subnet: usize,
    forces: &AppliedCylinderForces,
) -> ([i32; SAA_SLOTS], [i32; DAA_SLOTS], [i32; DAA_SLOTS]) {
    let mut saa_primary = [0; SAA_SLOTS];
    let mut daa_primary = [0; DAA_SLOTS];
    let mut daa_secondary = [0; DAA_SLOTS];
    for fa in topology.fas(subnet) {
        if fa.address <= SAA_MAX_ADDRESS {
            saa_primary[(fa.address - 1) as usize] = forces.primary[fa.data_index];
        } else {
            let slot = (fa.address - SAA_MAX_ADDRESS - 1) as usize;
            daa_primary[slot] = forces.primary[fa.data_index];
            if let Some(secondary) = fa.secondary_data_index {
                daa_secondary[slot] = forces.secondary[secondary];
            }
        }
    }
    (saa_primary, daa_primary, daa_secondary)
}

/// scatter one subnet's step commands into the broadcast slots, by device address
fn gather_hp_steps(
    topology: &SubnetTopology,
    subnet: usize,
    steps: &HardpointSteps,
) -> [i8; STEP_COUNT] {
    let mut out = [0; STEP_COUNT];
    for hp in topology.hps(subnet) {
        // negative steps extend and positive retract, swapped here to match intuition
        out[(hp.address - 1) as usize] = steps.commanded[hp.data_index].saturating_neg();
    }
    out
}

/// maintenance command sent once to every addressed device
#[derive(Copy, Clone, Debug)]
pub enum OneShotCommand {
    ReportServerId,
    ReportServerStatus,
    /// hardpoint monitors take their own mode, they follow a different operational cycle
    ChangeMode { mode: IlcMode, hm_mode: IlcMode },
    Reset,
    SetAdcScanRate(AdcScanRate),
    SetAdcOffsetSensitivity { channel: u8, offset: f32, sensitivity: f32 },
    ReadCalibration,
    ReportDcaId,
    ReportDcaStatus,
    SetBoostValveGains { primary: f32, secondary: f32 },
    ReadBoostValveGains,
    /// zero-step motor command halting each hardpoint where it stands
    FreezeInPlace,
}

impl OneShotCommand {
    /// device classes the command is meaningful for
    fn applies_to(&self, kind: IlcKind) -> bool {
        match self {
            Self::ReportServerId
            | Self::ReportServerStatus
            | Self::ChangeMode { .. }
            | Self::Reset => true,
            Self::SetAdcScanRate(_)
            | Self::SetAdcOffsetSensitivity { .. }
            | Self::ReadCalibration => {
                matches!(kind, IlcKind::ForceActuator | IlcKind::HardpointActuator)
            }
            Self::ReportDcaId | Self::ReportDcaStatus => {
                matches!(kind, IlcKind::ForceActuator | IlcKind::HardpointMonitor)
            }
            Self::SetBoostValveGains { .. } | Self::ReadBoostValveGains => {
                matches!(kind, IlcKind::ForceActuator)
            }
            Self::FreezeInPlace => matches!(kind, IlcKind::HardpointActuator),
        }
    }

    fn emit(&self, factory: &FrameFactory, buffer: &mut ModbusBuffer, kind: IlcKind, address: u8) {
        match *self {
            Self::ReportServerId => factory.report_server_id(buffer, address),
            Self::ReportServerStatus => factory.report_server_status(buffer, address),
            Self::ChangeMode { mode, hm_mode } => {
                let mode = if kind == IlcKind::HardpointMonitor { hm_mode } else { mode };
                factory.change_mode(buffer, address, mode);
            }
            Self::Reset => factory.reset(buffer, address),
            Self::SetAdcScanRate(rate) => factory.set_adc_scan_rate(buffer, address, rate),
            Self::SetAdcOffsetSensitivity { channel, offset, sensitivity } => {
                factory.set_adc_offset_sensitivity(buffer, address, channel, offset, sensitivity);
            }
            Self::ReadCalibration => factory.read_calibration(buffer, address),
            Self::ReportDcaId => factory.report_dca_id(buffer, address),
            Self::ReportDcaStatus => factory.report_dca_status(buffer, address),
            Self::SetBoostValveGains { primary, secondary } => {
                factory.set_boost_valve_gains(buffer, address, primary, secondary);
            }
            Self::ReadBoostValveGains => factory.read_boost_valve_gains(buffer, address),
            Self::FreezeInPlace => factory.unicast_step_motor(buffer, address, 0),
        }
    }
}

/**
    single-pass schedule carrying one [OneShotCommand] to every applicable enabled device.

    Built, written, and discarded; there is no update path. Expected responses are one per
    addressed device so the validator can account for every answer.
*/
pub struct OneShotBusList {
    buffer: ModbusBuffer,
    expected_fa: [u8; FA_COUNT],
    expected_hp: [u8; HP_COUNT],
    expected_hm: [u8; HM_COUNT],
}

impl OneShotBusList {
    pub fn build(command: OneShotCommand, topology: &SubnetTopology, factory: &FrameFactory) -> Self {
        debug!("building one-shot bus list for {:?}", command);
        let mut list = Self {
            buffer: ModbusBuffer::new(),
            expected_fa: [0; FA_COUNT],
            expected_hp: [0; HP_COUNT],
            expected_hm: [0; HM_COUNT],
        };

        for subnet in 0..SUBNET_COUNT {
            let block = start_subnet(&mut list.buffer, subnet);
            if command.applies_to(IlcKind::ForceActuator) {
                for fa in topology.fas(subnet) {
                    if !fa.disabled {
                        command.emit(factory, &mut list.buffer, fa.kind, fa.address);
                        list.expected_fa[fa.data_index] = 1;
                    }
                }
            }
            if command.applies_to(IlcKind::HardpointActuator) {
                for hp in topology.hps(subnet) {
                    if !hp.disabled {
                        command.emit(factory, &mut list.buffer, hp.kind, hp.address);
                        list.expected_hp[hp.data_index] = 1;
                    }
                }
            }
            if command.applies_to(IlcKind::HardpointMonitor) {
                for hm in topology.hms(subnet) {
                    if !hm.disabled {
                        command.emit(factory, &mut list.buffer, hm.kind, hm.address);
                        list.expected_hm[hm.data_index] = 1;
                    }
                }
            }
            end_subnet(&mut list.buffer, block);
        }

        let length = list.buffer.index();
        list.buffer.set_length(length);
        list
    }

    pub fn write(&self, fpga: &mut impl FpgaChannel, timeout: Duration) -> IlcResult {
        fpga.write_command_fifo(self.buffer.words(), timeout)
    }

    pub fn buffer(&self) -> &ModbusBuffer {
        &self.buffer
    }

    pub fn expected_fa_responses(&self) -> &[u8; FA_COUNT] {
        &self.expected_fa
    }
    pub fn expected_hp_responses(&self) -> &[u8; HP_COUNT] {
        &self.expected_hp
    }
    pub fn expected_hm_responses(&self) -> &[u8; HM_COUNT] {
        &self.expected_hm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::IlcTimings;
    use crate::topology::{ActuatorTableRow, FaTableRow};

    fn fa_row(subnet: u8, address: u8, actuator_id: i32, index: usize, secondary: Option<usize>) -> FaTableRow {
        FaTableRow {
            subnet,
            address,
            actuator_id,
            index,
            x_index: None,
            y_index: None,
            secondary_index: secondary,
        }
    }

    /// 3 FAs on subnet 1 (one dual-axis), 2 HPs and 1 HM on subnet 5
    fn topology() -> SubnetTopology {
        SubnetTopology::new(
            &[
                fa_row(1, 5, 101, 0, None),
                fa_row(1, 9, 102, 1, None),
                fa_row(1, 20, 103, 2, Some(0)),
            ],
            &[
                ActuatorTableRow { subnet: 5, address: 1, actuator_id: 1, index: 0 },
                ActuatorTableRow { subnet: 5, address: 2, actuator_id: 2, index: 1 },
            ],
            &[ActuatorTableRow { subnet: 5, address: 84, actuator_id: 11, index: 0 }],
            &[],
        )
        .unwrap()
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(IlcTimings::default())
    }

    fn build(kind: BusListKind, topology: &SubnetTopology) -> (BusList, OuterLoop) {
        let outer = OuterLoop::default();
        let list = BusList::build(
            kind,
            topology,
            &factory(),
            &outer,
            &AppliedCylinderForces::default(),
            &HardpointSteps::default(),
        );
        (list, outer)
    }

    fn run_update(list: &mut BusList, topology: &SubnetTopology, outer: &mut OuterLoop) {
        list.update(
            topology,
            &factory(),
            outer,
            &AppliedCylinderForces::default(),
            &HardpointSteps::default(),
        );
    }

    /// tag-stripped address byte of the first frame of subnet block 0
    fn first_frame_address(list: &BusList) -> u8 {
        // block layout: subnet target, length, software trigger, then the first frame
        fifo::data_byte(list.buffer().get(3))
    }

    #[test]
    fn raised_opens_with_broadcast_force_demand() {
        let topology = topology();
        let (list, _) = build(BusListKind::Raised, &topology);
        assert_eq!(first_frame_address(&list), 249);
        assert_eq!(fifo::data_byte(list.buffer().get(4)), 75);
    }

    #[test]
    fn parked_polls_without_broadcasting() {
        let topology = topology();
        let (list, _) = build(BusListKind::Parked, &topology);
        // straight to the pneumatic status poll of the first FA
        assert_eq!(first_frame_address(&list), 5);
        assert_eq!(fifo::data_byte(list.buffer().get(4)), 76);
    }

    #[test]
    fn freeze_sensor_opens_with_pneumatic_freeze() {
        let topology = topology();
        let (list, _) = build(BusListKind::FreezeSensor, &topology);
        assert_eq!(first_frame_address(&list), 249);
        assert_eq!(fifo::data_byte(list.buffer().get(4)), 68);
    }

    #[test]
    fn subnet_length_words_are_patched() {
        let topology = topology();
        let (list, _) = build(BusListKind::Raised, &topology);
        let buffer = list.buffer();
        let mut index = 0;
        let mut blocks = 0;
        while index < buffer.length() {
            assert_eq!(buffer.get(index), SUBNET_TX[blocks] as u16);
            let block_length = buffer.get(index + 1) as usize;
            assert!(block_length >= 2);
            // the block ends on its IRQ trigger
            assert_eq!(buffer.get(index + 1 + block_length), fifo::TX_IRQ_TRIGGER);
            index += 2 + block_length;
            blocks += 1;
        }
        assert_eq!(blocks, SUBNET_COUNT);
    }

    #[test]
    fn update_preserves_length_and_slots() {
        let topology = topology();
        let (mut list, mut outer) = build(BusListKind::Raised, &topology);
        let length = list.buffer().length();
        for _ in 0..10 {
            run_update(&mut list, &topology, &mut outer);
            assert_eq!(list.buffer().length(), length);
            assert_eq!(first_frame_address(&list), 249);
        }
    }

    #[test]
    fn broadcast_counter_advances_mod_16() {
        let topology = topology();
        let (mut list, mut outer) = build(BusListKind::Raised, &topology);
        for cycle in 0..20 {
            run_update(&mut list, &topology, &mut outer);
            assert_eq!(outer.broadcast_counter, ((cycle + 1) % 16) as u8);
        }
        // counter byte of the force demand frame matches
        assert_eq!(fifo::data_byte(list.buffer().get(5)), outer.broadcast_counter);
    }

    #[test]
    fn round_robin_polls_every_enabled_fa_once() {
        let topology = topology();
        let (mut list, mut outer) = build(BusListKind::Parked, &topology);
        // build selects the first FA
        assert_eq!(list.expected_fa_responses()[0], 2);

        let mut polled = [0; 3];
        for _ in 0..3 {
            run_update(&mut list, &topology, &mut outer);
            for (index, expected) in list.expected_fa_responses()[..3].iter().enumerate() {
                if *expected == 2 {
                    polled[index] += 1;
                }
            }
        }
        assert_eq!(polled, [1, 1, 1]);
    }

    #[test]
    fn round_robin_skips_disabled_from_next_advance() {
        let mut topology = topology();
        let (mut list, mut outer) = build(BusListKind::Parked, &topology);
        topology.disable_fa(102);

        for _ in 0..6 {
            run_update(&mut list, &topology, &mut outer);
            // data index 1 belongs to the disabled FA, never selected again
            assert_ne!(list.expected_fa_responses()[1], 2);
        }
    }

    #[test]
    fn lvdt_duty_cycle_is_one_in_five() {
        let topology = topology();
        let (mut list, mut outer) = build(BusListKind::Raised, &topology);
        assert_eq!(list.expected_hm_responses()[0], 3);

        let mut real_polls = 0;
        for cycle in 0..10 {
            run_update(&mut list, &topology, &mut outer);
            match list.expected_hm_responses()[0] {
                4 => {
                    real_polls += 1;
                    // the clock starts at zero, so cycles 1 and 6 carry the real poll
                    assert_eq!(cycle % 5, 0);
                }
                3 => {}
                other => panic!("unexpected HM response count {}", other),
            }
        }
        assert_eq!(real_polls, 2);
    }

    #[test]
    fn hp_steps_are_negated_into_address_slots() {
        let topology = topology();
        let steps = gather_hp_steps(
            &topology,
            4,
            &HardpointSteps { commanded: [10, -3, 0, 0, 0, 0] },
        );
        assert_eq!(steps[0], -10);
        assert_eq!(steps[1], 3);
        assert_eq!(steps[2], 0);
    }

    #[test]
    fn cylinder_forces_land_in_address_slots() {
        let topology = topology();
        let mut forces = AppliedCylinderForces::default();
        forces.primary[0] = 111;
        forces.primary[2] = 333;
        forces.secondary[0] = -444;

        let (saa, daa_primary, daa_secondary) = gather_cylinder_forces(&topology, 0, &forces);
        assert_eq!(saa[4], 111);
        assert_eq!(daa_primary[3], 333);
        assert_eq!(daa_secondary[3], -444);
        assert_eq!(saa[0], 0);
    }

    #[test]
    fn one_shot_addresses_every_applicable_device() {
        let topology = topology();
        let list = OneShotBusList::build(
            OneShotCommand::ChangeMode { mode: IlcMode::Enabled, hm_mode: IlcMode::Standby },
            &topology,
            &factory(),
        );
        assert_eq!(&list.expected_fa_responses()[..3], &[1, 1, 1]);
        assert_eq!(&list.expected_hp_responses()[..2], &[1, 1]);
        assert_eq!(list.expected_hm_responses()[0], 1);
    }

    #[test]
    fn freeze_in_place_steps_each_hardpoint_by_zero() {
        let topology = topology();
        let list = OneShotBusList::build(OneShotCommand::FreezeInPlace, &topology, &factory());

        assert_eq!(&list.expected_fa_responses()[..3], &[0, 0, 0]);
        assert_eq!(&list.expected_hp_responses()[..2], &[1, 1]);
        assert_eq!(list.expected_hm_responses()[0], 0);

        // the four FA subnets carry empty blocks, the HP frames sit on the last one
        let hp_block = 4 * 4;
        let buffer = list.buffer();
        assert_eq!(buffer.get(hp_block), SUBNET_TX[4] as u16);
        assert_eq!(fifo::data_byte(buffer.get(hp_block + 3)), 1);
        assert_eq!(fifo::data_byte(buffer.get(hp_block + 4)), FunctionCode::StepMotor as u8);
        assert_eq!(fifo::data_byte(buffer.get(hp_block + 5)), 0);
    }

    #[test]
    fn one_shot_skips_disabled_and_inapplicable() {
        let mut topology = topology();
        topology.disable_fa(101);
        let list = OneShotBusList::build(
            OneShotCommand::ReportDcaId,
            &topology,
            &factory(),
        );
        assert_eq!(&list.expected_fa_responses()[..3], &[0, 1, 1]);
        // DCA queries never address hardpoint actuators
        assert_eq!(&list.expected_hp_responses()[..2], &[0, 0]);
        assert_eq!(list.expected_hm_responses()[0], 1);
    }
}
