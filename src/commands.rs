/*!
    frame factory for the ILC command set.

    One method per command. Each appends a complete frame to a [ModbusBuffer]: device address,
    function code, payload, CRC over everything written so far in the frame, end-of-frame, then
    the line-timing tail. Unicast frames arm the response window with the command's worst-case
    device latency, broadcast frames idle the line instead since nobody answers.

    The NOP placeholder commands are load-bearing: a skippable per-device frame must be
    replaceable by a placeholder of exactly the same word count, so that every offset recorded
    after it stays valid whatever the enabled set is.
*/

use serde::{Deserialize, Serialize};

use crate::buffer::ModbusBuffer;
use crate::topology::{
    BROADCAST_ELECTROMECHANICAL, BROADCAST_PNEUMATIC, HP_MAX_ADDRESS, SAA_MAX_ADDRESS,
};

/// single-axis setpoint slots in the broadcast force demand, fed from addresses 1-16
pub const SAA_SLOTS: usize = 16;
/// dual-axis setpoint slot pairs in the broadcast force demand, fed from addresses 17-48
pub const DAA_SLOTS: usize = 32;
/// step counts carried by the broadcast step motor frame, one slot per hardpoint address
pub const STEP_COUNT: usize = HP_MAX_ADDRESS as usize;

/// function codes of the ILC command set
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FunctionCode {
    ReportServerId = 17,
    ReportServerStatus = 18,
    ChangeMode = 65,
    StepMotor = 66,
    ElectromechanicalForceStatus = 67,
    FreezeSensorValues = 68,
    SetBoostValveGains = 73,
    ReadBoostValveGains = 74,
    ForceDemand = 75,
    PneumaticForceStatus = 76,
    SetAdcScanRate = 80,
    SetAdcOffsetSensitivity = 81,
    Reset = 107,
    ReadCalibration = 110,
    ReportDcaPressure = 119,
    ReportDcaId = 120,
    ReportDcaStatus = 121,
    ReportLvdt = 122,
}

/// device operating modes set and reported through [FunctionCode::ChangeMode]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum IlcMode {
    Standby = 0,
    Disabled = 1,
    Enabled = 2,
    FirmwareUpdate = 3,
    Fault = 4,
    ClearFaults = 5,
    /// query-only value, the device reports its mode without changing it
    NoChange = 65535,
}

/// ADC sampling rates set through [FunctionCode::SetAdcScanRate]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AdcScanRate {
    Hz50 = 0,
    Hz60 = 1,
    Hz100 = 2,
    Hz120 = 3,
    Hz200 = 4,
    Hz240 = 5,
    Hz300 = 6,
    Hz400 = 7,
    Hz480 = 8,
    Hz600 = 9,
    Hz1200 = 10,
    Hz2400 = 11,
    Hz4800 = 12,
    /// query-only value, the device reports its rate without changing it
    NoChange = 255,
}

/**
    per-command line timings, in µs.

    Unicast entries are the worst-case device response latency armed after the frame, broadcast
    entries the line idle time granted for every device to process the frame. Constructed once
    at configuration load and handed to [FrameFactory::new]; [Default] carries the production
    values.
*/
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IlcTimings {
    pub report_server_id: u32,
    pub report_server_status: u32,
    pub change_mode: u32,
    pub broadcast_step_motor: u32,
    pub unicast_step_motor: u32,
    pub electromechanical_force_status: u32,
    pub broadcast_freeze_sensor_values: u32,
    pub set_boost_valve_gains: u32,
    pub read_boost_valve_gains: u32,
    pub broadcast_force_demand: u32,
    pub unicast_single_axis_force_demand: u32,
    pub unicast_dual_axis_force_demand: u32,
    pub pneumatic_force_status: u32,
    pub set_adc_scan_rate: u32,
    pub set_adc_offset_sensitivity: u32,
    pub reset: u32,
    pub read_calibration: u32,
    pub report_dca_pressure: u32,
    pub report_dca_id: u32,
    pub report_dca_status: u32,
    pub report_lvdt: u32,
}

impl Default for IlcTimings {
    fn default() -> Self {
        Self {
            report_server_id: 20_000,
            report_server_status: 2_000,
            change_mode: 10_000,
            broadcast_step_motor: 5_000,
            unicast_step_motor: 5_000,
            electromechanical_force_status: 2_000,
            broadcast_freeze_sensor_values: 300,
            set_boost_valve_gains: 10_000,
            read_boost_valve_gains: 2_000,
            broadcast_force_demand: 400,
            unicast_single_axis_force_demand: 2_000,
            unicast_dual_axis_force_demand: 2_000,
            pneumatic_force_status: 2_000,
            set_adc_scan_rate: 10_000,
            set_adc_offset_sensitivity: 10_000,
            reset: 100_000,
            read_calibration: 10_000,
            report_dca_pressure: 2_000,
            report_dca_id: 2_000,
            report_dca_status: 2_000,
            report_lvdt: 2_000,
        }
    }
}

/// appends ILC command frames onto a [ModbusBuffer], tailed with the configured line timings
#[derive(Copy, Clone)]
pub struct FrameFactory {
    timings: IlcTimings,
}

impl FrameFactory {
    pub fn new(timings: IlcTimings) -> Self {
        Self { timings }
    }

    pub fn timings(&self) -> &IlcTimings {
        &self.timings
    }

    /// query frame with no payload, the commonest frame shape of the command set
    fn poll(&self, buffer: &mut ModbusBuffer, address: u8, function: FunctionCode, wait: u32) {
        buffer.write_u8(address);
        buffer.write_u8(function as u8);
        buffer.write_crc(2);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(wait);
    }

    pub fn report_server_id(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportServerId, self.timings.report_server_id);
    }

    pub fn report_server_status(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportServerStatus, self.timings.report_server_status);
    }

    pub fn change_mode(&self, buffer: &mut ModbusBuffer, address: u8, mode: IlcMode) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::ChangeMode as u8);
        buffer.write_u8(0);
        buffer.write_u8(mode as u16 as u8);
        buffer.write_crc(4);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.change_mode);
    }

    pub fn report_mode(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.change_mode(buffer, address, IlcMode::NoChange);
    }

    pub fn broadcast_step_motor(&self, buffer: &mut ModbusBuffer, counter: u8, steps: &[i8; STEP_COUNT]) {
        buffer.write_u8(BROADCAST_ELECTROMECHANICAL);
        buffer.write_u8(FunctionCode::StepMotor as u8);
        buffer.write_u8(counter);
        for step in steps {
            buffer.write_i8(*step);
        }
        buffer.write_crc(3 + STEP_COUNT);
        buffer.write_end_of_frame();
        buffer.write_delay(self.timings.broadcast_step_motor);
    }

    pub fn unicast_step_motor(&self, buffer: &mut ModbusBuffer, address: u8, steps: i8) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::StepMotor as u8);
        buffer.write_i8(steps);
        buffer.write_crc(3);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.unicast_step_motor);
    }

    pub fn electromechanical_force_status(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ElectromechanicalForceStatus,
            self.timings.electromechanical_force_status);
    }

    pub fn broadcast_electromechanical_freeze_sensor(&self, buffer: &mut ModbusBuffer, counter: u8) {
        self.broadcast_freeze_sensor(buffer, BROADCAST_ELECTROMECHANICAL, counter);
    }

    pub fn broadcast_pneumatic_freeze_sensor(&self, buffer: &mut ModbusBuffer, counter: u8) {
        self.broadcast_freeze_sensor(buffer, BROADCAST_PNEUMATIC, counter);
    }

    fn broadcast_freeze_sensor(&self, buffer: &mut ModbusBuffer, address: u8, counter: u8) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::FreezeSensorValues as u8);
        buffer.write_u8(counter);
        buffer.write_crc(3);
        buffer.write_end_of_frame();
        buffer.write_delay(self.timings.broadcast_freeze_sensor_values);
    }

    pub fn set_boost_valve_gains(&self, buffer: &mut ModbusBuffer, address: u8, primary: f32, secondary: f32) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::SetBoostValveGains as u8);
        buffer.write_f32(primary);
        buffer.write_f32(secondary);
        buffer.write_crc(10);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.set_boost_valve_gains);
    }

    pub fn read_boost_valve_gains(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReadBoostValveGains, self.timings.read_boost_valve_gains);
    }

    /**
        pneumatic broadcast carrying every force setpoint of one subnet.

        Single-axis slots are fed from addresses 1-16, dual-axis primary/secondary pairs from
        addresses 17 and above. Devices latch the setpoint matching their own address.
    */
    pub fn broadcast_force_demand(
        &self,
        buffer: &mut ModbusBuffer,
        counter: u8,
        slew_flag: bool,
        saa_primary: &[i32; SAA_SLOTS],
        daa_primary: &[i32; DAA_SLOTS],
        daa_secondary: &[i32; DAA_SLOTS],
    ) {
        buffer.write_u8(BROADCAST_PNEUMATIC);
        buffer.write_u8(FunctionCode::ForceDemand as u8);
        buffer.write_u8(counter);
        buffer.write_u8(if slew_flag { 255 } else { 0 });
        for setpoint in saa_primary {
            buffer.write_i24(*setpoint);
        }
        for (primary, secondary) in daa_primary.iter().zip(daa_secondary) {
            buffer.write_i24(*primary);
            buffer.write_i24(*secondary);
        }
        buffer.write_crc(4 + 3 * SAA_SLOTS + 6 * DAA_SLOTS);
        buffer.write_end_of_frame();
        buffer.write_delay(self.timings.broadcast_force_demand);
    }

    pub fn unicast_force_demand(
        &self,
        buffer: &mut ModbusBuffer,
        address: u8,
        slew_flag: bool,
        primary: i32,
        secondary: i32,
    ) {
        if address <= SAA_MAX_ADDRESS {
            self.unicast_single_axis_force_demand(buffer, address, slew_flag, primary);
        } else {
            self.unicast_dual_axis_force_demand(buffer, address, slew_flag, primary, secondary);
        }
    }

    pub fn unicast_single_axis_force_demand(&self, buffer: &mut ModbusBuffer, address: u8, slew_flag: bool, primary: i32) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::ForceDemand as u8);
        buffer.write_u8(if slew_flag { 255 } else { 0 });
        buffer.write_i24(primary);
        buffer.write_crc(6);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.unicast_single_axis_force_demand);
    }

    pub fn unicast_dual_axis_force_demand(&self, buffer: &mut ModbusBuffer, address: u8, slew_flag: bool, primary: i32, secondary: i32) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::ForceDemand as u8);
        buffer.write_u8(if slew_flag { 255 } else { 0 });
        buffer.write_i24(primary);
        buffer.write_i24(secondary);
        buffer.write_crc(9);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.unicast_dual_axis_force_demand);
    }

    pub fn pneumatic_force_status(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::PneumaticForceStatus, self.timings.pneumatic_force_status);
    }

    pub fn set_adc_scan_rate(&self, buffer: &mut ModbusBuffer, address: u8, rate: AdcScanRate) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::SetAdcScanRate as u8);
        buffer.write_u8(rate as u8);
        buffer.write_crc(3);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.set_adc_scan_rate);
    }

    pub fn report_adc_scan_rate(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.set_adc_scan_rate(buffer, address, AdcScanRate::NoChange);
    }

    pub fn set_adc_offset_sensitivity(&self, buffer: &mut ModbusBuffer, address: u8, channel: u8, offset: f32, sensitivity: f32) {
        buffer.write_u8(address);
        buffer.write_u8(FunctionCode::SetAdcOffsetSensitivity as u8);
        buffer.write_u8(channel);
        buffer.write_f32(offset);
        buffer.write_f32(sensitivity);
        buffer.write_crc(11);
        buffer.write_end_of_frame();
        buffer.write_wait_for_rx(self.timings.set_adc_offset_sensitivity);
    }

    pub fn reset(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::Reset, self.timings.reset);
    }

    pub fn read_calibration(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReadCalibration, self.timings.read_calibration);
    }

    pub fn report_dca_pressure(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportDcaPressure, self.timings.report_dca_pressure);
    }

    pub fn report_dca_id(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportDcaId, self.timings.report_dca_id);
    }

    pub fn report_dca_status(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportDcaStatus, self.timings.report_dca_status);
    }

    pub fn report_lvdt(&self, buffer: &mut ModbusBuffer, address: u8) {
        self.poll(buffer, address, FunctionCode::ReportLvdt, self.timings.report_lvdt);
    }

    /**
        length-matched placeholder for [Self::report_lvdt].

        Six raw zero words stand in for address, function, the two CRC bytes, the end-of-frame
        and the response window of a real LVDT poll. The serializer transmits nothing for them,
        but every offset recorded after the LVDT block stays valid on the 4-in-5 cycles where
        the real poll is skipped.
    */
    pub fn nop_report_lvdt(&self, buffer: &mut ModbusBuffer) {
        for _ in 0..6 {
            buffer.write_raw(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo;

    fn factory() -> FrameFactory {
        FrameFactory::new(IlcTimings::default())
    }

    /// words appended by `write`, and the tag-stripped address/function of the frame start
    fn frame_words(write: impl FnOnce(&FrameFactory, &mut ModbusBuffer)) -> (usize, u8, u8) {
        let mut buffer = ModbusBuffer::new();
        write(&factory(), &mut buffer);
        let address = fifo::data_byte(buffer.get(0));
        let function = fifo::data_byte(buffer.get(1));
        (buffer.index(), address, function)
    }

    #[test]
    fn poll_frame_shape() {
        let (words, address, function) = frame_words(|f, b| f.report_server_status(b, 33));
        // address + function + 2 CRC bytes + end-of-frame + wait-for-rx
        assert_eq!(words, 6);
        assert_eq!(address, 33);
        assert_eq!(function, 18);
    }

    #[test]
    fn broadcast_force_demand_shape() {
        let (words, address, function) = frame_words(|f, b| {
            f.broadcast_force_demand(b, 3, true, &[0; SAA_SLOTS], &[0; DAA_SLOTS], &[0; DAA_SLOTS])
        });
        // 4 header bytes + 244 setpoint bytes + 2 CRC bytes + end-of-frame + delay
        assert_eq!(words, 4 + 3 * SAA_SLOTS + 6 * DAA_SLOTS + 2 + 2);
        assert_eq!(address, 249);
        assert_eq!(function, 75);
    }

    #[test]
    fn broadcast_step_motor_shape() {
        let (words, address, function) =
            frame_words(|f, b| f.broadcast_step_motor(b, 0, &[0; STEP_COUNT]));
        assert_eq!(words, 3 + STEP_COUNT + 2 + 2);
        assert_eq!(address, 248);
        assert_eq!(function, 66);
    }

    #[test]
    fn unicast_force_demand_dispatches_on_address() {
        let (saa_words, _, _) = frame_words(|f, b| f.unicast_force_demand(b, 16, false, 100, 0));
        let (daa_words, _, _) = frame_words(|f, b| f.unicast_force_demand(b, 17, false, 100, -100));
        assert_eq!(saa_words, 10);
        assert_eq!(daa_words, 13);
    }

    #[test]
    fn nop_lvdt_matches_real_lvdt_length() {
        let (real, _, _) = frame_words(|f, b| f.report_lvdt(b, 84));
        let mut buffer = ModbusBuffer::new();
        factory().nop_report_lvdt(&mut buffer);
        assert_eq!(buffer.index(), real);
        // raw zeros, not tagged data words
        assert_eq!(buffer.get(0), 0);
    }

    #[test]
    fn frames_end_with_a_timing_tail() {
        let mut buffer = ModbusBuffer::new();
        factory().report_server_status(&mut buffer, 1);
        let tail = buffer.get(buffer.index() - 1);
        assert_eq!(tail & 0xf000, fifo::TX_WAIT_RX_US);

        let mut buffer = ModbusBuffer::new();
        factory().broadcast_pneumatic_freeze_sensor(&mut buffer, 0);
        let tail = buffer.get(buffer.index() - 1);
        assert_eq!(tail & 0xf000, fifo::TX_DELAY_US);
    }

    #[test]
    fn change_mode_payload() {
        let mut buffer = ModbusBuffer::new();
        factory().change_mode(&mut buffer, 12, IlcMode::ClearFaults);
        assert_eq!(fifo::data_byte(buffer.get(2)), 0);
        assert_eq!(fifo::data_byte(buffer.get(3)), 5);
        assert_eq!(buffer.index(), 8);
    }
}
