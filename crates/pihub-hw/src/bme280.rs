//! Driver for the Bosch BME280 humidity, pressure and temperature
//! sensor.
//!
//! Readout follows the datasheet: one burst read of 0xF7..0xFE yields
//! the raw 20-bit pressure and temperature and 16-bit humidity
//! samples, which are then run through the factory calibration using
//! the reference integer compensation routines. Temperature is
//! compensated first; its `t_fine` intermediate feeds the pressure
//! and humidity formulas.

use tracing::debug;

use crate::bus::RegisterBus;
use crate::error::{HwError, HwResult};

/// Device ID common to all BME280 sensors.
const BME280_ID: u8 = 0x60;

// Register map.
const REG_ID: u8 = 0xD0;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA_BASE: u8 = 0xF7;
const DATA_LEN: usize = 8;
const REG_CALIB_A_BASE: u8 = 0x88;
const CALIB_A_LEN: usize = 26;
const REG_CALIB_B_BASE: u8 = 0xE1;
const CALIB_B_LEN: usize = 7;

// Settings: x16 oversampling, normal mode, 20 ms standby, filter off.
const OSRS_X16: u8 = 0b101;
const MODE_NORMAL: u8 = 0b11;
const STANDBY_20MS: u8 = 0b111;
const FILTER_OFF: u8 = 0b000;

/// Factory trim values read once at init.
#[derive(Debug, Clone, Copy)]
struct Calibration {
    dig_t1: u16,
    dig_t2: i16,
    dig_t3: i16,
    dig_p1: u16,
    dig_p2: i16,
    dig_p3: i16,
    dig_p4: i16,
    dig_p5: i16,
    dig_p6: i16,
    dig_p7: i16,
    dig_p8: i16,
    dig_p9: i16,
    dig_h1: u8,
    dig_h2: i16,
    dig_h3: u8,
    dig_h4: i16,
    dig_h5: i16,
    dig_h6: i8,
}

impl Calibration {
    /// Assembles the trim values from the two calibration sections.
    ///
    /// Section A covers 0x88..=0xA1 (temperature and pressure, plus
    /// H1 at 0xA1); section B covers 0xE1..=0xE7 with the packed
    /// 12-bit H4/H5 pair.
    fn parse(a: &[u8; CALIB_A_LEN], b: &[u8; CALIB_B_LEN]) -> Self {
        let u16_le = |lo: u8, hi: u8| u16::from_le_bytes([lo, hi]);
        let i16_le = |lo: u8, hi: u8| i16::from_le_bytes([lo, hi]);

        Self {
            dig_t1: u16_le(a[0], a[1]),
            dig_t2: i16_le(a[2], a[3]),
            dig_t3: i16_le(a[4], a[5]),
            dig_p1: u16_le(a[6], a[7]),
            dig_p2: i16_le(a[8], a[9]),
            dig_p3: i16_le(a[10], a[11]),
            dig_p4: i16_le(a[12], a[13]),
            dig_p5: i16_le(a[14], a[15]),
            dig_p6: i16_le(a[16], a[17]),
            dig_p7: i16_le(a[18], a[19]),
            dig_p8: i16_le(a[20], a[21]),
            dig_p9: i16_le(a[22], a[23]),
            dig_h1: a[25],
            dig_h2: i16_le(b[0], b[1]),
            dig_h3: b[2],
            dig_h4: (i16::from(b[3]) << 4) | i16::from(b[4] & 0x0F),
            dig_h5: (i16::from(b[5]) << 4) | i16::from(b[4] >> 4),
            dig_h6: b[6] as i8,
        }
    }
}

/// One raw burst sample.
struct RawSample {
    adc_p: i32,
    adc_t: i32,
    adc_h: i32,
}

/// BME280 driver, generic over the register transport so several
/// sensors can share one bus (e.g. `Arc<I2cBus>`).
pub struct Bme280<B: RegisterBus> {
    addr: u8,
    bus: B,
    calib: Calibration,
}

impl<B: RegisterBus> Bme280<B> {
    /// Probes the device, loads its calibration and programs
    /// continuous measurement (x16 oversampling, normal mode, 20 ms
    /// standby, filter off).
    ///
    /// # Errors
    ///
    /// [`HwError::UnexpectedDeviceId`] when the chip does not answer
    /// with the BME280 ID, or a bus error.
    pub fn new(addr: u8, bus: B) -> HwResult<Self> {
        check_id(&bus, addr)?;

        let mut calib_a = [0u8; CALIB_A_LEN];
        bus.read_registers(addr, REG_CALIB_A_BASE, &mut calib_a)?;
        let mut calib_b = [0u8; CALIB_B_LEN];
        bus.read_registers(addr, REG_CALIB_B_BASE, &mut calib_b)?;
        let calib = Calibration::parse(&calib_a, &calib_b);

        // ctrl_hum must be written before ctrl_meas to take effect.
        bus.write_register(addr, REG_CTRL_HUM, OSRS_X16)?;
        bus.write_register(addr, REG_CTRL_MEAS, (OSRS_X16 << 5) | (OSRS_X16 << 2) | MODE_NORMAL)?;
        bus.write_register(addr, REG_CONFIG, (STANDBY_20MS << 5) | (FILTER_OFF << 2))?;

        debug!("bme280 initialized (addr: {addr:#04X})");
        Ok(Self { addr, bus, calib })
    }

    /// The device address this driver talks to.
    pub fn addr(&self) -> u8 {
        self.addr
    }

    /// Re-reads the chip ID register; confirms the link is alive and
    /// the sensor is powered.
    pub fn check_id(&self) -> HwResult<()> {
        check_id(&self.bus, self.addr)
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> HwResult<f32> {
        let raw = self.read_raw()?;
        let (_, celsius) = self.compensate_temperature(raw.adc_t);
        Ok(celsius)
    }

    /// Pressure in pascals.
    pub fn pressure(&self) -> HwResult<f32> {
        let raw = self.read_raw()?;
        let (t_fine, _) = self.compensate_temperature(raw.adc_t);
        Ok(self.compensate_pressure(raw.adc_p, t_fine))
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> HwResult<f32> {
        let raw = self.read_raw()?;
        let (t_fine, _) = self.compensate_temperature(raw.adc_t);
        Ok(self.compensate_humidity(raw.adc_h, t_fine))
    }

    fn read_raw(&self) -> HwResult<RawSample> {
        let mut buf = [0u8; DATA_LEN];
        self.bus.read_registers(self.addr, REG_DATA_BASE, &mut buf)?;
        Ok(RawSample {
            adc_p: (i32::from(buf[0]) << 12) | (i32::from(buf[1]) << 4) | (i32::from(buf[2]) >> 4),
            adc_t: (i32::from(buf[3]) << 12) | (i32::from(buf[4]) << 4) | (i32::from(buf[5]) >> 4),
            adc_h: (i32::from(buf[6]) << 8) | i32::from(buf[7]),
        })
    }

    /// Returns `(t_fine, celsius)`; resolution 0.01 degC.
    fn compensate_temperature(&self, adc_t: i32) -> (i32, f32) {
        let c = &self.calib;
        let var1 = (((adc_t >> 3) - (i32::from(c.dig_t1) << 1)) * i32::from(c.dig_t2)) >> 11;
        let var2 = (((((adc_t >> 4) - i32::from(c.dig_t1))
            * ((adc_t >> 4) - i32::from(c.dig_t1)))
            >> 12)
            * i32::from(c.dig_t3))
            >> 14;
        let t_fine = var1 + var2;
        let centi = (t_fine * 5 + 128) >> 8;
        (t_fine, centi as f32 / 100.0)
    }

    /// 64-bit fixed-point pressure compensation; result in pascals.
    fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> f32 {
        let c = &self.calib;
        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * i64::from(c.dig_p6);
        var2 += (var1 * i64::from(c.dig_p5)) << 17;
        var2 += i64::from(c.dig_p4) << 35;
        var1 = ((var1 * var1 * i64::from(c.dig_p3)) >> 8) + ((var1 * i64::from(c.dig_p2)) << 12);
        var1 = (((1i64 << 47) + var1) * i64::from(c.dig_p1)) >> 33;
        if var1 == 0 {
            return 0.0; // avoid dividing by zero on an unprogrammed chip
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        var1 = (i64::from(c.dig_p9) * (p >> 13) * (p >> 13)) >> 25;
        var2 = (i64::from(c.dig_p8) * p) >> 19;
        p = ((p + var1 + var2) >> 8) + (i64::from(c.dig_p7) << 4);
        p as f32 / 256.0
    }

    /// 32-bit fixed-point humidity compensation; result in %RH.
    fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> f32 {
        let c = &self.calib;
        let x = t_fine - 76_800;
        let sample =
            (((adc_h << 14) - (i32::from(c.dig_h4) << 20) - (i32::from(c.dig_h5) * x)) + 16_384)
                >> 15;
        let scale = (((((x * i32::from(c.dig_h6)) >> 10)
            * (((x * i32::from(c.dig_h3)) >> 11) + 32_768))
            >> 10)
            + 2_097_152)
            * i32::from(c.dig_h2)
            + 8_192;
        let mut v = sample * (scale >> 14);
        v -= ((((v >> 15) * (v >> 15)) >> 7) * i32::from(c.dig_h1)) >> 4;
        v = v.clamp(0, 419_430_400);
        (v >> 12) as f32 / 1024.0
    }
}

impl<B: RegisterBus> std::fmt::Debug for Bme280<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bme280").field("addr", &self.addr).finish_non_exhaustive()
    }
}

fn check_id<B: RegisterBus>(bus: &B, addr: u8) -> HwResult<()> {
    let mut id = [0u8; 1];
    bus.read_registers(addr, REG_ID, &mut id)?;
    if id[0] != BME280_ID {
        return Err(HwError::UnexpectedDeviceId {
            addr,
            found: id[0],
            expected: BME280_ID,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bus::MockBus;

    const ADDR: u8 = 0x76;

    /// Loads the datasheet's reference calibration and a matching
    /// sample frame into a mock bus.
    fn datasheet_sensor() -> MockBus {
        let bus = MockBus::default();
        bus.preload(ADDR, REG_ID, &[BME280_ID]);

        // Trim values from the datasheet's worked example:
        // T1=27504 T2=26435 T3=-1000, P1=36477 P2=-10685 P3=3024
        // P4=2855 P5=140 P6=-7 P7=15500 P8=-14600 P9=6000.
        bus.preload(
            ADDR,
            REG_CALIB_A_BASE,
            &[
                0x70, 0x6B, // T1
                0x43, 0x67, // T2
                0x18, 0xFC, // T3
                0x7D, 0x8E, // P1
                0x43, 0xD6, // P2
                0xD0, 0x0B, // P3
                0x27, 0x0B, // P4
                0x8C, 0x00, // P5
                0xF9, 0xFF, // P6
                0x8C, 0x3C, // P7
                0xF8, 0xC6, // P8
                0x70, 0x17, // P9
                0x00, // 0xA0, unused
                0x4B, // H1 = 75
            ],
        );
        // H2=324 H3=0 H4=339 H5=50 H6=30.
        bus.preload(
            ADDR,
            REG_CALIB_B_BASE,
            &[0x44, 0x01, 0x00, 0x15, 0x23, 0x03, 0x1E],
        );
        // Raw frame: adc_P=415148, adc_T=519888, adc_H=30000.
        bus.preload(
            ADDR,
            REG_DATA_BASE,
            &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30],
        );
        bus
    }

    #[test]
    fn init_programs_measurement_registers() {
        let bus = datasheet_sensor();
        let sensor = Bme280::new(ADDR, bus).unwrap();

        assert_eq!(sensor.bus.register(ADDR, REG_CTRL_HUM), Some(0b101));
        assert_eq!(sensor.bus.register(ADDR, REG_CTRL_MEAS), Some(0xB7));
        assert_eq!(sensor.bus.register(ADDR, REG_CONFIG), Some(0xE0));
    }

    #[test]
    fn wrong_id_is_rejected() {
        let bus = MockBus::default();
        bus.preload(ADDR, REG_ID, &[0x58]); // a BMP280 answers 0x58

        match Bme280::new(ADDR, bus) {
            Err(HwError::UnexpectedDeviceId { found, expected, .. }) => {
                assert_eq!(found, 0x58);
                assert_eq!(expected, BME280_ID);
            }
            other => panic!("expected UnexpectedDeviceId, got {other:?}"),
        }
    }

    #[test]
    fn check_id_succeeds_on_live_sensor() {
        let sensor = Bme280::new(ADDR, datasheet_sensor()).unwrap();
        sensor.check_id().unwrap();
    }

    #[test]
    fn temperature_matches_datasheet_example() {
        let sensor = Bme280::new(ADDR, datasheet_sensor()).unwrap();
        let celsius = sensor.temperature().unwrap();
        assert!(
            (celsius - 25.08).abs() < 1e-3,
            "expected 25.08 degC, got {celsius}"
        );
    }

    #[test]
    fn pressure_matches_datasheet_example() {
        let sensor = Bme280::new(ADDR, datasheet_sensor()).unwrap();
        let pascal = sensor.pressure().unwrap();
        assert!(
            (pascal - 100_653.0).abs() < 20.0,
            "expected about 100653 Pa, got {pascal}"
        );
    }

    #[test]
    fn humidity_stays_in_percent_range() {
        let sensor = Bme280::new(ADDR, datasheet_sensor()).unwrap();
        let percent = sensor.humidity().unwrap();
        assert!(
            (0.0..=100.0).contains(&percent),
            "humidity out of range: {percent}"
        );
    }

    #[test]
    fn raw_sample_unpacking() {
        let sensor = Bme280::new(ADDR, datasheet_sensor()).unwrap();
        let raw = sensor.read_raw().unwrap();
        assert_eq!(raw.adc_p, 415_148);
        assert_eq!(raw.adc_t, 519_888);
        assert_eq!(raw.adc_h, 30_000);
    }

    #[test]
    fn h4_h5_nibble_packing() {
        let mut a = [0u8; CALIB_A_LEN];
        a[25] = 75;
        let b = [0x44, 0x01, 0x00, 0x15, 0x23, 0x03, 0x1E];
        let calib = Calibration::parse(&a, &b);

        assert_eq!(calib.dig_h1, 75);
        assert_eq!(calib.dig_h2, 324);
        assert_eq!(calib.dig_h4, 339);
        assert_eq!(calib.dig_h5, 50);
        assert_eq!(calib.dig_h6, 30);
    }
}
