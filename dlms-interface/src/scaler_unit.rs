//! Scaler-unit pair of the Register class
//!
//! Encoded as `structure { scaler: integer, unit: enum }`; the physical
//! value is `value * 10^scaler` in `unit`.

use dlms_core::{DataObject, DlmsError, DlmsResult};

/// Common unit codes
pub mod units {
    pub const NO_UNIT: u8 = 0xFF;
    pub const WATT: u8 = 0x1B;
    pub const WATT_HOUR: u8 = 0x1E;
    pub const VOLT: u8 = 0x23;
    pub const AMPERE: u8 = 0x21;
    pub const HERTZ: u8 = 0x2C;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalerUnit {
    pub scaler: i8,
    pub unit: u8,
}

impl ScalerUnit {
    pub fn new(scaler: i8, unit: u8) -> Self {
        Self { scaler, unit }
    }

    /// No scaling, no unit
    pub fn none() -> Self {
        Self::new(0, units::NO_UNIT)
    }

    /// `value * 10^scaler`
    pub fn scale_value(&self, value: f64) -> f64 {
        value * 10_f64.powi(self.scaler as i32)
    }

    pub fn to_data_object(&self) -> DataObject {
        DataObject::Structure(vec![
            DataObject::Integer8(self.scaler),
            DataObject::Enumerate(self.unit),
        ])
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        match value.as_structure()?.as_slice() {
            [DataObject::Integer8(scaler), DataObject::Enumerate(unit)] => Ok(Self::new(*scaler, *unit)),
            other => Err(DlmsError::InvalidData(format!(
                "scaler_unit must be structure {{integer, enum}}, got {} elements",
                other.len()
            ))),
        }
    }
}

impl Default for ScalerUnit {
    fn default() -> Self {
        Self::none()
    }
}
