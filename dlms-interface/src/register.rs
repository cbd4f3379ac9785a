//! Register interface class (Class ID: 3)
//!
//! # Attributes
//!
//! - 1: logical_name
//! - 2: value (numeric, type fixed at construction)
//! - 3: scaler_unit (read-only)
//!
//! # Methods
//!
//! - 1: reset(data: integer) sets the value to zero

use crate::class::{Attribute, CosemInterfaceClass, read, write};
use crate::scaler_unit::ScalerUnit;
use dlms_core::{DataObject, DataObjectType, DlmsError, DlmsResult, ObisCode};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct Register {
    class: CosemInterfaceClass,
    value: Arc<RwLock<DataObject>>,
    scaler_unit: ScalerUnit,
}

impl Register {
    pub const CLASS_ID: u16 = 3;
    pub const ATTR_VALUE: u8 = 2;
    pub const ATTR_SCALER_UNIT: u8 = 3;
    pub const METHOD_RESET: u8 = 1;

    /// # Errors
    ///
    /// Returns `InvalidData` unless `value` is numeric
    pub fn new(logical_name: ObisCode, value: DataObject, scaler_unit: ScalerUnit) -> DlmsResult<Self> {
        if !value.is_number() {
            return Err(DlmsError::InvalidData(format!(
                "Register value must be numeric, got {:?}",
                value.get_type()
            )));
        }
        let value_type = value.get_type();
        let value = Arc::new(RwLock::new(value));
        let mut class = CosemInterfaceClass::new(Self::CLASS_ID, 0, logical_name);

        let (getter_state, setter_state) = (value.clone(), value.clone());
        class.register_attribute(
            Self::ATTR_VALUE,
            Attribute::read_write(
                "value",
                Some(value_type),
                move || Ok(read(&getter_state).clone()),
                move |new_value| {
                    *write(&setter_state) = new_value;
                    Ok(())
                },
            ),
        )?;
        class.register_attribute(
            Self::ATTR_SCALER_UNIT,
            Attribute::read_only("scaler_unit", Some(DataObjectType::Structure), move || {
                Ok(scaler_unit.to_data_object())
            }),
        )?;

        let reset_state = value.clone();
        class.register_method(Self::METHOD_RESET, "reset", move |parameters| {
            match parameters {
                None | Some(DataObject::Integer8(0)) => {}
                Some(other) => {
                    return Err(DlmsError::InvalidData(format!(
                        "reset expects integer 0, got {}",
                        other
                    )));
                }
            }
            let mut value = write(&reset_state);
            *value = value.zeroed();
            Ok(None)
        })?;

        Ok(Self {
            class,
            value,
            scaler_unit,
        })
    }

    pub fn value(&self) -> DataObject {
        read(&self.value).clone()
    }

    /// Update the value from the metering side; the type must not change
    pub fn set_value(&self, value: DataObject) -> DlmsResult<()> {
        self.class.set(Self::ATTR_VALUE, value)
    }

    pub fn scaler_unit(&self) -> ScalerUnit {
        self.scaler_unit
    }

    /// Value in physical units, `value * 10^scaler`
    pub fn scaled_value(&self) -> Option<f64> {
        self.value().as_f64().map(|raw| self.scaler_unit.scale_value(raw))
    }

    pub fn reset(&self) {
        let mut value = write(&self.value);
        *value = value.zeroed();
    }

    pub fn class(&self) -> &CosemInterfaceClass {
        &self.class
    }
}

delegate_cosem_object!(Register, class);
