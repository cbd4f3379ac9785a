//! COSEM interface classes for DLMS/COSEM
//!
//! Objects are addressed by class id and logical name (OBIS code) and expose
//! numbered attributes and methods through the [`CosemObject`] trait.
//! [`CosemInterfaceClass`] is the generic registry every concrete class is
//! built on; [`Register`] (class 3) and [`ActivityCalendar`] (class 20) are
//! provided on top of it.

#[macro_use]
mod macros;

pub mod access;
pub mod activity_calendar;
pub mod class;
pub mod object;
pub mod register;
pub mod scaler_unit;

pub use access::AccessMode;
pub use activity_calendar::{
    ActivityCalendar, CalendarPlan, DayProfile, DayProfileAction, SeasonProfile, WeekProfile,
};
pub use class::{Attribute, CosemInterfaceClass, Getter, LOGICAL_NAME_ATTRIBUTE, Method, MethodHandler, Setter};
pub use object::CosemObject;
pub use register::Register;
pub use scaler_unit::{ScalerUnit, units};
