//! Activity Calendar interface class (Class ID: 20)
//!
//! Holds an active and a passive calendar. Clients edit the passive one and
//! then activate it, which swaps the two plans in one step.
//!
//! # Attributes
//!
//! - 1: logical_name
//! - 2: calendar_name_active (read-only)
//! - 3: season_profile_active (read-only)
//! - 4: week_profile_table_active (read-only)
//! - 5: day_profile_table_active (read-only)
//! - 6: calendar_name_passive
//! - 7: season_profile_passive
//! - 8: week_profile_table_passive
//! - 9: day_profile_table_passive
//! - 10: activate_passive_calendar_time
//!
//! # Methods
//!
//! - 1: activate_passive_calendar(data: integer)
//!
//! Writing a single passive table checks that table on its own. Cross-table
//! references (season to week, week to day) are checked when a whole plan is
//! installed with [`ActivityCalendar::set_passive_plan`] and again on
//! activation, so a client may write the passive tables in any order.

use crate::class::{Attribute, CosemInterfaceClass, read, write};
use dlms_core::{CosemDateTime, CosemTime, DataObject, DataObjectType, DlmsError, DlmsResult, ObisCode};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

const UNSPECIFIED_DATE_TIME: [u8; CosemDateTime::LENGTH] = [0xFF; CosemDateTime::LENGTH];

fn invalid(message: impl Into<String>) -> DlmsError {
    DlmsError::InvalidData(message.into())
}

fn octet_string(value: &DataObject, field: &str) -> DlmsResult<Vec<u8>> {
    match value {
        DataObject::OctetString(bytes) => Ok(bytes.clone()),
        other => Err(invalid(format!("{} must be an octet-string, got {:?}", field, other.get_type()))),
    }
}

fn unsigned8(value: &DataObject, field: &str) -> DlmsResult<u8> {
    value
        .as_unsigned8()
        .map_err(|_| invalid(format!("{} must be unsigned, got {:?}", field, value.get_type())))
}

fn fields<'a>(value: &'a DataObject, what: &str, count: usize) -> DlmsResult<&'a [DataObject]> {
    let elements = value
        .as_structure()
        .map_err(|_| invalid(format!("{} must be a structure", what)))?;
    if elements.len() != count {
        return Err(invalid(format!(
            "{} must have {} elements, got {}",
            what,
            count,
            elements.len()
        )));
    }
    Ok(elements)
}

fn to_array<T>(items: &[T], encode: impl Fn(&T) -> DataObject) -> DataObject {
    DataObject::Array(items.iter().map(encode).collect())
}

fn from_array<T>(value: &DataObject, decode: impl Fn(&DataObject) -> DlmsResult<T>) -> DlmsResult<Vec<T>> {
    value.as_array()?.iter().map(decode).collect()
}

/// One scheduled script call within a day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayProfileAction {
    pub start_time: CosemTime,
    /// Script table to run
    pub script_logical_name: ObisCode,
    pub script_selector: u16,
}

impl DayProfileAction {
    pub fn new(start_time: CosemTime, script_logical_name: ObisCode, script_selector: u16) -> Self {
        Self {
            start_time,
            script_logical_name,
            script_selector,
        }
    }

    pub fn to_data_object(&self) -> DataObject {
        DataObject::Structure(vec![
            DataObject::OctetString(self.start_time.encode().to_vec()),
            DataObject::from_logical_name(&self.script_logical_name),
            DataObject::Unsigned16(self.script_selector),
        ])
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        let elements = fields(value, "day profile action", 3)?;
        Ok(Self {
            start_time: CosemTime::decode(&octet_string(&elements[0], "start_time")?)?,
            script_logical_name: elements[1].as_logical_name()?,
            script_selector: elements[2].as_unsigned16()?,
        })
    }
}

/// Schedule for one kind of day, referenced by `day_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayProfile {
    pub day_id: u8,
    pub actions: Vec<DayProfileAction>,
}

impl DayProfile {
    pub fn new(day_id: u8, actions: Vec<DayProfileAction>) -> Self {
        Self { day_id, actions }
    }

    pub fn to_data_object(&self) -> DataObject {
        DataObject::Structure(vec![
            DataObject::Unsigned8(self.day_id),
            to_array(&self.actions, DayProfileAction::to_data_object),
        ])
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        let elements = fields(value, "day profile", 2)?;
        Ok(Self {
            day_id: unsigned8(&elements[0], "day_id")?,
            actions: from_array(&elements[1], DayProfileAction::from_data_object)?,
        })
    }
}

/// Day profile to use for each weekday, Monday first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekProfile {
    pub name: Vec<u8>,
    pub days: [u8; 7],
}

impl WeekProfile {
    pub fn new(name: impl Into<Vec<u8>>, days: [u8; 7]) -> Self {
        Self {
            name: name.into(),
            days,
        }
    }

    /// Day id for `weekday` (0 = Monday)
    pub fn day_id(&self, weekday: usize) -> Option<u8> {
        self.days.get(weekday).copied()
    }

    pub fn to_data_object(&self) -> DataObject {
        let mut elements = vec![DataObject::OctetString(self.name.clone())];
        elements.extend(self.days.iter().map(|&day| DataObject::Unsigned8(day)));
        DataObject::Structure(elements)
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        let elements = fields(value, "week profile", 8)?;
        let mut days = [0u8; 7];
        for (day, element) in days.iter_mut().zip(&elements[1..]) {
            *day = unsigned8(element, "week day")?;
        }
        Ok(Self {
            name: octet_string(&elements[0], "week_profile_name")?,
            days,
        })
    }
}

/// A season starting at `start` and following the week profile `week_name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonProfile {
    pub name: Vec<u8>,
    pub start: CosemDateTime,
    pub week_name: Vec<u8>,
}

impl SeasonProfile {
    pub fn new(name: impl Into<Vec<u8>>, start: CosemDateTime, week_name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            start,
            week_name: week_name.into(),
        }
    }

    pub fn to_data_object(&self) -> DataObject {
        DataObject::Structure(vec![
            DataObject::OctetString(self.name.clone()),
            DataObject::OctetString(self.start.encode().to_vec()),
            DataObject::OctetString(self.week_name.clone()),
        ])
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        let elements = fields(value, "season profile", 3)?;
        Ok(Self {
            name: octet_string(&elements[0], "season_profile_name")?,
            start: CosemDateTime::decode(&octet_string(&elements[1], "season_start")?)?,
            week_name: octet_string(&elements[2], "week_name")?,
        })
    }
}

/// Complete calendar: name plus season, week and day tables
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarPlan {
    pub name: Vec<u8>,
    pub seasons: Vec<SeasonProfile>,
    pub weeks: Vec<WeekProfile>,
    pub days: Vec<DayProfile>,
}

impl CalendarPlan {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_season(mut self, season: SeasonProfile) -> Self {
        self.seasons.push(season);
        self
    }

    pub fn with_week(mut self, week: WeekProfile) -> Self {
        self.weeks.push(week);
        self
    }

    pub fn with_day(mut self, day: DayProfile) -> Self {
        self.days.push(day);
        self
    }

    /// Check names and references across all tables
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for an empty name, a duplicate key, a season
    /// naming a missing week profile or a week naming a missing day profile
    pub fn validate(&self) -> DlmsResult<()> {
        if self.name.is_empty() {
            return Err(invalid("calendar name must not be empty"));
        }
        validate_seasons(&self.seasons)?;
        validate_weeks(&self.weeks)?;
        validate_days(&self.days)?;

        let week_names: HashSet<&[u8]> = self.weeks.iter().map(|w| w.name.as_slice()).collect();
        if let Some(season) = self
            .seasons
            .iter()
            .find(|s| !week_names.contains(s.week_name.as_slice()))
        {
            return Err(invalid(format!(
                "season {:?} references unknown week profile {:?}",
                String::from_utf8_lossy(&season.name),
                String::from_utf8_lossy(&season.week_name)
            )));
        }

        let day_ids: HashSet<u8> = self.days.iter().map(|d| d.day_id).collect();
        for week in &self.weeks {
            if let Some(day_id) = week.days.iter().find(|id| !day_ids.contains(id)) {
                return Err(invalid(format!(
                    "week profile {:?} references unknown day profile {}",
                    String::from_utf8_lossy(&week.name),
                    day_id
                )));
            }
        }
        Ok(())
    }
}

fn validate_seasons(seasons: &[SeasonProfile]) -> DlmsResult<()> {
    let mut names = HashSet::new();
    for season in seasons {
        if season.name.is_empty() || season.week_name.is_empty() {
            return Err(invalid("season profile and week names must not be empty"));
        }
        if !names.insert(season.name.as_slice()) {
            return Err(invalid(format!(
                "duplicate season profile {:?}",
                String::from_utf8_lossy(&season.name)
            )));
        }
    }
    Ok(())
}

fn validate_weeks(weeks: &[WeekProfile]) -> DlmsResult<()> {
    let mut names = HashSet::new();
    for week in weeks {
        if week.name.is_empty() {
            return Err(invalid("week profile name must not be empty"));
        }
        if !names.insert(week.name.as_slice()) {
            return Err(invalid(format!(
                "duplicate week profile {:?}",
                String::from_utf8_lossy(&week.name)
            )));
        }
    }
    Ok(())
}

fn validate_days(days: &[DayProfile]) -> DlmsResult<()> {
    let mut ids = HashSet::new();
    for day in days {
        if !ids.insert(day.day_id) {
            return Err(invalid(format!("duplicate day profile {}", day.day_id)));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Calendars {
    active: CalendarPlan,
    passive: CalendarPlan,
    activation_time: Option<CosemDateTime>,
}

impl Calendars {
    fn activate(&mut self) -> DlmsResult<()> {
        self.passive.validate()?;
        std::mem::swap(&mut self.active, &mut self.passive);
        self.activation_time = None;
        log::info!(
            "Calendar {:?} activated",
            String::from_utf8_lossy(&self.active.name)
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ActivityCalendar {
    class: CosemInterfaceClass,
    calendars: Arc<RwLock<Calendars>>,
}

impl ActivityCalendar {
    pub const CLASS_ID: u16 = 20;

    pub const ATTR_CALENDAR_NAME_ACTIVE: u8 = 2;
    pub const ATTR_SEASON_PROFILE_ACTIVE: u8 = 3;
    pub const ATTR_WEEK_PROFILE_TABLE_ACTIVE: u8 = 4;
    pub const ATTR_DAY_PROFILE_TABLE_ACTIVE: u8 = 5;
    pub const ATTR_CALENDAR_NAME_PASSIVE: u8 = 6;
    pub const ATTR_SEASON_PROFILE_PASSIVE: u8 = 7;
    pub const ATTR_WEEK_PROFILE_TABLE_PASSIVE: u8 = 8;
    pub const ATTR_DAY_PROFILE_TABLE_PASSIVE: u8 = 9;
    pub const ATTR_ACTIVATE_PASSIVE_CALENDAR_TIME: u8 = 10;

    pub const METHOD_ACTIVATE_PASSIVE_CALENDAR: u8 = 1;

    /// 0-0:13.0.0.255
    pub fn default_obis() -> ObisCode {
        ObisCode::new(0, 0, 13, 0, 0, 255)
    }

    /// A calendar with `active` in force and an empty passive plan
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if `active` does not validate
    pub fn new(logical_name: ObisCode, active: CalendarPlan) -> DlmsResult<Self> {
        active.validate()?;
        let calendars = Arc::new(RwLock::new(Calendars {
            active,
            ..Calendars::default()
        }));
        let mut class = CosemInterfaceClass::new(Self::CLASS_ID, 0, logical_name);

        let state = calendars.clone();
        class.register_attribute(
            Self::ATTR_CALENDAR_NAME_ACTIVE,
            Attribute::read_only("calendar_name_active", Some(DataObjectType::OctetString), move || {
                Ok(DataObject::OctetString(read(&state).active.name.clone()))
            }),
        )?;
        let state = calendars.clone();
        class.register_attribute(
            Self::ATTR_SEASON_PROFILE_ACTIVE,
            Attribute::read_only("season_profile_active", Some(DataObjectType::Array), move || {
                Ok(to_array(&read(&state).active.seasons, SeasonProfile::to_data_object))
            }),
        )?;
        let state = calendars.clone();
        class.register_attribute(
            Self::ATTR_WEEK_PROFILE_TABLE_ACTIVE,
            Attribute::read_only("week_profile_table_active", Some(DataObjectType::Array), move || {
                Ok(to_array(&read(&state).active.weeks, WeekProfile::to_data_object))
            }),
        )?;
        let state = calendars.clone();
        class.register_attribute(
            Self::ATTR_DAY_PROFILE_TABLE_ACTIVE,
            Attribute::read_only("day_profile_table_active", Some(DataObjectType::Array), move || {
                Ok(to_array(&read(&state).active.days, DayProfile::to_data_object))
            }),
        )?;

        let (get_state, set_state) = (calendars.clone(), calendars.clone());
        class.register_attribute(
            Self::ATTR_CALENDAR_NAME_PASSIVE,
            Attribute::read_write(
                "calendar_name_passive",
                Some(DataObjectType::OctetString),
                move || Ok(DataObject::OctetString(read(&get_state).passive.name.clone())),
                move |value| {
                    let name = octet_string(&value, "calendar_name")?;
                    if name.is_empty() {
                        return Err(invalid("calendar name must not be empty"));
                    }
                    write(&set_state).passive.name = name;
                    Ok(())
                },
            ),
        )?;
        let (get_state, set_state) = (calendars.clone(), calendars.clone());
        class.register_attribute(
            Self::ATTR_SEASON_PROFILE_PASSIVE,
            Attribute::read_write(
                "season_profile_passive",
                Some(DataObjectType::Array),
                move || Ok(to_array(&read(&get_state).passive.seasons, SeasonProfile::to_data_object)),
                move |value| {
                    let seasons = from_array(&value, SeasonProfile::from_data_object)?;
                    validate_seasons(&seasons)?;
                    write(&set_state).passive.seasons = seasons;
                    Ok(())
                },
            ),
        )?;
        let (get_state, set_state) = (calendars.clone(), calendars.clone());
        class.register_attribute(
            Self::ATTR_WEEK_PROFILE_TABLE_PASSIVE,
            Attribute::read_write(
                "week_profile_table_passive",
                Some(DataObjectType::Array),
                move || Ok(to_array(&read(&get_state).passive.weeks, WeekProfile::to_data_object)),
                move |value| {
                    let weeks = from_array(&value, WeekProfile::from_data_object)?;
                    validate_weeks(&weeks)?;
                    write(&set_state).passive.weeks = weeks;
                    Ok(())
                },
            ),
        )?;
        let (get_state, set_state) = (calendars.clone(), calendars.clone());
        class.register_attribute(
            Self::ATTR_DAY_PROFILE_TABLE_PASSIVE,
            Attribute::read_write(
                "day_profile_table_passive",
                Some(DataObjectType::Array),
                move || Ok(to_array(&read(&get_state).passive.days, DayProfile::to_data_object)),
                move |value| {
                    let days = from_array(&value, DayProfile::from_data_object)?;
                    validate_days(&days)?;
                    write(&set_state).passive.days = days;
                    Ok(())
                },
            ),
        )?;
        let (get_state, set_state) = (calendars.clone(), calendars.clone());
        class.register_attribute(
            Self::ATTR_ACTIVATE_PASSIVE_CALENDAR_TIME,
            Attribute::read_write(
                "activate_passive_calendar_time",
                Some(DataObjectType::OctetString),
                move || {
                    let encoded = match read(&get_state).activation_time {
                        Some(time) => time.encode(),
                        None => UNSPECIFIED_DATE_TIME,
                    };
                    Ok(DataObject::OctetString(encoded.to_vec()))
                },
                move |value| {
                    let bytes = octet_string(&value, "activate_passive_calendar_time")?;
                    let time = if bytes == UNSPECIFIED_DATE_TIME {
                        None
                    } else {
                        Some(CosemDateTime::decode(&bytes)?)
                    };
                    write(&set_state).activation_time = time;
                    Ok(())
                },
            ),
        )?;

        let state = calendars.clone();
        class.register_method(
            Self::METHOD_ACTIVATE_PASSIVE_CALENDAR,
            "activate_passive_calendar",
            move |parameters| {
                match parameters {
                    None | Some(DataObject::Integer8(0)) => {}
                    Some(other) => {
                        return Err(invalid(format!(
                            "activate_passive_calendar expects integer 0, got {}",
                            other
                        )));
                    }
                }
                write(&state).activate()?;
                Ok(None)
            },
        )?;

        Ok(Self { class, calendars })
    }

    /// Calendar at 0-0:13.0.0.255 with `active` in force
    pub fn with_default_obis(active: CalendarPlan) -> DlmsResult<Self> {
        Self::new(Self::default_obis(), active)
    }

    pub fn active_plan(&self) -> CalendarPlan {
        read(&self.calendars).active.clone()
    }

    pub fn passive_plan(&self) -> CalendarPlan {
        read(&self.calendars).passive.clone()
    }

    /// Both plans as seen at one instant
    pub fn plans(&self) -> (CalendarPlan, CalendarPlan) {
        let calendars = read(&self.calendars);
        (calendars.active.clone(), calendars.passive.clone())
    }

    /// Replace the passive plan after validating it
    pub fn set_passive_plan(&self, plan: CalendarPlan) -> DlmsResult<()> {
        plan.validate()?;
        write(&self.calendars).passive = plan;
        Ok(())
    }

    /// Swap the active and passive plans
    ///
    /// # Errors
    ///
    /// Returns `InvalidData`, leaving both plans untouched, if the passive
    /// plan does not validate
    pub fn activate_passive_calendar(&self) -> DlmsResult<()> {
        write(&self.calendars).activate()
    }

    pub fn activation_time(&self) -> Option<CosemDateTime> {
        read(&self.calendars).activation_time
    }

    pub fn class(&self) -> &CosemInterfaceClass {
        &self.class
    }
}

delegate_cosem_object!(ActivityCalendar, class);

#[cfg(test)]
mod tests {
    use super::*;

    fn tariff_plan(name: &str) -> CalendarPlan {
        let script_table = ObisCode::new(0, 0, 10, 0, 100, 255);
        CalendarPlan::new(name)
            .with_season(SeasonProfile::new(
                "winter",
                CosemDateTime::new(0xFFFF, 10, 1, 0, 0, 0),
                "working",
            ))
            .with_week(WeekProfile::new("working", [1, 1, 1, 1, 1, 2, 2]))
            .with_day(DayProfile::new(
                1,
                vec![
                    DayProfileAction::new(CosemTime::new(6, 0, 0), script_table, 1),
                    DayProfileAction::new(CosemTime::new(22, 0, 0), script_table, 2),
                ],
            ))
            .with_day(DayProfile::new(2, vec![DayProfileAction::new(
                CosemTime::new(0, 0, 0),
                script_table,
                2,
            )]))
    }

    #[test]
    fn test_plan_validation() {
        assert!(tariff_plan("T1").validate().is_ok());
        assert!(tariff_plan("").validate().is_err());

        let mut missing_week = tariff_plan("T1");
        missing_week.seasons[0].week_name = b"holiday".to_vec();
        assert!(missing_week.validate().is_err());

        let mut missing_day = tariff_plan("T1");
        missing_day.weeks[0].days[6] = 9;
        assert!(missing_day.validate().is_err());

        let duplicate_day = tariff_plan("T1").with_day(DayProfile::new(1, Vec::new()));
        assert!(duplicate_day.validate().is_err());

        let unnamed_week = tariff_plan("T1").with_week(WeekProfile::new("", [1; 7]));
        assert!(unnamed_week.validate().is_err());
    }

    #[test]
    fn test_tables_survive_data_object_form() {
        let plan = tariff_plan("T1");
        let seasons = to_array(&plan.seasons, SeasonProfile::to_data_object);
        let weeks = to_array(&plan.weeks, WeekProfile::to_data_object);
        let days = to_array(&plan.days, DayProfile::to_data_object);
        assert_eq!(from_array(&seasons, SeasonProfile::from_data_object).unwrap(), plan.seasons);
        assert_eq!(from_array(&weeks, WeekProfile::from_data_object).unwrap(), plan.weeks);
        assert_eq!(from_array(&days, DayProfile::from_data_object).unwrap(), plan.days);
    }

    #[test]
    fn test_activation_swaps_plans() {
        let calendar = ActivityCalendar::with_default_obis(tariff_plan("T1")).unwrap();
        calendar.set_passive_plan(tariff_plan("T2")).unwrap();
        calendar.activate_passive_calendar().unwrap();
        let (active, passive) = calendar.plans();
        assert_eq!(active.name, b"T2");
        assert_eq!(passive.name, b"T1");
    }

    #[test]
    fn test_invalid_passive_not_activated() {
        let calendar = ActivityCalendar::with_default_obis(tariff_plan("T1")).unwrap();
        // Passive plan starts empty and unnamed
        assert!(calendar.activate_passive_calendar().is_err());
        assert_eq!(calendar.active_plan().name, b"T1");
    }

    #[test]
    fn test_set_passive_plan_rejects_dangling_reference() {
        let calendar = ActivityCalendar::with_default_obis(tariff_plan("T1")).unwrap();
        let mut plan = tariff_plan("T2");
        plan.days.clear();
        assert!(calendar.set_passive_plan(plan).is_err());
        assert_eq!(calendar.passive_plan(), CalendarPlan::default());
    }
}
