//! Simulated meter
//!
//! Serves an energy register and an activity calendar over TCP/HDLC.
//!
//! ```text
//! RUST_LOG=debug dlms-meter 127.0.0.1:4059
//! ```

use anyhow::Context;
use dlms::interface::{
    ActivityCalendar, CalendarPlan, DayProfile, DayProfileAction, Register, ScalerUnit, SeasonProfile,
    WeekProfile, units,
};
use dlms::server::{CosemServer, ServerListener};
use dlms::{CosemDateTime, CosemTime, DataObject, ObisCode};
use std::sync::Arc;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4059";

fn tariff_plan() -> CalendarPlan {
    let tariffs = ObisCode::new(0, 0, 10, 0, 100, 255);
    CalendarPlan::new("STD")
        .with_season(SeasonProfile::new(
            "year",
            CosemDateTime::new(0xFFFF, 1, 1, 0, 0, 0),
            "week",
        ))
        .with_week(WeekProfile::new("week", [1, 1, 1, 1, 1, 2, 2]))
        .with_day(DayProfile::new(1, vec![
            DayProfileAction::new(CosemTime::new(0, 0, 0), tariffs, 2),
            DayProfileAction::new(CosemTime::new(7, 0, 0), tariffs, 1),
            DayProfileAction::new(CosemTime::new(22, 0, 0), tariffs, 2),
        ]))
        .with_day(DayProfile::new(2, vec![DayProfileAction::new(
            CosemTime::new(0, 0, 0),
            tariffs,
            2,
        )]))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let address = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

    let server = CosemServer::new();
    let energy = Register::new(
        ObisCode::new(1, 0, 1, 8, 0, 255),
        DataObject::new_unsigned32(0),
        ScalerUnit::new(0, units::WATT_HOUR),
    )
    .context("energy register")?;
    server.register_object(Arc::new(energy)).await?;
    let calendar = ActivityCalendar::with_default_obis(tariff_plan()).context("activity calendar")?;
    server.register_object(Arc::new(calendar)).await?;
    log::info!("Serving {} objects", server.object_count().await);

    let listener = ServerListener::bind(Arc::new(server), &address)
        .await
        .with_context(|| format!("cannot listen on {}", address))?;
    listener.run().await?;
    Ok(())
}
