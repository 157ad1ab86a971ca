pub mod geo_util;
pub mod progress;
pub mod route_path;
pub mod stop;
pub mod track_point;
pub mod track_session;

/// Kilograms of CO2 saved per driven kilometre.
pub const CO2_KG_PER_KM: f64 = 0.12;

/// Fixed per-stop estimate used for the remaining time.
pub const MINUTES_PER_STOP: u32 = 5;
