//! Weather lookup, operating envelopes and daylight
//!
//! Methods consult the weather once per site and day through [`WeatherGate`].
//! The lookup itself is an external collaborator behind [`WeatherLookup`].

pub mod daylight;
pub mod gate;
pub mod lookup;

pub use daylight::{available_work_hours, daylight_hours};
pub use gate::{GateOutcome, WeatherGate, SURVEY_CHECK_HOUR};
pub use lookup::{ConstantWeather, DailyWeatherTable, SeasonalWeather, WeatherLookup, WeatherSample};
