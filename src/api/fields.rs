//! Field-name presets for the `fields` parameter and history averaging windows.

use std::fmt;
use std::str::FromStr;

const STATION_METADATA: &[&str] = &[
    "name",
    "icon",
    "model",
    "hardware",
    "location_type",
    "private",
    "latitude",
    "longitude",
    "altitude",
    "position_rating",
    "led_brightness",
    "firmware_version",
    "firmware_upgrade",
    "rssi",
    "uptime",
    "pa_latency",
    "memory",
    "last_seen",
    "last_modified",
    "date_created",
    "channel_state",
    "channel_flags",
    "channel_flags_manual",
    "channel_flags_auto",
    "confidence",
    "confidence_manual",
    "confidence_auto",
];

const ENVIRONMENT: &[&str] = &[
    "humidity",
    "humidity_a",
    "humidity_b",
    "temperature",
    "temperature_a",
    "temperature_b",
    "pressure",
    "pressure_a",
    "pressure_b",
];

const MISCELLANEOUS: &[&str] = &["voc", "voc_a", "voc_b", "ozone1", "analog_input"];

const PM1: &[&str] = &[
    "pm1.0",
    "pm1.0_a",
    "pm1.0_b",
    "pm1.0_atm",
    "pm1.0_atm_a",
    "pm1.0_atm_b",
    "pm1.0_cf_1",
    "pm1.0_cf_1_a",
    "pm1.0_cf_1_b",
];

const PM2_5: &[&str] = &[
    "pm2.5_atm",
    "pm2.5_atm_a",
    "pm2.5_atm_b",
    "pm2.5_cf_1",
    "pm2.5_cf_1_a",
    "pm2.5_cf_1_b",
];

const PM2_5_AVERAGES: &[&str] = &[
    "pm2.5_10minute",
    "pm2.5_10minute_a",
    "pm2.5_10minute_b",
    "pm2.5_30minute",
    "pm2.5_30minute_a",
    "pm2.5_30minute_b",
    "pm2.5_60minute",
    "pm2.5_60minute_a",
    "pm2.5_60minute_b",
    "pm2.5_6hour",
    "pm2.5_6hour_a",
    "pm2.5_6hour_b",
    "pm2.5_24hour",
    "pm2.5_24hour_a",
    "pm2.5_24hour_b",
    "pm2.5_1week",
    "pm2.5_1week_a",
    "pm2.5_1week_b",
];

const PM10: &[&str] = &[
    "pm10.0",
    "pm10.0_a",
    "pm10.0_b",
    "pm10.0_atm",
    "pm10.0_atm_a",
    "pm10.0_atm_b",
    "pm10.0_cf_1",
    "pm10.0_cf_1_a",
    "pm10.0_cf_1_b",
];

const VISIBILITY: &[&str] = &[
    "scattering_coefficient",
    "scattering_coefficient_a",
    "scattering_coefficient_b",
    "deciviews",
    "deciviews_a",
    "deciviews_b",
    "visual_range",
    "visual_range_a",
    "visual_range_b",
];

const PARTICLE_COUNT: &[&str] = &[
    "0.3_um_count",
    "0.3_um_count_a",
    "0.3_um_count_b",
    "0.5_um_count",
    "0.5_um_count_a",
    "0.5_um_count_b",
    "1.0_um_count",
    "1.0_um_count_a",
    "1.0_um_count_b",
    "2.5_um_count",
    "2.5_um_count_a",
    "2.5_um_count_b",
    "5.0_um_count",
    "5.0_um_count_a",
    "5.0_um_count_b",
    "10.0_um_count",
    "10.0_um_count_a",
    "10.0_um_count_b",
];

/// Named groups of sensor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    StationMetadata,
    Environment,
    Miscellaneous,
    Pm1,
    Pm2_5,
    Pm2_5Averages,
    Pm10,
    Visibility,
    ParticleCount,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 9] = [
        FieldGroup::StationMetadata,
        FieldGroup::Environment,
        FieldGroup::Miscellaneous,
        FieldGroup::Pm1,
        FieldGroup::Pm2_5,
        FieldGroup::Pm2_5Averages,
        FieldGroup::Pm10,
        FieldGroup::Visibility,
        FieldGroup::ParticleCount,
    ];

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            FieldGroup::StationMetadata => STATION_METADATA,
            FieldGroup::Environment => ENVIRONMENT,
            FieldGroup::Miscellaneous => MISCELLANEOUS,
            FieldGroup::Pm1 => PM1,
            FieldGroup::Pm2_5 => PM2_5,
            FieldGroup::Pm2_5Averages => PM2_5_AVERAGES,
            FieldGroup::Pm10 => PM10,
            FieldGroup::Visibility => VISIBILITY,
            FieldGroup::ParticleCount => PARTICLE_COUNT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldGroup::StationMetadata => "station",
            FieldGroup::Environment => "environment",
            FieldGroup::Miscellaneous => "misc",
            FieldGroup::Pm1 => "pm1",
            FieldGroup::Pm2_5 => "pm2.5",
            FieldGroup::Pm2_5Averages => "pm2.5-averages",
            FieldGroup::Pm10 => "pm10",
            FieldGroup::Visibility => "visibility",
            FieldGroup::ParticleCount => "particle-count",
        }
    }
}

impl FromStr for FieldGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldGroup::ALL
            .into_iter()
            .find(|g| g.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field group `{s}`"))
    }
}

/// Averaging window for sensor history, sent as minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Average {
    RealTime,
    TenMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    OneDay,
    OneWeek,
    OneMonth,
    OneYear,
}

impl Average {
    pub fn minutes(self) -> u32 {
        match self {
            Average::RealTime => 0,
            Average::TenMinutes => 10,
            Average::ThirtyMinutes => 30,
            Average::OneHour => 60,
            Average::SixHours => 360,
            Average::OneDay => 1440,
            Average::OneWeek => 10080,
            Average::OneMonth => 43200,
            Average::OneYear => 525600,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        // ---
        let average = match minutes {
            0 => Average::RealTime,
            10 => Average::TenMinutes,
            30 => Average::ThirtyMinutes,
            60 => Average::OneHour,
            360 => Average::SixHours,
            1440 => Average::OneDay,
            10080 => Average::OneWeek,
            43200 => Average::OneMonth,
            525600 => Average::OneYear,
            _ => return None,
        };
        Some(average)
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.minutes())
    }
}

impl FromStr for Average {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .ok()
            .and_then(Average::from_minutes)
            .ok_or_else(|| format!("unsupported averaging window `{s}` (minutes: 0, 10, 30, 60, 360, 1440, 10080, 43200, 525600)"))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn groups_parse_by_name() {
        // ---
        assert_eq!("PM2.5".parse::<FieldGroup>(), Ok(FieldGroup::Pm2_5));
        assert_eq!("environment".parse::<FieldGroup>().map(|g| g.fields().len()), Ok(9));
        assert!("ozone".parse::<FieldGroup>().is_err());
    }

    #[test]
    fn groups_have_no_duplicate_fields() {
        // ---
        let mut all: Vec<&str> = FieldGroup::ALL.iter().flat_map(|g| g.fields().iter().copied()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn averages_round_trip_through_minutes() {
        // ---
        assert_eq!("1440".parse::<Average>(), Ok(Average::OneDay));
        assert_eq!(Average::OneYear.to_string(), "525600");
        assert!("15".parse::<Average>().is_err());
        assert!("hourly".parse::<Average>().is_err());
    }
}
