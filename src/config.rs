//! Two layers of configuration: `AppConfig` (process-level, loaded once from
//! the environment at startup) and `ScheduleConfig` (the domain singleton
//! describing the institution's weekly period structure, from which the
//! `TimeSlot` catalog is derived).

use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{TimeSlot, TimeSlotId, Weekday};
use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Process-level configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub csp_timeout: Duration,
    pub default_ga_pop_size: usize,
    pub default_ga_generations: usize,
    pub default_ga_mutation_rate: f64,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            csp_timeout: Duration::from_secs(60),
            default_ga_pop_size: 50,
            default_ga_generations: 100,
            default_ga_mutation_rate: 0.1,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the environment, falling back to the documented defaults
    /// for anything unset. A `.env` file in the working directory is read
    /// first, if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = AppConfig::default();

        let csp_timeout_secs = match env::var("CSP_TIMEOUT_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("CSP_TIMEOUT_SECS".into(), v))?,
            Err(_) => defaults.csp_timeout.as_secs(),
        };

        let default_ga_pop_size = match env::var("GA_POP_SIZE") {
            Ok(v) => v
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("GA_POP_SIZE".into(), v))?,
            Err(_) => defaults.default_ga_pop_size,
        };

        let default_ga_generations = match env::var("GA_GENERATIONS") {
            Ok(v) => v
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("GA_GENERATIONS".into(), v))?,
            Err(_) => defaults.default_ga_generations,
        };

        let default_ga_mutation_rate = match env::var("GA_MUTATION_RATE") {
            Ok(v) => v
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidValue("GA_MUTATION_RATE".into(), v))?,
            Err(_) => defaults.default_ga_mutation_rate,
        };

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            csp_timeout: Duration::from_secs(csp_timeout_secs),
            default_ga_pop_size,
            default_ga_generations,
            default_ga_mutation_rate,
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }
}

/// One break, located either after a given period number or at a fixed
/// clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakPlacement {
    AfterPeriod(u32),
    AtTime(NaiveTime),
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBreakSpec {
    pub placement: BreakPlacement,
    pub duration_minutes: u32,
}

/// Raw wire shape of one break entry in the configuration request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakSpec {
    pub position: Option<u32>,
    pub start_time: Option<String>,
    pub duration_minutes: u32,
}

/// Raw wire shape of the schedule-config request described in §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfigInput {
    pub day_start_time: String,
    pub day_end_time: Option<String>,
    pub working_minutes_per_day: Option<u32>,
    pub number_of_periods: Option<u32>,
    pub period_duration_minutes: Option<u32>,
    pub breaks: Vec<BreakSpec>,
    pub lunch_break_start: Option<String>,
    pub lunch_break_end: Option<String>,
    pub schedule_days: Option<Vec<String>>,
}

impl Default for ScheduleConfigInput {
    fn default() -> Self {
        Self {
            day_start_time: "09:00".to_string(),
            day_end_time: None,
            working_minutes_per_day: None,
            number_of_periods: None,
            period_duration_minutes: None,
            breaks: Vec::new(),
            lunch_break_start: None,
            lunch_break_end: None,
            schedule_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LunchBreak {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// The derived, fully-validated schedule configuration. Every
/// config-dependent operation takes this explicitly rather than reaching
/// for a hidden global.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub day_start_time: NaiveTime,
    pub day_end_time: NaiveTime,
    pub number_of_periods: u32,
    pub period_duration_minutes: u32,
    pub breaks: Vec<ResolvedBreakSpec>,
    pub lunch_break: Option<LunchBreak>,
    pub schedule_days: Vec<Weekday>,
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| Error::Validation(format!("'{s}' is not a valid HH:MM time")))
}

fn parse_weekday(s: &str) -> Result<Weekday, Error> {
    match s.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(Error::Validation(format!("'{other}' is not a weekday"))),
    }
}

fn minutes_between(start: NaiveTime, end: NaiveTime) -> Result<u32, Error> {
    let delta = end.signed_duration_since(start);
    let minutes = delta.num_minutes();
    if minutes <= 0 {
        return Err(Error::Validation(
            "end time must be strictly after start time".to_string(),
        ));
    }
    Ok(minutes as u32)
}

impl ScheduleConfig {
    /// Validate and derive a full `ScheduleConfig` from the wire input,
    /// following the rules of §6: at least one of an explicit end / working
    /// minutes, at least one of explicit period count / duration, and
    /// rejection of configurations that run past midnight or leave no room
    /// for the declared breaks.
    pub fn derive(input: ScheduleConfigInput) -> Result<Self, Error> {
        let day_start_time = parse_hhmm(&input.day_start_time)?;

        let lunch_break = match (&input.lunch_break_start, &input.lunch_break_end) {
            (Some(s), Some(e)) => {
                let start = parse_hhmm(s)?;
                let end = parse_hhmm(e)?;
                minutes_between(start, end)?;
                Some(LunchBreak { start, end })
            }
            (None, None) => None,
            _ => {
                return Err(Error::Validation(
                    "lunch_break_start and lunch_break_end must both be set or both omitted"
                        .to_string(),
                ));
            }
        };

        let working_minutes = match (input.day_end_time.as_deref(), input.working_minutes_per_day)
        {
            (Some(end_str), _) => {
                let end = parse_hhmm(end_str)?;
                minutes_between(day_start_time, end)?
            }
            (None, Some(minutes)) => minutes,
            (None, None) => {
                return Err(Error::Validation(
                    "either day_end_time or working_minutes_per_day is required".to_string(),
                ));
            }
        };

        if working_minutes == 0 || working_minutes >= 24 * 60 {
            return Err(Error::Validation(
                "the schedule day must fit within a single calendar day".to_string(),
            ));
        }

        let day_end_time = day_start_time + chrono::Duration::minutes(working_minutes as i64);
        if day_end_time <= day_start_time {
            return Err(Error::Validation(
                "the configured day extends past midnight".to_string(),
            ));
        }

        let lunch_minutes = lunch_break
            .map(|b| minutes_between(b.start, b.end))
            .transpose()?
            .unwrap_or(0);
        let breaks_minutes: u32 = input.breaks.iter().map(|b| b.duration_minutes).sum();
        let non_teaching_minutes = lunch_minutes + breaks_minutes;

        if non_teaching_minutes >= working_minutes {
            return Err(Error::Validation(
                "breaks and lunch leave no time for teaching periods".to_string(),
            ));
        }
        let teaching_minutes = working_minutes - non_teaching_minutes;

        let (number_of_periods, period_duration_minutes) =
            match (input.number_of_periods, input.period_duration_minutes) {
                (Some(n), Some(d)) => (n, d),
                (Some(n), None) => {
                    if n == 0 {
                        return Err(Error::Validation(
                            "number_of_periods must be at least 1".to_string(),
                        ));
                    }
                    (n, teaching_minutes / n)
                }
                (None, Some(d)) => {
                    if d == 0 {
                        return Err(Error::Validation(
                            "period_duration_minutes must be at least 1".to_string(),
                        ));
                    }
                    (teaching_minutes / d, d)
                }
                (None, None) => {
                    return Err(Error::Validation(
                        "either number_of_periods or period_duration_minutes is required"
                            .to_string(),
                    ));
                }
            };

        if number_of_periods == 0 || period_duration_minutes == 0 {
            return Err(Error::Validation(
                "insufficient available time for the requested periods".to_string(),
            ));
        }

        let mut breaks = Vec::with_capacity(input.breaks.len());
        for spec in &input.breaks {
            let placement = match (spec.position, spec.start_time.as_deref()) {
                (Some(p), None) => BreakPlacement::AfterPeriod(p),
                (None, Some(t)) => BreakPlacement::AtTime(parse_hhmm(t)?),
                _ => {
                    return Err(Error::Validation(
                        "each break needs exactly one of position or start_time".to_string(),
                    ));
                }
            };
            breaks.push(ResolvedBreakSpec {
                placement,
                duration_minutes: spec.duration_minutes,
            });
        }

        let schedule_days = match &input.schedule_days {
            Some(days) => days.iter().map(|d| parse_weekday(d)).collect::<Result<_, _>>()?,
            None => Weekday::WORKWEEK.to_vec(),
        };

        debug!(
            "schedule config derived: {number_of_periods} periods of {period_duration_minutes}min, {} breaks, lunch={}",
            breaks.len(),
            lunch_break.is_some()
        );

        Ok(Self {
            day_start_time,
            day_end_time,
            number_of_periods,
            period_duration_minutes,
            breaks,
            lunch_break,
            schedule_days,
        })
    }

    /// Walk each configured day, laying out periods and breaks in clock
    /// order, and emit the full `TimeSlot` catalog. Ids are assigned
    /// sequentially starting at 1.
    pub fn generate_time_slots(&self) -> Vec<TimeSlot> {
        let mut slots = Vec::new();
        let mut next_id: TimeSlotId = 1;

        for &day in &self.schedule_days {
            let mut cursor = self.day_start_time;
            let mut period = 1u32;
            let mut lunch_used = false;
            let mut breaks_used = vec![false; self.breaks.len()];

            while period <= self.number_of_periods {
                if let Some(lunch) = &self.lunch_break {
                    if !lunch_used && cursor >= lunch.start {
                        slots.push(TimeSlot {
                            id: next_id,
                            day,
                            period,
                            start: lunch.start,
                            end: lunch.end,
                            is_break: true,
                        });
                        next_id += 1;
                        cursor = lunch.end;
                        lunch_used = true;
                        continue;
                    }
                }

                let mut inserted_break = false;
                for (idx, b) in self.breaks.iter().enumerate() {
                    if breaks_used[idx] {
                        continue;
                    }
                    let triggers = match b.placement {
                        BreakPlacement::AfterPeriod(n) => period == n + 1,
                        BreakPlacement::AtTime(t) => cursor >= t,
                    };
                    if triggers {
                        let end = cursor + chrono::Duration::minutes(b.duration_minutes as i64);
                        slots.push(TimeSlot {
                            id: next_id,
                            day,
                            period,
                            start: cursor,
                            end,
                            is_break: true,
                        });
                        next_id += 1;
                        cursor = end;
                        breaks_used[idx] = true;
                        inserted_break = true;
                        break;
                    }
                }
                if inserted_break {
                    continue;
                }

                let end = cursor + chrono::Duration::minutes(self.period_duration_minutes as i64);
                slots.push(TimeSlot {
                    id: next_id,
                    day,
                    period,
                    start: cursor,
                    end,
                    is_break: false,
                });
                next_id += 1;
                cursor = end;
                period += 1;
            }
        }

        info!(
            "generated {} time slots across {} days ({} periods/day)",
            slots.len(),
            self.schedule_days.len(),
            self.number_of_periods
        );
        slots
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        // Falls back to the documented default input shape; only fails if
        // the hardcoded defaults themselves are invalid, which they are not.
        match ScheduleConfig::derive(ScheduleConfigInput {
            working_minutes_per_day: Some(6 * 60),
            number_of_periods: Some(6),
            ..Default::default()
        }) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("default schedule config failed to derive ({e}); using a minimal fallback");
                ScheduleConfig {
                    day_start_time: parse_hhmm("09:00").unwrap(),
                    day_end_time: parse_hhmm("15:00").unwrap(),
                    number_of_periods: 6,
                    period_duration_minutes: 60,
                    breaks: Vec::new(),
                    lunch_break: None,
                    schedule_days: Weekday::WORKWEEK.to_vec(),
                }
            }
        }
    }
}
