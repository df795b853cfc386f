use crate::schema::{Milestone, MilestoneStatus};
use crate::utils::{is_canonical_period, parse_calendar_date};
use chrono::{Months, NaiveDate};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bars never render narrower than this share of the chart.
pub const MIN_BAR_WIDTH_PCT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineBar {
    pub name: String,
    pub status: MilestoneStatus,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub offset_pct: f64,
    pub width_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    /// Padded chart window.
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub total_days: i64,
    pub bars: Vec<TimelineBar>,
    /// Milestones left off the chart because a date could not be read.
    pub unscheduled: Vec<String>,
}

impl Timeline {
    /// Lays the milestones out on a window padded by one month on each side.
    pub fn from_milestones(milestones: &[Milestone]) -> Self {
        let mut unscheduled = Vec::new();
        let dated: Vec<(&Milestone, NaiveDate, NaiveDate)> = milestones
            .iter()
            .filter_map(|m| match (parse_milestone_date(&m.start), parse_milestone_date(&m.end)) {
                (Some(start), Some(end)) => Some((m, start, end)),
                _ => {
                    warn!("Milestone '{}' has an unreadable date, leaving it off the timeline", m.name);
                    unscheduled.push(m.name.clone());
                    None
                }
            })
            .collect();

        let earliest = dated.iter().flat_map(|(_, s, e)| [*s, *e]).min();
        let latest = dated.iter().flat_map(|(_, s, e)| [*s, *e]).max();

        let (Some(window_start), Some(window_end)) = (
            earliest.and_then(|d| d.checked_sub_months(Months::new(1))),
            latest.and_then(|d| d.checked_add_months(Months::new(1))),
        ) else {
            return Self {
                unscheduled,
                ..Default::default()
            };
        };

        let total_days = (window_end - window_start).num_days();
        let share = |days: i64| {
            if total_days == 0 {
                0.0
            } else {
                days as f64 / total_days as f64 * 100.0
            }
        };

        let bars = dated
            .into_iter()
            .map(|(m, start, end)| TimelineBar {
                name: m.name.clone(),
                status: m.status,
                start,
                end,
                offset_pct: share((start - window_start).num_days()),
                width_pct: share((end - start).num_days()).max(MIN_BAR_WIDTH_PCT),
            })
            .collect();

        Self {
            window_start: Some(window_start),
            window_end: Some(window_end),
            total_days,
            bars,
            unscheduled,
        }
    }

    pub fn count_by_status(&self, status: MilestoneStatus) -> usize {
        self.bars.iter().filter(|b| b.status == status).count()
    }
}

fn parse_milestone_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if is_canonical_period(value) {
        return NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok();
    }
    parse_calendar_date(value)
}
