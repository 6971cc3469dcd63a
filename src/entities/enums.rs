//! Closed label sets persisted as strings.
//!
//! The canteen schema stores meal periods, weekdays and order statuses as
//! localized text shared with the menu-planning and reporting side. Each set is
//! a `DeriveActiveEnum`, so a row holding a value outside the set fails to
//! decode instead of slipping through as an unknown string.

use crate::errors::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Meal period a swipe or reservation belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum Period {
    /// Midday meal
    #[sea_orm(string_value = "午餐")]
    Lunch,
    /// Evening meal
    #[sea_orm(string_value = "晚餐")]
    Dinner,
}

impl Period {
    /// Classifies a local time of day: lunch in `[11:00, 14:00)`, dinner otherwise.
    #[must_use]
    pub fn at(time: NaiveTime) -> Self {
        if (11..14).contains(&time.hour()) {
            Self::Lunch
        } else {
            Self::Dinner
        }
    }

    /// Vocabulary used in cache keys and terminal messages.
    #[must_use]
    pub const fn cache_label(self) -> &'static str {
        match self {
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_label())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from_value(&s.to_string()).map_err(|_| Error::UnknownLabel {
            kind: "period",
            value: s.to_string(),
        })
    }
}

/// Weekday label stored on orders and weekly slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum WeekdayLabel {
    /// Monday
    #[sea_orm(string_value = "周一")]
    Monday,
    /// Tuesday
    #[sea_orm(string_value = "周二")]
    Tuesday,
    /// Wednesday
    #[sea_orm(string_value = "周三")]
    Wednesday,
    /// Thursday
    #[sea_orm(string_value = "周四")]
    Thursday,
    /// Friday
    #[sea_orm(string_value = "周五")]
    Friday,
    /// Saturday; any window may serve a reservation
    #[sea_orm(string_value = "周六")]
    Saturday,
    /// Sunday
    #[sea_orm(string_value = "周日")]
    Sunday,
}

impl WeekdayLabel {
    /// Label for the weekday of `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Lifecycle of an order record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum OrderStatus {
    /// Row exists but no status was ever written
    #[sea_orm(string_value = "")]
    Unset,
    /// Ordered ahead, not yet collected
    #[sea_orm(string_value = "已报餐")]
    Reserved,
    /// Reservation collected at the window
    #[sea_orm(string_value = "已领取")]
    Collected,
    /// Collected without a prior reservation
    #[sea_orm(string_value = "临时用餐")]
    WalkIn,
    /// Reservation never collected; rolled back at day end
    #[sea_orm(string_value = "已过期")]
    Expired,
}

impl OrderStatus {
    /// True once the meal for this order has been handed out.
    #[must_use]
    pub const fn is_consumed(self) -> bool {
        matches!(self, Self::Collected | Self::WalkIn)
    }
}

/// Serving window. Not persisted per order; the weekly slot `remark` column
/// carries it as `套餐A`/`套餐B`/`套餐C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    /// First window, serves lunch and dinner
    A,
    /// Second window, lunch only
    B,
    /// Third window, serves lunch and dinner
    C,
}

impl Window {
    /// Short code used in cache keys and device bindings.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Remark text on the weekly slot rows served by this window.
    #[must_use]
    pub const fn remark(self) -> &'static str {
        match self {
            Self::A => "套餐A",
            Self::B => "套餐B",
            Self::C => "套餐C",
        }
    }

    /// Parses a weekly slot remark back into a window.
    pub fn from_remark(remark: &str) -> Result<Self> {
        match remark.trim() {
            "套餐A" => Ok(Self::A),
            "套餐B" => Ok(Self::B),
            "套餐C" => Ok(Self::C),
            other => Err(Error::UnknownLabel {
                kind: "window remark",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lunch windows, then dinner windows, every day.
pub const SERVED_SLOTS: [(Period, Window); 5] = [
    (Period::Lunch, Window::A),
    (Period::Lunch, Window::B),
    (Period::Lunch, Window::C),
    (Period::Dinner, Window::A),
    (Period::Dinner, Window::C),
];
