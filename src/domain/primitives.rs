//! Domain primitives: identifiers, traffic categories and reporting periods.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                $name(id)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Tracker user id.
    UserId
);
numeric_id!(
    /// Tracker campaign id.
    CampaignId
);
numeric_id!(
    /// Tracker offer id.
    OfferId
);
numeric_id!(
    /// Tracker traffic source id.
    TrafficSourceId
);
numeric_id!(
    /// Local test budget id.
    TestId
);
numeric_id!(
    /// Local report id.
    ReportId
);

/// Advertising-channel class. Every money figure is computed per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrafficCategory {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "FPA/HSA/PWA")]
    FpaHsaPwa,
    #[serde(rename = "INAPP traff")]
    Inapp,
    #[serde(rename = "NATIVE traff")]
    Native,
    #[serde(rename = "POP traff")]
    Pop,
    #[serde(rename = "PUSH traff")]
    Push,
    #[serde(rename = "Tik Tok")]
    TikTok,
}

impl TrafficCategory {
    pub const ALL: [TrafficCategory; 7] = [
        TrafficCategory::Admin,
        TrafficCategory::FpaHsaPwa,
        TrafficCategory::Inapp,
        TrafficCategory::Native,
        TrafficCategory::Pop,
        TrafficCategory::Push,
        TrafficCategory::TikTok,
    ];

    /// Tracker-side group name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficCategory::Admin => "ADMIN",
            TrafficCategory::FpaHsaPwa => "FPA/HSA/PWA",
            TrafficCategory::Inapp => "INAPP traff",
            TrafficCategory::Native => "NATIVE traff",
            TrafficCategory::Pop => "POP traff",
            TrafficCategory::Push => "PUSH traff",
            TrafficCategory::TikTok => "Tik Tok",
        }
    }

    /// Parse a tracker group name. Unknown groups yield `None`.
    pub fn parse(group: &str) -> Option<Self> {
        let group = group.trim();
        Self::ALL.into_iter().find(|c| c.as_str() == group)
    }
}

impl fmt::Display for TrafficCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive date range of a reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Period { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// The `days`-long window ending the day before this period starts.
    pub fn lookback(&self, days: i64) -> Period {
        Period {
            start: self.start - chrono::Duration::days(days),
            end: self.start - chrono::Duration::days(1),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Parse an ISO `YYYY-MM-DD` date as stored in the database.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}
