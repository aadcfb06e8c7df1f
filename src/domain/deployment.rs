// Deployment domain model - when an instrument was in the water
use chrono::{DateTime, Duration, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub refdes: String,
    pub number: u32,
    pub start: DateTime<Utc>,
    /// `None` while the instrument is still deployed
    pub end: Option<DateTime<Utc>>,
}

impl Deployment {
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Calendar days of the deployment: one per whole day elapsed, counted
    /// from the start date. An open deployment runs until `now`.
    pub fn days(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let end = self.end.unwrap_or(now);
        let start = self.start.date_naive();
        (0..(end - self.start).num_days())
            .map(|offset| start + Duration::days(offset))
            .collect()
    }
}
