// Operator annotation domain model
use chrono::{DateTime, Utc};

pub const NOT_OPERATIONAL: &str = "not_operational";

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub subsite: String,
    pub platform: Option<String>,
    pub sensor: Option<String>,
    pub flag: String,
    pub end_time: Option<DateTime<Utc>>,
}

impl Annotation {
    /// Open-ended `not_operational` annotations are the only ones that
    /// explain an absence
    pub fn marks_not_operational(&self) -> bool {
        self.end_time.is_none() && self.flag == NOT_OPERATIONAL
    }

    /// Refdes prefix covered by this annotation: subsite, subsite-platform
    /// or the full instrument id
    pub fn scope(&self) -> String {
        let mut scope = self.subsite.clone();
        if let Some(platform) = &self.platform {
            scope.push('-');
            scope.push_str(platform);
            if let Some(sensor) = &self.sensor {
                scope.push('-');
                scope.push_str(sensor);
            }
        }
        scope
    }

    /// Number of scope components, larger is more specific
    pub fn specificity(&self) -> usize {
        match (&self.platform, &self.sensor) {
            (Some(_), Some(_)) => 3,
            (Some(_), None) => 2,
            _ => 1,
        }
    }

    pub fn covers(&self, refdes: &str) -> bool {
        refdes.starts_with(&self.scope())
    }
}
