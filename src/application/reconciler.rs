// Annotation reconciler - splits absences into explained and unexplained
use crate::domain::annotation::Annotation;
use crate::domain::snapshot::LevelKey;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<K: Ord> {
    /// Absent keys covered by a not-operational annotation, with the scope
    /// of the most specific matching annotation
    pub explained: BTreeMap<K, String>,
    pub unexplained: BTreeSet<K>,
    /// Present keys that still carry a not-operational annotation
    pub contradicted: BTreeMap<K, String>,
}

fn most_specific<'a>(relevant: &[&'a Annotation], refdes: &str) -> Option<&'a Annotation> {
    relevant
        .iter()
        .copied()
        .filter(|a| a.covers(refdes))
        .max_by(|a, b| {
            a.specificity()
                .cmp(&b.specificity())
                .then_with(|| b.scope().cmp(&a.scope()))
        })
}

/// Reconcile one level. `present` should hold only expected keys.
pub fn reconcile<K: LevelKey>(
    absent: &BTreeSet<K>,
    present: &BTreeSet<K>,
    annotations: &[Annotation],
) -> Reconciliation<K> {
    let relevant: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| a.marks_not_operational())
        .collect();

    let mut explained = BTreeMap::new();
    let mut unexplained = BTreeSet::new();
    for key in absent {
        match most_specific(&relevant, key.refdes()) {
            Some(annotation) => {
                explained.insert(key.clone(), annotation.scope());
            }
            None => {
                unexplained.insert(key.clone());
            }
        }
    }

    let contradicted = present
        .iter()
        .filter(|k| !absent.contains(*k))
        .filter_map(|k| most_specific(&relevant, k.refdes()).map(|a| (k.clone(), a.scope())))
        .collect();

    Reconciliation {
        explained,
        unexplained,
        contradicted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::annotation::NOT_OPERATIONAL;
    use crate::domain::coverage::{InstrumentKey, StreamKey};
    use chrono::Utc;

    fn annotation(subsite: &str, platform: Option<&str>, sensor: Option<&str>) -> Annotation {
        Annotation {
            subsite: subsite.to_string(),
            platform: platform.map(str::to_string),
            sensor: sensor.map(str::to_string),
            flag: NOT_OPERATIONAL.to_string(),
            end_time: None,
        }
    }

    #[test]
    fn test_subsite_annotation_explains_absence() {
        let absent = BTreeSet::from([
            StreamKey::new("CE01ISSM-MFD35-02-PRESFA000", "telemetered", "presf_dcl"),
            StreamKey::new("CE02SHSM-RID27-03-CTDBPC000", "telemetered", "ctdbp_dcl"),
        ]);
        let annotations = vec![annotation("CE01", None, None)];

        let result = reconcile(&absent, &BTreeSet::new(), &annotations);
        assert_eq!(result.explained.len(), 1);
        assert_eq!(
            result.explained.values().next().map(String::as_str),
            Some("CE01")
        );
        assert_eq!(
            result.unexplained,
            BTreeSet::from([StreamKey::new(
                "CE02SHSM-RID27-03-CTDBPC000",
                "telemetered",
                "ctdbp_dcl"
            )])
        );
    }

    #[test]
    fn test_most_specific_scope_reported() {
        let absent = BTreeSet::from([InstrumentKey::new("CE01ISSM-MFD35-02-PRESFA000")]);
        let annotations = vec![
            annotation("CE01ISSM", None, None),
            annotation("CE01ISSM", Some("MFD35"), Some("02-PRESFA000")),
            annotation("CE01ISSM", Some("MFD35"), None),
        ];

        let result = reconcile(&absent, &BTreeSet::new(), &annotations);
        assert_eq!(
            result.explained.get(&InstrumentKey::new("CE01ISSM-MFD35-02-PRESFA000")),
            Some(&"CE01ISSM-MFD35-02-PRESFA000".to_string())
        );
    }

    #[test]
    fn test_closed_or_other_flags_ignored() {
        let absent = BTreeSet::from([InstrumentKey::new("CE01ISSM-MFD35-02-PRESFA000")]);
        let mut closed = annotation("CE01ISSM", None, None);
        closed.end_time = Some(Utc::now());
        let mut suspect = annotation("CE01ISSM", None, None);
        suspect.flag = "suspect".to_string();

        let result = reconcile(&absent, &BTreeSet::new(), &[closed, suspect]);
        assert!(result.explained.is_empty());
        assert_eq!(result.unexplained, absent);
    }

    #[test]
    fn test_contradicted_annotation_on_producing_instrument() {
        let present = BTreeSet::from([
            InstrumentKey::new("RS01SBPS-PC01A-4A-CTDPFA103"),
            InstrumentKey::new("RS03AXPS-PC03A-4A-CTDPFA303"),
        ]);
        let annotations = vec![annotation("RS01SBPS", Some("PC01A"), None)];

        let result = reconcile(&BTreeSet::new(), &present, &annotations);
        assert_eq!(
            result.contradicted.keys().collect::<Vec<_>>(),
            vec![&InstrumentKey::new("RS01SBPS-PC01A-4A-CTDPFA103")]
        );
        assert!(result.explained.is_empty());
        assert!(result.unexplained.is_empty());
    }
}
