// Array scope - which catalog entries belong to one monitoring array
use crate::domain::coverage::ParameterKey;
use serde::Deserialize;

fn default_skip_methods() -> Vec<String> {
    vec!["recovered".to_string()]
}

/// One portal catalog export and the refdes filters applied to it
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CatalogSource {
    pub code: String,
    /// Keep only refdes containing one of these, when non-empty
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl CatalogSource {
    pub fn admits(&self, refdes: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| refdes.contains(p.as_str()));
        let excluded = self.exclude.iter().any(|p| refdes.contains(p.as_str()));
        included && !excluded
    }

    /// Whether a refdes from anywhere belongs to this catalog's share
    pub fn claims(&self, refdes: &str) -> bool {
        refdes.starts_with(&self.code) && self.admits(refdes)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ArrayScope {
    pub name: String,
    pub catalogs: Vec<CatalogSource>,
    /// Methods containing any of these substrings are not monitored
    #[serde(default = "default_skip_methods")]
    pub skip_methods: Vec<String>,
}

impl ArrayScope {
    pub fn monitors_method(&self, method: &str) -> bool {
        !self.skip_methods.iter().any(|m| method.contains(m.as_str()))
    }

    /// Filter the entries of one catalog down to this array's share
    pub fn select(&self, catalog: &CatalogSource, entries: Vec<ParameterKey>) -> Vec<ParameterKey> {
        entries
            .into_iter()
            .filter(|e| catalog.admits(&e.refdes) && self.monitors_method(&e.method))
            .collect()
    }

    pub fn claims(&self, refdes: &str) -> bool {
        self.catalogs.iter().any(|c| c.claims(refdes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CABLED: [&str; 3] = ["CE02SHBP", "CE04OSBP", "CE04OSPS"];

    fn cabled() -> Vec<String> {
        CABLED.iter().map(|s| s.to_string()).collect()
    }

    fn rs_scope() -> ArrayScope {
        ArrayScope {
            name: "RS".to_string(),
            catalogs: vec![
                CatalogSource {
                    code: "RS".to_string(),
                    include: vec![],
                    exclude: vec![],
                },
                CatalogSource {
                    code: "CE".to_string(),
                    include: cabled(),
                    exclude: vec![],
                },
            ],
            skip_methods: default_skip_methods(),
        }
    }

    #[test]
    fn test_cabled_split() {
        let ce = CatalogSource {
            code: "CE".to_string(),
            include: vec![],
            exclude: cabled(),
        };
        assert!(ce.admits("CE01ISSM-MFD35-02-PRESFA000"));
        assert!(!ce.admits("CE04OSPS-SF01B-2A-CTDPFA107"));

        let rs = rs_scope();
        assert!(rs.claims("CE04OSPS-SF01B-2A-CTDPFA107"));
        assert!(rs.claims("RS01SBPS-PC01A-4A-CTDPFA103"));
        assert!(!rs.claims("CE01ISSM-MFD35-02-PRESFA000"));
    }

    #[test]
    fn test_select_skips_recovered_methods() {
        let scope = rs_scope();
        let entries = vec![
            ParameterKey::new("CE04OSPS-SF01B-2A-CTDPFA107", "streamed", "ctdpf_sbe43_sample", "seawater_temperature"),
            ParameterKey::new("CE04OSPS-SF01B-2A-CTDPFA107", "recovered_inst", "ctdpf_inst", "seawater_temperature"),
            ParameterKey::new("CE01ISSM-MFD35-02-PRESFA000", "telemetered", "presf_dcl", "absolute_pressure"),
        ];

        let selected = scope.select(&scope.catalogs[1], entries);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].method, "streamed");
    }

    #[test]
    fn test_deserialize_defaults() {
        let scope: ArrayScope = serde_json::from_str(r#"{ "name": "GA", "catalogs": [{ "code": "GA" }] }"#).unwrap();
        assert_eq!(scope.skip_methods, vec!["recovered".to_string()]);
        assert!(scope.catalogs[0].include.is_empty());
    }
}
