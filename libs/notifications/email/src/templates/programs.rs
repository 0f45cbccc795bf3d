//! Training program catalog used by enrollment emails.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProgramInfo {
    pub name: String,
    pub duration: String,
    pub price: String,
    pub certification: String,
    pub requirements: Vec<String>,
}

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    duration: &'static str,
    price: &'static str,
    certification: &'static str,
    requirements: &'static [&'static str],
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "part-107",
        name: "FAA Part 107 Certification Prep",
        duration: "2 days",
        price: "$499",
        certification: "FAA Part 107 Remote Pilot exam readiness",
        requirements: &["At least 16 years old", "Government-issued photo ID"],
    },
    CatalogEntry {
        id: "aerial-photography",
        name: "Aerial Photography & Videography",
        duration: "3 days",
        price: "$799",
        certification: "Certificate of completion",
        requirements: &["Part 107 certificate or enrollment", "Own drone recommended"],
    },
    CatalogEntry {
        id: "thermal-inspection",
        name: "Thermal Imaging & Inspection",
        duration: "4 days",
        price: "$1,299",
        certification: "Level 1 Thermography for sUAS",
        requirements: &["Part 107 certificate", "20+ logged flight hours"],
    },
    CatalogEntry {
        id: "mapping-surveying",
        name: "Mapping & Surveying",
        duration: "5 days",
        price: "$1,599",
        certification: "Certificate of completion",
        requirements: &[
            "Part 107 certificate",
            "Laptop capable of running photogrammetry software",
        ],
    },
];

/// Look up a program. Unknown ids get a placeholder entry named after the id.
pub fn program_info(program_id: &str) -> ProgramInfo {
    match CATALOG.iter().find(|entry| entry.id == program_id) {
        Some(entry) => ProgramInfo {
            name: entry.name.to_string(),
            duration: entry.duration.to_string(),
            price: entry.price.to_string(),
            certification: entry.certification.to_string(),
            requirements: entry.requirements.iter().map(|r| r.to_string()).collect(),
        },
        None => ProgramInfo {
            name: program_id.to_string(),
            duration: "TBD".to_string(),
            price: "Contact for pricing".to_string(),
            certification: "Certificate of completion".to_string(),
            requirements: Vec::new(),
        },
    }
}

/// Ids of every catalog program.
pub fn program_ids() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|entry| entry.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_program() {
        let info = program_info("part-107");
        assert_eq!(info.name, "FAA Part 107 Certification Prep");
        assert_eq!(info.requirements.len(), 2);
    }

    #[test]
    fn test_unknown_program_defaults() {
        assert_eq!(
            program_info("unknown-program"),
            ProgramInfo {
                name: "unknown-program".to_string(),
                duration: "TBD".to_string(),
                price: "Contact for pricing".to_string(),
                certification: "Certificate of completion".to_string(),
                requirements: vec![],
            }
        );
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut ids: Vec<_> = program_ids().collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
