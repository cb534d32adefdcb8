//! Building catalog: kind → footprint lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static description of one building kind.
///
/// `width` is the footprint's extent along y, `length` its extent along x.
/// Footprints are never rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDef {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub width: u32,
    pub length: u32,
    pub input_count: u32,
    pub output_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BuildingCatalog {
    defs: BTreeMap<String, BuildingDef>,
}

impl BuildingCatalog {
    /// The machines available in the game today.
    pub fn standard() -> Self {
        Self::from_defs([
            def("filler", "Filling Unit", 3, 6, 6, 6),
            def("grinder", "Grinding Unit", 3, 6, 6, 6),
            def("molder", "Moulding Unit", 3, 3, 3, 3),
            def("refinery", "Refining Unit", 3, 3, 3, 3),
            def("crusher", "Shredding Unit", 3, 3, 3, 3),
        ])
    }

    pub fn from_defs(defs: impl IntoIterator<Item = BuildingDef>) -> Self {
        Self {
            defs: defs.into_iter().map(|d| (d.kind.clone(), d)).collect(),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&BuildingDef> {
        self.defs.get(kind)
    }

    /// All definitions, ordered by kind.
    pub fn all(&self) -> Vec<BuildingDef> {
        self.defs.values().cloned().collect()
    }
}

fn def(kind: &str, name: &str, width: u32, length: u32, inputs: u32, outputs: u32) -> BuildingDef {
    BuildingDef {
        kind: kind.to_string(),
        name: name.to_string(),
        width,
        length,
        input_count: inputs,
        output_count: outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_footprints() {
        let catalog = BuildingCatalog::standard();
        let filler = catalog.get("filler").unwrap();
        assert_eq!((filler.width, filler.length), (3, 6));
        let grinder = catalog.get("grinder").unwrap();
        assert_eq!((grinder.width, grinder.length), (3, 6));
        let crusher = catalog.get("crusher").unwrap();
        assert_eq!((crusher.width, crusher.length), (3, 3));
    }

    #[test]
    fn test_unknown_kind_is_none() {
        let catalog = BuildingCatalog::standard();
        assert!(catalog.get("assembler").is_none());
    }

    #[test]
    fn test_all_is_sorted_by_kind() {
        let kinds: Vec<String> = BuildingCatalog::standard()
            .all()
            .into_iter()
            .map(|d| d.kind)
            .collect();
        assert_eq!(
            kinds,
            vec!["crusher", "filler", "grinder", "molder", "refinery"]
        );
    }
}
