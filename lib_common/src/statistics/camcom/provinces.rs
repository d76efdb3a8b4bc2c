//! # Province Registry
//!
//! Static lookup of Italian regions, their provinces and the two-letter
//! province codes the statistical API expects. Resolution is tolerant of
//! casing and surrounding whitespace; unknown names fail before any network
//! call is made.

/// Region → provinces → code table. Covers the regions the open-data
/// portal publishes business statistics for.
const REGIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Marche",
        &[
            ("Ancona", "AN"),
            ("Ascoli Piceno", "AP"),
            ("Fermo", "FM"),
            ("Macerata", "MC"),
            ("Pesaro e Urbino", "PU"),
        ],
    ),
    (
        "Veneto",
        &[
            ("Belluno", "BL"),
            ("Padova", "PD"),
            ("Rovigo", "RO"),
            ("Treviso", "TV"),
            ("Venezia", "VE"),
            ("Verona", "VR"),
            ("Vicenza", "VI"),
        ],
    ),
    (
        "Friuli-Venezia Giulia",
        &[
            ("Gorizia", "GO"),
            ("Pordenone", "PN"),
            ("Trieste", "TS"),
            ("Udine", "UD"),
        ],
    ),
    (
        "Lombardia",
        &[
            ("Bergamo", "BG"),
            ("Brescia", "BS"),
            ("Como", "CO"),
            ("Milano", "MI"),
            ("Monza e della Brianza", "MB"),
            ("Pavia", "PV"),
            ("Varese", "VA"),
        ],
    ),
    (
        "Emilia-Romagna",
        &[
            ("Bologna", "BO"),
            ("Ferrara", "FE"),
            ("Modena", "MO"),
            ("Parma", "PR"),
            ("Ravenna", "RA"),
            ("Rimini", "RN"),
        ],
    ),
    (
        "Lazio",
        &[
            ("Frosinone", "FR"),
            ("Latina", "LT"),
            ("Rieti", "RI"),
            ("Roma", "RM"),
            ("Viterbo", "VT"),
        ],
    ),
];

/// Normalizes a province name for lookups and filenames:
/// lowercase, trimmed, inner spaces collapsed to dashes.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// All known regions, in publication order.
pub fn list_regions() -> Vec<&'static str> {
    REGIONS.iter().map(|(region, _)| *region).collect()
}

/// Provinces of `region` as (name, code) pairs, or `None` for an unknown
/// region. Matching is case-insensitive.
pub fn list_provinces(region: &str) -> Option<&'static [(&'static str, &'static str)]> {
    let wanted = region.trim().to_lowercase();
    REGIONS
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted)
        .map(|(_, provinces)| *provinces)
}

/// Two-letter code of `province`, or `None` when unknown.
pub fn province_code(province: &str) -> Option<&'static str> {
    let wanted = normalize_name(province);
    REGIONS
        .iter()
        .flat_map(|(_, provinces)| provinces.iter())
        .find(|(name, _)| normalize_name(name) == wanted)
        .map(|(_, code)| *code)
}

/// Display name (official casing) of `province`, or `None` when unknown.
pub fn province_display_name(province: &str) -> Option<&'static str> {
    let wanted = normalize_name(province);
    REGIONS
        .iter()
        .flat_map(|(_, provinces)| provinces.iter())
        .find(|(name, _)| normalize_name(name) == wanted)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_province_codes() {
        assert_eq!(province_code("venezia"), Some("VE"));
        assert_eq!(province_code("Roma"), Some("RM"));
        assert_eq!(province_code("  TRIESTE  "), Some("TS"));
        assert_eq!(province_code("pesaro e urbino"), Some("PU"));
    }

    #[test]
    fn unknown_province_is_none() {
        assert_eq!(province_code("atlantide"), None);
    }

    #[test]
    fn regions_contain_their_provinces() {
        let veneto = list_provinces("veneto").unwrap();
        assert!(veneto.iter().any(|(name, code)| *name == "Venezia" && *code == "VE"));
        assert!(list_provinces("Marche").is_some());
        assert!(list_provinces("nowhere").is_none());
        assert!(list_regions().contains(&"Veneto"));
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("  Pesaro e Urbino "), "pesaro-e-urbino");
        assert_eq!(normalize_name("VENEZIA"), "venezia");
    }
}
