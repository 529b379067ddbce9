//! Name-based join key discovery between a fact table and its dimensions.
//!
//! Provider exports do not declare relations. A dimension named `Perioden` is
//! referenced by a fact column of the same name; a dimension whose name contains
//! spaces is referenced by the same name with the spaces removed. The dimension side
//! of the join is the first present column of [`PRIMARY_KEY_CANDIDATES`].

/// Dimension columns tried, in order, as the join target.
pub const PRIMARY_KEY_CANDIDATES: [&str; 4] = ["Key", "DimensionKey", "ID", "Code"];

/// Finds the fact column referencing the dimension called `short_name`.
///
/// Exact equality wins over the whitespace-insensitive fallback, whatever the
/// column order.
pub fn match_foreign_key<'a, S: AsRef<str>>(
    short_name: &str,
    fact_columns: &'a [S],
) -> Option<&'a str> {
    if let Some(exact) = fact_columns.iter().find(|c| c.as_ref() == short_name) {
        return Some(exact.as_ref());
    }

    let squashed: String = short_name.chars().filter(|c| !c.is_whitespace()).collect();
    if squashed.is_empty() {
        return None;
    }
    fact_columns
        .iter()
        .find(|c| c.as_ref() == squashed)
        .map(AsRef::as_ref)
}

/// Finds the join column of a dimension table.
pub fn match_primary_key<'a, S: AsRef<str>>(dimension_columns: &'a [S]) -> Option<&'a str> {
    PRIMARY_KEY_CANDIDATES.iter().find_map(|candidate| {
        dimension_columns
            .iter()
            .find(|c| c.as_ref() == *candidate)
            .map(AsRef::as_ref)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACT: [&str; 6] = [
        "bronze_pk",
        "ID",
        "BedrijfskenmerkenSBI2008",
        "Perioden",
        "Ziekteverzuimpercentage_1",
        "_source_file",
    ];

    #[test]
    fn test_foreign_key_exact_match() {
        assert_eq!(match_foreign_key("Perioden", &FACT), Some("Perioden"));
        assert_eq!(
            match_foreign_key("BedrijfskenmerkenSBI2008", &FACT),
            Some("BedrijfskenmerkenSBI2008")
        );
    }

    #[test]
    fn test_foreign_key_whitespace_fallback() {
        assert_eq!(
            match_foreign_key("Bedrijfskenmerken SBI2008", &FACT),
            Some("BedrijfskenmerkenSBI2008")
        );
        assert_eq!(match_foreign_key(" Perioden\t", &FACT), Some("Perioden"));
    }

    #[test]
    fn test_foreign_key_exact_beats_fallback() {
        let cols = ["RegioS", "Regio S"];
        assert_eq!(match_foreign_key("Regio S", &cols), Some("Regio S"));

        let cols = ["Regio S", "RegioS"];
        assert_eq!(match_foreign_key("RegioS", &cols), Some("RegioS"));
    }

    #[test]
    fn test_foreign_key_is_case_sensitive() {
        assert_eq!(match_foreign_key("perioden", &FACT), None);
    }

    #[test]
    fn test_foreign_key_no_match() {
        assert_eq!(match_foreign_key("CategoryGroups", &FACT), None);
        assert_eq!(match_foreign_key("", &FACT), None);
        assert_eq!(match_foreign_key("   ", &FACT), None);
        assert_eq!(match_foreign_key::<&str>("Perioden", &[]), None);
    }

    #[test]
    fn test_foreign_key_accepts_owned_strings() {
        let cols: Vec<String> = FACT.iter().map(|c| (*c).to_owned()).collect();
        assert_eq!(match_foreign_key("Perioden", &cols), Some("Perioden"));
    }

    #[test]
    fn test_primary_key_candidate_order() {
        assert_eq!(match_primary_key(&["ID", "Key", "Title"]), Some("Key"));
        assert_eq!(match_primary_key(&["ID", "DimensionKey"]), Some("DimensionKey"));
        assert_eq!(match_primary_key(&["Code", "ID"]), Some("ID"));
        assert_eq!(match_primary_key(&["Title", "Code"]), Some("Code"));
    }

    #[test]
    fn test_primary_key_missing() {
        assert_eq!(match_primary_key(&["Title", "Description"]), None);
        assert_eq!(match_primary_key(&["key", "id"]), None);
        assert_eq!(match_primary_key::<&str>(&[]), None);
    }
}
