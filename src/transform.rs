use indexmap::IndexMap;

use crate::dataset::{Dataset, Facility, Market, RawCard, RawDataset};

pub const UNKNOWN: &str = "Unknown";

/// Reshape a raw scraped dump into the normalized dataset schema.
///
/// Market keys come from the first line of the raw key, trimmed. Duplicate
/// trimmed keys collapse onto one market (last write wins). A market whose
/// `facilities` is not an array gets an empty facilities mapping.
pub fn transform(raw: &RawDataset) -> Dataset {
    let mut markets = IndexMap::new();

    for (raw_key, raw_market) in &raw.markets {
        let name = raw_key.split('\n').next().unwrap_or("").trim().to_string();

        let cards: Vec<RawCard> = match raw_market.facilities.as_array() {
            Some(items) => items
                .iter()
                .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
                .collect(),
            None => Vec::new(),
        };

        markets.insert(
            name.clone(),
            Market {
                name,
                link: raw_market.link.clone(),
                completed: raw_market.completed,
                facilities: facilities_from_cards(&cards),
            },
        );
    }

    Dataset { markets }
}

/// Key scraped cards as `facility_1`, `facility_2`, ... in scrape order.
pub fn facilities_from_cards(cards: &[RawCard]) -> IndexMap<String, Facility> {
    cards
        .iter()
        .enumerate()
        .map(|(i, card)| (format!("facility_{}", i + 1), facility_from_card(card)))
        .collect()
}

pub fn facility_from_card(card: &RawCard) -> Facility {
    let (name, address, description) = parse_facility_text(&card.text);
    Facility {
        name,
        address,
        description,
        url: card.url.clone().unwrap_or_default(),
        table_info: IndexMap::new(),
    }
}

/// Split a card's visible text into (name, address, description).
///
/// First line is the name, last line the description, everything strictly
/// between joined by ", " is the address. Missing pieces become "Unknown";
/// a block under two lines has no description, under three no address.
pub fn parse_facility_text(text: &str) -> (String, String, String) {
    let lines: Vec<&str> = text.split('\n').map(str::trim).collect();

    let name = match lines.first() {
        Some(l) if !l.is_empty() => l.to_string(),
        _ => UNKNOWN.to_string(),
    };

    let description = match lines.last() {
        Some(l) if lines.len() >= 2 && !l.is_empty() => l.to_string(),
        _ => UNKNOWN.to_string(),
    };

    let address = if lines.len() >= 3 {
        let middle = lines[1..lines.len() - 1].join(", ");
        if middle.is_empty() {
            UNKNOWN.to_string()
        } else {
            middle
        }
    } else {
        UNKNOWN.to_string()
    };

    (name, address, description)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawDataset {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn three_line_block() {
        let (name, address, description) =
            parse_facility_text("Bldg 1\n123 Main St\nData center");
        assert_eq!(name, "Bldg 1");
        assert_eq!(address, "123 Main St");
        assert_eq!(description, "Data center");
    }

    #[test]
    fn middle_lines_join_with_comma() {
        let (_, address, _) =
            parse_facility_text("Bldg 2\n456 Oak Ave\nSuite 100\nDallas TX\nColocation");
        assert_eq!(address, "456 Oak Ave, Suite 100, Dallas TX");
    }

    #[test]
    fn one_line_block() {
        let (name, address, description) = parse_facility_text("Bldg 1");
        assert_eq!(name, "Bldg 1");
        assert_eq!(address, UNKNOWN);
        assert_eq!(description, UNKNOWN);
    }

    #[test]
    fn two_line_block() {
        let (name, address, description) = parse_facility_text("Bldg 1\nData center");
        assert_eq!(name, "Bldg 1");
        assert_eq!(address, UNKNOWN);
        assert_eq!(description, "Data center");
    }

    #[test]
    fn empty_text() {
        let (name, address, description) = parse_facility_text("");
        assert_eq!(name, UNKNOWN);
        assert_eq!(address, UNKNOWN);
        assert_eq!(description, UNKNOWN);
    }

    #[test]
    fn lines_are_trimmed() {
        let (name, address, description) =
            parse_facility_text("  Bldg 1  \n  123 Main St  \n  Data center  ");
        assert_eq!(name, "Bldg 1");
        assert_eq!(address, "123 Main St");
        assert_eq!(description, "Data center");
    }

    #[test]
    fn trailing_newline_blanks_description() {
        // A trailing empty line is the "last line", so there is no description.
        let (name, address, description) = parse_facility_text("Bldg 1\n123 Main St\n");
        assert_eq!(name, "Bldg 1");
        assert_eq!(address, "123 Main St");
        assert_eq!(description, UNKNOWN);
    }

    #[test]
    fn end_to_end_shape() {
        let input = raw(
            r#"{"markets":{"Market A\nextra":{"link":"http://x","completed":false,"facilities":[{"text":"Bldg 1\n123 Main St\nData center","url":"http://x/1"}]}}}"#,
        );
        let out = serde_json::to_value(transform(&input)).unwrap();
        let expected: serde_json::Value = serde_json::from_str(
            r#"{"markets":{"Market A":{"name":"Market A","link":"http://x","completed":false,"facilities":{"facility_1":{"name":"Bldg 1","address":"123 Main St","description":"Data center","url":"http://x/1","table_info":{}}}}}}"#,
        )
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn market_key_is_first_line_trimmed() {
        let input = raw(
            r#"{"markets":{"  Phoenix  \n42 facilities":{"link":"http://x/phx","completed":true,"facilities":[]}}}"#,
        );
        let data = transform(&input);
        let market = &data.markets["Phoenix"];
        assert_eq!(market.name, "Phoenix");
        assert!(market.completed);
        assert!(market.facilities.is_empty());
    }

    #[test]
    fn duplicate_trimmed_keys_collapse() {
        let input = raw(
            r#"{"markets":{"Austin\nold":{"link":"http://x/a","completed":false,"facilities":[]},"Austin\nnew":{"link":"http://x/b","completed":true,"facilities":[]}}}"#,
        );
        let data = transform(&input);
        assert_eq!(data.markets.len(), 1);
        assert_eq!(data.markets["Austin"].link, "http://x/b");
    }

    #[test]
    fn non_array_facilities_yields_empty_mapping() {
        let input = raw(
            r#"{"markets":{"Boise":{"link":"http://x/boise","completed":false,"facilities":{"facility_1":{}}}}}"#,
        );
        let data = transform(&input);
        assert!(data.markets["Boise"].facilities.is_empty());
    }

    #[test]
    fn missing_url_defaults_to_empty() {
        let input = raw(
            r#"{"markets":{"Omaha":{"link":"http://x/o","completed":false,"facilities":[{"text":"Bldg"}]}}}"#,
        );
        let data = transform(&input);
        assert_eq!(data.markets["Omaha"].facilities["facility_1"].url, "");
    }

    #[test]
    fn card_without_text_degrades_to_unknown() {
        let input = raw(
            r#"{"markets":{"Tulsa":{"link":"http://x/t","completed":false,"facilities":[{"url":"http://x/t/1"}]}}}"#,
        );
        let data = transform(&input);
        let f = &data.markets["Tulsa"].facilities["facility_1"];
        assert_eq!(f.name, UNKNOWN);
        assert_eq!(f.url, "http://x/t/1");
    }

    #[test]
    fn rerun_on_own_output_does_not_crash() {
        // Not a round trip: facilities is an object in the output, which the
        // raw shape treats as non-array, so every market comes back empty.
        let input = raw(
            r#"{"markets":{"Market A\nextra":{"link":"http://x","completed":false,"facilities":[{"text":"Bldg 1\n123 Main St\nData center","url":"http://x/1"}]}}}"#,
        );
        let first = transform(&input);
        let json = serde_json::to_string(&first).unwrap();
        let second = transform(&raw(&json));
        assert_eq!(second.markets.len(), 1);
        assert!(second.markets["Market A"].facilities.is_empty());
    }
}
