//! Clarifying questions that name the missing context.

use std::collections::BTreeMap;

use tagscope_models::tag::ScoredCandidate;
use tagscope_models::text::fold;

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn site_list(sites: &BTreeMap<String, String>) -> String {
    sites.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// True when `prefix` (a path up to and including a folder) is a configured
/// site root, or its last segment is a site keyword.
fn is_site_folder(prefix: &[&str], sites: &BTreeMap<String, String>) -> bool {
    let joined = prefix.join("/");
    let last = prefix.last().map(|s| fold(s)).unwrap_or_default();
    sites.iter().any(|(keyword, root)| {
        root.trim_matches('/').eq_ignore_ascii_case(&joined) || fold(keyword) == last
    })
}

/// Question for an empty, tied or low-confidence ranking.
///
/// `site_known` is true when the query already named a site.
pub fn clarifying_question(
    ranked: &[ScoredCandidate],
    sites: &BTreeMap<String, String>,
    site_known: bool,
) -> String {
    match ranked {
        [] => {
            if sites.is_empty() {
                "No matching tags found. Which site and equipment is the measurement on, and what is it called (e.g. speed, temperature)?".to_string()
            } else {
                format!(
                    "No matching tags found. Which site ({}) and which equipment is the measurement on?",
                    site_list(sites)
                )
            }
        }
        [only] => {
            let path = &only.candidate.path;
            if !site_known && !sites.is_empty() {
                format!(
                    "Did you mean '{path}'? Which site is this for ({})?",
                    site_list(sites)
                )
            } else {
                format!("Did you mean '{path}'? Naming the unit or equipment would narrow it down.")
            }
        }
        [first, second, ..] => {
            let a = segments(&first.candidate.path);
            let b = segments(&second.candidate.path);
            let a_folders = a.len().saturating_sub(1);
            let b_folders = b.len().saturating_sub(1);
            let split = a.iter().zip(&b).take_while(|(x, y)| x == y).count();

            if split < a_folders && split < b_folders {
                let (x, y) = (a[split], b[split]);
                if is_site_folder(&a[..=split], sites) || is_site_folder(&b[..=split], sites) {
                    format!("Which site do you mean: {x} or {y}?")
                } else {
                    format!("Which unit or equipment do you mean: {x} or {y}?")
                }
            } else {
                format!(
                    "Which measurement do you mean: {} ({}) or {} ({})? Giving the engineering unit (e.g. rpm, °C, bar) would settle it.",
                    first.candidate.name,
                    first.candidate.path,
                    second.candidate.name,
                    second.candidate.path
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use tagscope_models::tag::TagCandidate;

    fn scored(path: &str, score: f64) -> ScoredCandidate {
        let name = path.rsplit('/').next().unwrap_or(path);
        ScoredCandidate {
            candidate: TagCandidate::new(name, path),
            score,
            matched_terms: BTreeSet::new(),
        }
    }

    fn sites() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("outao".to_string(), "Views/Outao".to_string()),
            ("maceira".to_string(), "Views/Maceira".to_string()),
        ])
    }

    #[test]
    fn asks_for_site_when_sites_differ() {
        let ranked = [
            scored("Views/Outao/Kiln/Speed", 6.0),
            scored("Views/Maceira/Kiln/Speed", 6.0),
        ];
        let q = clarifying_question(&ranked, &sites(), false);
        assert_eq!(q, "Which site do you mean: Outao or Maceira?");
    }

    #[test]
    fn asks_for_unit_when_lines_differ() {
        let ranked = [
            scored("Views/Outao/Line1/Kiln/Speed", 6.0),
            scored("Views/Outao/Line2/Kiln/Speed", 6.0),
        ];
        let q = clarifying_question(&ranked, &sites(), true);
        assert_eq!(q, "Which unit or equipment do you mean: Line1 or Line2?");
    }

    #[test]
    fn asks_for_measurement_when_only_names_differ() {
        let ranked = [
            scored("Views/Outao/Kiln/Speed", 6.0),
            scored("Views/Outao/Kiln/Current", 6.0),
        ];
        let q = clarifying_question(&ranked, &sites(), true);
        assert!(q.starts_with("Which measurement do you mean: Speed"));
        assert!(q.contains("engineering unit"));
    }

    #[test]
    fn empty_ranking_lists_known_sites() {
        let q = clarifying_question(&[], &sites(), false);
        assert!(q.contains("maceira, outao"));
        let q = clarifying_question(&[], &BTreeMap::new(), false);
        assert!(q.contains("Which site and equipment"));
    }

    #[test]
    fn single_weak_match_asks_for_missing_site() {
        let ranked = [scored("Views/Outao/Kiln/Speed", 2.0)];
        assert!(clarifying_question(&ranked, &sites(), false).contains("Which site"));
        assert!(clarifying_question(&ranked, &sites(), true).contains("unit or equipment"));
    }
}
