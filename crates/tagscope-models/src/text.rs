//! Text normalization shared by the catalog loader, catalog search and the resolver.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase and fold accented characters to their base letters.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split `MainDrive` into `Main Drive`. Acronym runs stay together (`RPMValue` -> `RPM Value`).
fn split_camel(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || (prev.is_uppercase() && next_lower) {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

/// Normalize free text into match tokens: camel-case split, lowercase, accent fold,
/// separators (`_ / - . :`) become spaces, remaining punctuation is dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = fold(&split_camel(text));
    let cleaned: String = folded
        .chars()
        .filter_map(|c| match c {
            '_' | '/' | '-' | '.' | ':' | '\\' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Flattened, normalized text stored alongside each catalog row.
pub fn search_text(name: &str, path: &str, description: Option<&str>) -> String {
    let mut tokens = tokenize(name);
    tokens.extend(tokenize(path));
    if let Some(description) = description {
        tokens.extend(tokenize(description));
    }
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_case() {
        assert_eq!(fold("Outão Forno Temperatura"), "outao forno temperatura");
        assert_eq!(fold("Pressão"), "pressao");
    }

    #[test]
    fn tokenizes_underscores_and_punctuation() {
        assert_eq!(tokenize("kiln_main-drive, speed!"), vec!["kiln", "main", "drive", "speed"]);
    }

    #[test]
    fn splits_camel_case_but_keeps_acronyms() {
        assert_eq!(tokenize("MainDrive"), vec!["main", "drive"]);
        assert_eq!(tokenize("RPM"), vec!["rpm"]);
        assert_eq!(tokenize("RPMValue"), vec!["rpm", "value"]);
        assert_eq!(tokenize("Line1"), vec!["line1"]);
    }

    #[test]
    fn search_text_covers_all_fields() {
        let text = search_text(
            "Speed",
            "Views/Outao/Line1/Kiln/MainDrive/Speed",
            Some("Velocidade do motor"),
        );
        assert_eq!(
            text,
            "speed views outao line1 kiln main drive speed velocidade do motor"
        );
    }
}
