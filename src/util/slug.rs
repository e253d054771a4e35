//! Slug generation for tables, companies and products

/// Fold the accented Latin letters used in Portuguese to ASCII.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'É' | 'È' | 'Ê' | 'Ë' => "E",
        'í' | 'ì' | 'î' | 'ï' => "i",
        'Í' | 'Ì' | 'Î' | 'Ï' => "I",
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => "o",
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => "O",
        'ú' | 'ù' | 'û' | 'ü' => "u",
        'Ú' | 'Ù' | 'Û' | 'Ü' => "U",
        'ç' => "c",
        'Ç' => "C",
        'ñ' => "n",
        'Ñ' => "N",
        _ => return None,
    };
    Some(folded)
}

fn to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else if let Some(folded) = fold_char(c) {
            out.push_str(folded);
        }
    }
    out
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Generate a display slug.
///
/// Purely numeric names become `Mesa-NN` (`"1"` → `"Mesa-01"`). Anything
/// else is split on whitespace, `_` and `-`, each part capitalized and
/// joined with `-` (`"Balcão 1"` → `"Balcao-1"`).
pub fn generate_slug(text: &str) -> String {
    let ascii = to_ascii(text);
    let trimmed = ascii.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let digits: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.chars().all(|c| c.is_ascii_digit()) {
        return format!("Mesa-{:0>2}", digits);
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-') || c.is_whitespace())
        .collect();

    cleaned
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("-")
}

/// Lowercase slug used for product and company URLs
pub fn url_slug(text: &str) -> String {
    generate_slug(text).to_lowercase()
}
