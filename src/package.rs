use std::collections::BTreeSet;

const FULL_WIDTH_SEPARATORS: [char; 3] = ['，', '；', '｜'];

fn is_separator(c: char) -> bool {
    matches!(c, ',' | ';' | '|') || c.is_whitespace() || FULL_WIDTH_SEPARATORS.contains(&c)
}

/// Splits a list of names without validating them. Order is kept, blanks are dropped.
pub fn split_names(input: &str) -> Vec<String> {
    input
        .split(is_separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts the valid package names of a single separated list.
///
/// Names are trimmed and de-duplicated. A name with any invalid segment is
/// dropped whole. Blank input gives an empty set.
pub fn extract_package(input: &str) -> BTreeSet<String> {
    split_names(input)
        .into_iter()
        .filter(|name| is_valid_package_name(name))
        .collect()
}

pub fn extract_packages<S: AsRef<str>>(inputs: &[S]) -> BTreeSet<String> {
    inputs
        .iter()
        .flat_map(|input| extract_package(input.as_ref()))
        .collect()
}

pub fn is_valid_package_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }

    name.split('.').all(|segment| {
        !segment.is_empty()
            && !segment.starts_with(|c: char| c.is_ascii_digit())
            && !segment.contains('-')
    })
}

pub fn package_path(name: &str) -> String {
    name.replace('.', "/")
}
