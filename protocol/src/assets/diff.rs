//! Operator-prefixed key lists (`+key` / `-key`) and their inversion.

/// Flip every operator: `+k` becomes `-k` and `-k` becomes `+k`. Entries
/// without an operator are passed through.
pub fn reverse(diff: &[String]) -> Vec<String> {
    diff.iter()
        .map(|entry| {
            if let Some(key) = entry.strip_prefix('+') {
                format!("-{key}")
            } else if let Some(key) = entry.strip_prefix('-') {
                format!("+{key}")
            } else {
                entry.clone()
            }
        })
        .collect()
}

/// Split an entry into its operator and key.
pub fn split(entry: &str) -> Option<(char, &str)> {
    let mut chars = entry.chars();
    let op = chars.next()?;
    Some((op, chars.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_flips_operators() {
        let diff = vec!["+aa".to_string(), "-bb".to_string(), "cc".to_string()];
        assert_eq!(reverse(&diff), vec!["-aa", "+bb", "cc"]);
        assert_eq!(reverse(&reverse(&diff)), diff);
    }

    #[test]
    fn split_separates_operator() {
        assert_eq!(split("+abc"), Some(('+', "abc")));
        assert_eq!(split(""), None);
    }
}
