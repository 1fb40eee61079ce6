/// Levenshtein distance between two strings, counted in characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Edit distance divided by the reference length in characters.
/// `None` when the reference is empty.
pub fn normalized_edit_distance(prediction: &str, reference: &str) -> Option<f64> {
    let len = reference.chars().count();
    if len == 0 {
        return None;
    }
    Some(edit_distance(prediction, reference) as f64 / len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("flaw", "lawn"), 2);
        assert_eq!(edit_distance("héllo", "hello"), 1);
    }

    #[test]
    fn test_normalized_edit_distance() {
        assert_eq!(normalized_edit_distance("cat", "cat"), Some(0.0));
        let value = normalized_edit_distance("cat", "bat").unwrap();
        assert!((value - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(normalized_edit_distance("cat", ""), None);
    }
}
