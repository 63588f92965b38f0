use crate::types::{TextChange, TextRange};

/// Smallest single range edit turning `old` into `new`, `None` when equal.
///
/// Common prefix and suffix are trimmed; both cuts land on char boundaries.
pub fn text_change(old: &str, new: &str) -> Option<TextChange> {
    if old == new {
        return None;
    }

    let old_bytes = old.as_bytes();
    let new_bytes = new.as_bytes();

    let mut prefix = old_bytes
        .iter()
        .zip(new_bytes)
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
        prefix -= 1;
    }

    let max_suffix = old.len().min(new.len()) - prefix;
    let mut suffix = old_bytes
        .iter()
        .rev()
        .zip(new_bytes.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix) {
        suffix -= 1;
    }

    Some(TextChange {
        old_range: TextRange::new(prefix, old.len() - suffix),
        new_range: TextRange::new(prefix, new.len() - suffix),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn equal_texts_have_no_change() {
        assert_eq!(text_change("same", "same"), None);
    }

    #[test]
    fn replacement_in_the_middle() {
        let change = text_change("let x = 1;", "let x = 42;").unwrap();
        assert_eq!(change.old_range, TextRange::new(8, 9));
        assert_eq!(change.new_range, TextRange::new(8, 10));
    }

    #[test]
    fn pure_insertion_and_deletion() {
        let insert = text_change("ab", "aXb").unwrap();
        assert_eq!(insert.old_range, TextRange::new(1, 1));
        assert_eq!(insert.new_range, TextRange::new(1, 2));

        let delete = text_change("aXb", "ab").unwrap();
        assert_eq!(delete.old_range, TextRange::new(1, 2));
        assert_eq!(delete.new_range, TextRange::new(1, 1));
    }

    #[test]
    fn repeated_characters_do_not_overlap() {
        let change = text_change("aaa", "aaaa").unwrap();
        assert_eq!(change.old_range, TextRange::new(3, 3));
        assert_eq!(change.new_range, TextRange::new(3, 4));
    }

    #[test]
    fn cuts_respect_char_boundaries() {
        let change = text_change("é", "è").unwrap();
        assert_eq!(change.old_range, TextRange::new(0, 2));
        assert_eq!(change.new_range, TextRange::new(0, 2));
    }
}
