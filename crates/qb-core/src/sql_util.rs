//! SQL string helpers for generated statements

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escape a string for use inside a single-quoted SQL literal
pub fn escape_string_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn quotes_plain_identifier() {
        assert_eq!(quote_identifier("my_db"), "`my_db`");
    }

    #[test]
    fn doubles_embedded_backticks() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_string_literal("it's"), "it''s");
    }
}
