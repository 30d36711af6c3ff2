//! FTS query sanitization
//!
//! Caller-provided free text becomes a sequence of quoted tokens, so
//! FTS5 operators (AND, OR, NOT, NEAR, quotes, asterisks, parens)
//! cannot alter query semantics. A degenerate query yields an empty
//! string, which the lexical search treats as "no results".

/// Translate free text into a safe FTS5 match expression.
///
/// Tokens are OR-joined: any matching term qualifies a chunk and BM25
/// rewards the ones matching more of them. Bare space-joined terms
/// would demand every term, which starves recall on natural-language
/// queries.
pub fn sanitize_fts_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    tokens.join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_quoted() {
        assert_eq!(
            sanitize_fts_query("quick brown fox"),
            "\"quick\" OR \"brown\" OR \"fox\""
        );
    }

    #[test]
    fn test_operators_neutralized() {
        assert_eq!(
            sanitize_fts_query("cats AND dogs NOT birds"),
            "\"cats\" OR \"AND\" OR \"dogs\" OR \"NOT\" OR \"birds\""
        );
        assert_eq!(
            sanitize_fts_query("a NEAR(b, 2)"),
            "\"a\" OR \"NEAR\" OR \"b\" OR \"2\""
        );
    }

    #[test]
    fn test_quotes_and_wildcards_removed() {
        assert_eq!(
            sanitize_fts_query("\"phrase*\" -excl"),
            "\"phrase\" OR \"excl\""
        );
        assert_eq!(sanitize_fts_query("col:value"), "\"col\" OR \"value\"");
    }

    #[test]
    fn test_degenerate_queries_empty() {
        assert_eq!(sanitize_fts_query(""), "");
        assert_eq!(sanitize_fts_query("  ***  \"\" () "), "");
    }

    #[test]
    fn test_unicode_tokens_kept() {
        assert_eq!(sanitize_fts_query("héllo wörld"), "\"héllo\" OR \"wörld\"");
    }
}
