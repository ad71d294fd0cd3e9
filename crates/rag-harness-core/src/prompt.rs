//! Prompt composition.

use crate::models::SearchHit;

/// Build the model prompt for `query` given the retrieved `hits`.
///
/// With no hits the query is returned unchanged. Otherwise the hit contents
/// are joined with newlines, in ranked order, under a `Context:` header and
/// followed by the query and a `Response:` cue.
pub fn compose(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return query.to_string();
    }

    let context = hits
        .iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!("Context:\n{}\n\nQuery: {}\n\nResponse:", context, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str, score: f64) -> SearchHit {
        SearchHit {
            id: format!("id-{}", score),
            title: String::new(),
            content: content.to_string(),
            score,
        }
    }

    #[test]
    fn test_no_hits_passes_query_through() {
        assert_eq!(compose("What is AI?", &[]), "What is AI?");
    }

    #[test]
    fn test_single_hit() {
        let prompt = compose("What is AI?", &[hit("AI is a field.", 1.0)]);
        assert_eq!(
            prompt,
            "Context:\nAI is a field.\n\nQuery: What is AI?\n\nResponse:"
        );
    }

    #[test]
    fn test_hits_joined_in_ranked_order() {
        let hits = vec![hit("first", 3.0), hit("second", 2.0), hit("third", 1.0)];
        let prompt = compose("q", &hits);
        assert_eq!(prompt, "Context:\nfirst\nsecond\nthird\n\nQuery: q\n\nResponse:");
    }

    #[test]
    fn test_deterministic() {
        let hits = vec![hit("a", 2.0), hit("b", 1.0)];
        assert_eq!(compose("q", &hits), compose("q", &hits));
    }
}
