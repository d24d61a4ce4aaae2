//! Keyword and similarity search over indexed code elements.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{IndexError, IndexResult};
use crate::indexer::embedding::cosine_similarity;
use crate::models::{CodeElement, SemanticIndex};
use crate::query::guards::truncate_query;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_$]+").unwrap());

const NAME_SCORE: f32 = 10.0;
const SIGNATURE_TOKEN_SCORE: f32 = 5.0;
const TAG_TOKEN_SCORE: f32 = 3.0;

/// An element with the score it was ranked by.
#[derive(Clone, Copy, Debug)]
pub struct Ranked<'a> {
    pub element: &'a CodeElement,
    pub score: f32,
}

fn tokens(value: &str) -> BTreeSet<String> {
    TOKEN_RE
        .find_iter(value)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Score one element against a normalised (lowercased) query.
pub fn keyword_score(query: &str, query_tokens: &BTreeSet<String>, element: &CodeElement) -> f32 {
    let mut score = 0.0;
    let name = element.name.to_lowercase();
    if name.contains(query) {
        score += NAME_SCORE;
    }
    let signature = element.signature.to_lowercase();
    let tags: Vec<String> = element.semantic_tags.iter().map(|t| t.to_lowercase()).collect();
    for token in query_tokens {
        if signature.contains(token.as_str()) {
            score += SIGNATURE_TOKEN_SCORE;
        }
        if tags.iter().any(|tag| tag.contains(token.as_str())) {
            score += TAG_TOKEN_SCORE;
        }
    }
    score
}

fn rank_order(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.element.file_path.cmp(&b.element.file_path))
        .then_with(|| a.element.start_line.cmp(&b.element.start_line))
        .then_with(|| a.element.id.cmp(&b.element.id))
}

/// Top `limit` elements by keyword score. Elements scoring zero are not
/// returned; an empty query or a zero limit matches nothing.
pub fn keyword_search<'a>(
    elements: impl IntoIterator<Item = &'a CodeElement>,
    query: &str,
    limit: usize,
) -> Vec<Ranked<'a>> {
    let query = truncate_query(query).to_lowercase();
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }
    let query_tokens = tokens(&query);
    let mut ranked: Vec<Ranked<'a>> = elements
        .into_iter()
        .map(|element| Ranked {
            element,
            score: keyword_score(&query, &query_tokens, element),
        })
        .filter(|r| r.score > 0.0)
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(limit);
    ranked
}

/// Top `limit` elements by cosine similarity to `element_id`, excluding
/// the element itself.
pub fn similar_elements<'a>(
    index: &'a SemanticIndex,
    element_id: &str,
    limit: usize,
) -> IndexResult<Vec<Ranked<'a>>> {
    let target = index
        .embeddings
        .get(element_id)
        .filter(|_| index.elements.contains_key(element_id))
        .ok_or_else(|| IndexError::UnknownElement(element_id.to_string()))?;
    let mut ranked: Vec<Ranked<'a>> = index
        .elements
        .values()
        .filter(|e| e.id != element_id)
        .filter_map(|element| {
            let vector = index.embeddings.get(&element.id)?;
            Some(Ranked {
                element,
                score: cosine_similarity(target, vector),
            })
        })
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(limit);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::embedding::embed_signature;
    use crate::models::ElementKind;

    fn element(file: &str, name: &str, line: u32, signature: &str, tags: &[&str]) -> CodeElement {
        CodeElement {
            id: crate::models::element_id(file, name, line),
            kind: ElementKind::Function,
            name: name.to_string(),
            file_path: file.to_string(),
            start_line: line,
            end_line: line,
            signature: signature.to_string(),
            dependencies: Vec::new(),
            usage_sites: Vec::new(),
            complexity_score: 1,
            semantic_tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn names(ranked: &[Ranked<'_>]) -> Vec<String> {
        ranked.iter().map(|r| r.element.name.clone()).collect()
    }

    #[test]
    fn test_keyword_score_components() {
        let e = element("a.ts", "parseFile", 1, "function parseFile(path: string)", &["function", "exported"]);
        let query = "parse".to_string();
        assert_eq!(keyword_score(&query, &tokens(&query), &e), 15.0);
        let query = "export".to_string();
        assert_eq!(keyword_score(&query, &tokens(&query), &e), 3.0);
    }

    #[test]
    fn test_name_match_ranks_first() {
        let elements = vec![
            element("a.ts", "helperForParse", 10, "function helperForParse(input)", &[]),
            element("b.ts", "tokenize", 1, "function tokenize(parse: boolean)", &[]),
            element("z.ts", "parseFile", 3, "function parseFile(path)", &[]),
            element("c.ts", "unrelated", 1, "function unrelated()", &[]),
        ];
        let ranked = keyword_search(&elements, "parse", 10);
        assert_eq!(names(&ranked), vec!["helperForParse", "parseFile", "tokenize"]);
        assert_eq!(ranked[0].score, 15.0);
        assert_eq!(ranked[1].score, 15.0);
        assert_eq!(ranked[2].score, 5.0);
    }

    #[test]
    fn test_prefix_match_does_not_outrank_path_order() {
        let elements = vec![
            element("b.ts", "parseFile", 1, "", &[]),
            element("a.ts", "reparse", 1, "", &[]),
        ];
        let ranked = keyword_search(&elements, "parse", 10);
        assert_eq!(names(&ranked), vec!["reparse", "parseFile"]);
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn test_limit_is_honoured_exactly() {
        let elements: Vec<CodeElement> = (0..150)
            .map(|i| element(&format!("src/m{i:03}.ts"), &format!("handler{i}"), 1, "", &[]))
            .collect();
        assert!(keyword_search(&elements, "handler", 0).is_empty());
        assert_eq!(keyword_search(&elements, "handler", 150).len(), 150);
        assert_eq!(keyword_search(&elements, "handler", 1_000).len(), 150);
        let top = keyword_search(&elements, "handler", 120);
        assert_eq!(top.len(), 120);
        assert_eq!(top[0].element.file_path, "src/m000.ts");
    }

    #[test]
    fn test_ties_break_by_path_then_line() {
        let elements = vec![
            element("b.ts", "loadB", 1, "", &[]),
            element("a.ts", "loadA2", 9, "", &[]),
            element("a.ts", "loadA1", 2, "", &[]),
        ];
        let ranked = keyword_search(&elements, "load", 2);
        assert_eq!(names(&ranked), vec!["loadA1", "loadA2"]);
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let elements = vec![element("a.ts", "x", 1, "", &[])];
        assert!(keyword_search(&elements, "   ", 10).is_empty());
    }

    #[test]
    fn test_similar_excludes_self_and_orders_by_similarity() {
        let mut index = SemanticIndex::default();
        for e in [
            element("a.ts", "loadUser", 1, "function loadUser(id: string)", &[]),
            element("a.ts", "loadUsers", 5, "function loadUsers(ids: string)", &[]),
            element("b.py", "render_page", 1, "def render_page(request)", &[]),
        ] {
            index.embeddings.insert(e.id.clone(), embed_signature(&e.signature, 128));
            index.elements.insert(e.id.clone(), e);
        }
        let ranked = similar_elements(&index, "a.ts#loadUser@1", 10).unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(similar_elements(&index, "a.ts#loadUser@1", 0).unwrap().is_empty());
        assert_eq!(ranked[0].element.name, "loadUsers");
        assert!(ranked.iter().all(|r| r.element.id != "a.ts#loadUser@1"));
        assert!(matches!(
            similar_elements(&index, "missing", 3),
            Err(IndexError::UnknownElement(_))
        ));
    }
}
