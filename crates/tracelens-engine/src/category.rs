//! Span categorisation by semantic operation name.

use serde::Serialize;
use tracelens_core::{Category, SpanRecord, ThemeTokens, TreeNode};

/// Well-known operation names and the category each maps to.
const OPERATION_CATEGORIES: &[(&str, Category)] = &[
    ("invoke_agent", Category::Agent),
    ("create_agent", Category::Agent),
    ("chat", Category::Llm),
    ("execute_tool", Category::Tool),
    ("text_completion", Category::Content),
    ("generate_content", Category::Content),
    ("embeddings", Category::Embeddings),
    ("retrieval", Category::Retrieval),
];

/// Display metadata for a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMetadata {
    pub icon: &'static str,
    pub label: &'static str,
    pub color: String,
}

/// A borrowed view of a forest node annotated with its category.
#[derive(Debug, Clone)]
pub struct CategorizedNode<'a> {
    pub category: Category,
    pub node: &'a TreeNode,
    pub children: Vec<CategorizedNode<'a>>,
}

pub fn categorize(span: &SpanRecord) -> Category {
    categorize_operation(span.operation_kind.as_deref())
}

/// Case-insensitive lookup; missing or unknown names are [`Category::Other`].
pub fn categorize_operation(operation_kind: Option<&str>) -> Category {
    let Some(kind) = operation_kind.map(str::trim).filter(|k| !k.is_empty()) else {
        return Category::Other;
    };

    OPERATION_CATEGORIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(kind))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}

pub fn category_metadata(category: Category, theme: &dyn ThemeTokens) -> CategoryMetadata {
    let (icon, label) = match category {
        Category::Agent => ("user", "Agent"),
        Category::Llm => ("sparkles", "LLM"),
        Category::Tool => ("wrench", "Tool"),
        Category::Content => ("document", "Content"),
        Category::Embeddings => ("vector", "Embeddings"),
        Category::Retrieval => ("search", "Retrieval"),
        Category::Other => ("dot", "Other"),
    };

    CategoryMetadata {
        icon,
        label,
        color: theme.color(category),
    }
}

/// Mirrors a forest with a category on every node; the forest itself is not touched.
pub fn categorize_tree(forest: &[TreeNode]) -> Vec<CategorizedNode<'_>> {
    forest
        .iter()
        .map(|node| CategorizedNode {
            category: categorize(&node.source),
            node,
            children: categorize_tree(&node.children),
        })
        .collect()
}
