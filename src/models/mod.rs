//! Core data models for the paper graph search system.
//!
//! This module contains the fundamental data structures used across the application,
//! including paper metadata, retrieved result items, similarity edges and the
//! response payload returned to clients.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Catalog metadata for a single paper.
///
/// Mirrors the columns of the `papers` table. Every field except `id` and
/// `title` is optional because arXiv metadata dumps are sparse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Catalog primary key
    pub id: i64,

    /// arXiv identifier (e.g., "2106.09685")
    pub arxiv_id: Option<String>,

    /// Paper title
    pub title: String,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    /// Space separated arXiv categories (e.g., "cs.LG stat.ML")
    pub categories: Option<String>,

    /// Date of the latest arXiv revision
    pub update_date: Option<NaiveDate>,

    /// Digital Object Identifier
    pub doi: Option<String>,

    /// Author list as it appears in the metadata
    pub authors: Option<String>,

    /// Free-form submission comments (page counts, venues, ...)
    pub comments: Option<String>,

    /// Journal reference, when published
    pub journal_ref: Option<String>,

    /// Number of known citations
    pub citation_count: Option<i64>,
}

/// One entry of a nearest-neighbor result set.
///
/// Produced by a [`NearestNeighborStore`](crate::storage::NearestNeighborStore)
/// and read-only for the rest of the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
    /// The paper metadata
    pub paper: Paper,

    /// Distance from the query vector under the store's metric
    pub distance: f32,

    /// Community/cluster label assigned offline, if any
    pub community_id: Option<String>,

    /// The paper's stored embedding (unit length)
    pub embedding: Vec<f32>,
}

impl ResultItem {
    /// Identity used for graph nodes and edges.
    pub fn node_id(&self) -> String {
        self.paper.id.to_string()
    }
}

/// A directed edge of the result similarity graph.
///
/// `source` selected `target` as one of its strongest neighbors; the
/// reverse edge exists only if `target` selected `source` as well.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityEdge {
    /// Node that selected the neighbor
    pub source: String,

    /// Selected neighbor
    pub target: String,

    /// Dot product of the two embeddings
    pub weight: f32,
}

/// A result node as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    /// Paper id rendered as a string, matches edge endpoints
    pub id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub categories: Option<String>,
    pub update_date: Option<NaiveDate>,
    pub doi: Option<String>,
    pub authors: Option<String>,
    pub comments: Option<String>,
    pub journal_ref: Option<String>,
    pub citation_count: Option<i64>,

    /// `1 - distance`; roughly in [-1, 1] under cosine distance
    pub relevance: f32,

    pub community_id: Option<String>,
}

impl GraphNode {
    /// Build a node from a retrieved item and its relevance score.
    pub fn from_item(item: ResultItem, relevance: f32) -> Self {
        let id = item.node_id();
        let paper = item.paper;
        Self {
            id,
            arxiv_id: paper.arxiv_id,
            title: paper.title,
            abstract_text: paper.abstract_text,
            categories: paper.categories,
            update_date: paper.update_date,
            doi: paper.doi,
            authors: paper.authors,
            comments: paper.comments,
            journal_ref: paper.journal_ref,
            citation_count: paper.citation_count,
            relevance,
            community_id: item.community_id,
        }
    }
}

/// Response payload of a graph search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// The query text as received
    pub query: String,

    /// Result nodes, ordered by ascending distance to the query
    pub nodes: Vec<GraphNode>,

    /// Similarity edges between result nodes
    pub links: Vec<SimilarityEdge>,
}

impl SearchResponse {
    /// Outgoing edges of the node with the given id, in rank order.
    pub fn neighbors_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a SimilarityEdge> {
        self.links.iter().filter(move |edge| edge.source == id)
    }
}

/// Relevance classification for display purposes.
///
/// Results are bucketed by their relevance score so terminal output can
/// colour-code matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (relevance > 0.95)
    Identical,

    /// Very high similarity (relevance > 0.85)
    HighlySimilar,

    /// Moderate similarity (relevance > 0.70)
    Similar,

    /// Lower similarity but still retrieved
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a relevance score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used in tables.
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}
