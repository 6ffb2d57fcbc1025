//! Storage-agnostic pagination and reply-tree assembly.
//!
//! Both repository backends hand their flat comment rows to these functions,
//! so ordering, cursor handling and threading behave the same everywhere.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{Comment, CommentConnection, CommentNode, Id, PageInfo};

/// Page size used when the caller passes no limit (or zero).
pub const DEFAULT_LIMIT: usize = 1000;

pub fn effective_limit(limit: Option<u32>) -> usize {
    match limit {
        Some(0) | None => DEFAULT_LIMIT,
        Some(n) => n as usize,
    }
}

/// Creation time ascending, id as the tie-break.
pub fn chronological(a: &Comment, b: &Comment) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// A bounded slice of flat comments plus continuation info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Comment>,
    pub has_next_page: bool,
    pub end_cursor: Option<Id>,
}

impl Page {
    /// Cuts an ordered window down to `limit` items. Anything left over means
    /// another page exists, so callers may over-fetch by one row.
    pub fn from_window(mut window: Vec<Comment>, limit: usize) -> Self {
        let has_next_page = window.len() > limit;
        window.truncate(limit);
        let end_cursor = window.last().map(|c| c.id);
        Self { items: window, has_next_page, end_cursor }
    }

    pub fn page_info(&self) -> PageInfo {
        PageInfo { has_next_page: self.has_next_page, end_cursor: self.end_cursor }
    }

    /// Threads the page and pairs it with its page info.
    pub fn into_connection(self) -> CommentConnection {
        let page_info = self.page_info();
        CommentConnection { edges: build_forest(self.items), page_info }
    }
}

/// Sorts `comments` and returns the page that starts right after `cursor`.
///
/// A cursor that names no comment in the set yields an empty page rather than
/// an error: it is treated as pointing past the end.
pub fn paginate(mut comments: Vec<Comment>, limit: usize, cursor: Option<Id>) -> Page {
    comments.sort_by(chronological);

    let start = match cursor {
        None => 0,
        Some(cursor) => match comments.iter().position(|c| c.id == cursor) {
            Some(pos) => pos + 1,
            None => return Page::default(),
        },
    };

    Page::from_window(comments.split_off(start), limit)
}

/// Nests a flat comment sequence into reply trees.
///
/// Parents are resolved only against `comments` itself: a reply whose parent
/// is not part of the input becomes a root. Roots and reply lists keep input
/// order.
pub fn build_forest(comments: Vec<Comment>) -> Vec<CommentNode> {
    let index: HashMap<Id, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    for (i, c) in comments.iter().enumerate() {
        match c.parent_id.and_then(|p| index.get(&p)) {
            Some(&parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let mut slots: Vec<Option<CommentNode>> =
        comments.into_iter().map(|c| Some(c.into())).collect();
    roots
        .into_iter()
        .filter_map(|i| assemble(i, &children, &mut slots))
        .collect()
}

// Each slot is taken once, so self-parented or cyclic rows just drop out.
fn assemble(
    i: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<CommentNode>],
) -> Option<CommentNode> {
    let mut node = slots[i].take()?;
    node.replies = children[i]
        .iter()
        .filter_map(|&child| assemble(child, children, slots))
        .collect();
    Some(node)
}
