use std::{collections::HashMap, ops::Range};

use core_model::{Record, Summary};
use serde::Serialize;

/// A branch-free run of records. It ends at a leaf (no children) or at a
/// branch point (two or more children); each child starts a child segment.
///
/// Session records are stored in tree-walk (preorder) order, so the records
/// of a segment are always contiguous and held here as a range.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Segment {
    pub span: Range<usize>,
    pub leaf_id: String,
    pub children: Vec<Segment>,
    pub summaries: Vec<Summary>,
}

impl Segment {
    pub fn records<'s>(&self, records: &'s [Record]) -> &'s [Record] {
        &records[self.span.clone()]
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summaries.first()
    }

    pub fn leaf_count(&self) -> usize {
        self.walk().iter().filter(|seg| seg.is_leaf()).count()
    }

    /// This segment and all of its descendants, parents before children.
    pub fn walk(&self) -> Vec<&Segment> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(seg) = stack.pop() {
            out.push(seg);
            stack.extend(seg.children.iter().rev());
        }
        out
    }
}

/// `children[i]` lists the positions of record `i`'s children in insertion
/// order; `summary_index` maps a record id to positions in `summaries`.
///
/// Spans are found in preorder with an explicit stack, then the owned tree
/// is put together in reverse preorder, so nesting depth never reaches the
/// call stack.
pub(crate) fn build(
    start: usize,
    records: &[Record],
    children: &[Vec<usize>],
    summaries: &[Summary],
    summary_index: &HashMap<String, Vec<usize>>,
) -> Segment {
    // (span start, span end, number of child segments), in preorder.
    let mut spans: Vec<(usize, usize, usize)> = Vec::new();
    let mut stack: Vec<(usize, Option<usize>)> = vec![(start, None)];
    while let Some((first, parent)) = stack.pop() {
        let mut end = first;
        while let [only] = children[end].as_slice() {
            end = *only;
        }
        if let Some(p) = parent {
            spans[p].2 += 1;
        }
        let slot = spans.len();
        spans.push((first, end, 0));
        stack.extend(children[end].iter().rev().map(|&c| (c, Some(slot))));
    }

    // In reverse preorder a segment's children sit on top of `done`, first child topmost.
    let mut done: Vec<Segment> = Vec::new();
    for &(first, end, child_count) in spans.iter().rev() {
        let children: Vec<Segment> = (0..child_count).filter_map(|_| done.pop()).collect();
        let leaf_id = records[end].id.clone();
        let matched = summary_index
            .get(&leaf_id)
            .map(|idx| idx.iter().map(|&i| summaries[i].clone()).collect())
            .unwrap_or_default();
        done.push(Segment {
            span: first..end + 1,
            leaf_id,
            children,
            summaries: matched,
        });
    }
    done.pop().unwrap_or_default()
}
