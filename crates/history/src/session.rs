use std::collections::HashMap;

use chrono::{DateTime, Utc};
use core_model::{Record, Summary, Warning};
use serde::Serialize;

use crate::{
    segment::{self, Segment},
    thread::{self, Thread},
};

/// The connected conversation tree reachable from one parent-less record,
/// possibly spanning several files. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// File name of the root record, without extension.
    pub id: String,
    /// Tree-walk (preorder) order, children in log order.
    pub records: Vec<Record>,
    /// Summaries whose leaf id resolved to a record of this session.
    pub summaries: Vec<Summary>,
    pub warnings: Vec<Warning>,
    /// Files that contributed records or summaries, in scan order.
    pub files: Vec<String>,
    pub root_segment: Segment,
    #[serde(skip)]
    summary_index: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl Session {
    /// `records` must be in preorder with `children[i]` the positions of the
    /// children of record `i`; each summary is paired with the id of the
    /// record it resolved to.
    pub(crate) fn build(
        id: String,
        records: Vec<Record>,
        children: &[Vec<usize>],
        matched: Vec<(String, Summary)>,
        warnings: Vec<Warning>,
        files: Vec<String>,
    ) -> Self {
        let mut summary_index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut summaries = Vec::with_capacity(matched.len());
        for (target, summary) in matched {
            summary_index
                .entry(target)
                .or_default()
                .push(summaries.len());
            summaries.push(summary);
        }
        let root_segment = segment::build(0, &records, children, &summaries, &summary_index);
        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
        Self {
            id,
            records,
            summaries,
            warnings,
            files,
            root_segment,
            summary_index,
            positions,
        }
    }

    pub fn root(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    pub fn segment_records(&self, segment: &Segment) -> &[Record] {
        segment.records(&self.records)
    }

    /// Summaries targeting `record_id`, first-encountered first.
    pub fn summaries_for<'a>(&'a self, record_id: &str) -> impl Iterator<Item = &'a Summary> + 'a {
        self.summary_index
            .get(record_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.summaries[i])
    }

    /// One thread per leaf, in segment-tree order. The first is the primary thread.
    pub fn threads(&self) -> Vec<Thread<'_>> {
        thread::extract(self)
    }

    pub fn primary_thread(&self) -> Option<Thread<'_>> {
        self.threads().into_iter().next()
    }

    /// Threads sorted by last update, newest first; ties keep tree order.
    pub fn threads_by_recency(&self) -> Vec<Thread<'_>> {
        let mut threads = self.threads();
        threads.sort_by_key(|t| std::cmp::Reverse(t.last_updated_at()));
        threads
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(|r| r.timestamp).max()
    }
}
