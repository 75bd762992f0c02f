use chrono::{DateTime, Utc};
use core_model::{Record, Summary};

use crate::{segment::Segment, session::Session};

/// One root-to-leaf path through a session's segment tree.
#[derive(Debug, Clone)]
pub struct Thread<'s> {
    pub segments: Vec<&'s Segment>,
    records: &'s [Record],
    summary: Option<&'s Summary>,
}

impl<'s> Thread<'s> {
    /// The leaf record id.
    pub fn id(&self) -> &'s str {
        self.segments
            .last()
            .copied()
            .map(|seg| seg.leaf_id.as_str())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> impl Iterator<Item = &'s Record> + '_ {
        let records = self.records;
        self.segments
            .iter()
            .flat_map(move |seg| seg.records(records).iter())
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|seg| seg.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn leaf(&self) -> Option<&'s Record> {
        let seg = self.segments.last().copied()?;
        seg.records(self.records).last()
    }

    /// The leaf segment's first summary; failing that, the summary of the
    /// latest record on the path that has one.
    pub fn summary(&self) -> Option<&'s Summary> {
        self.summary
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        let records = self.records;
        self.segments
            .iter()
            .rev()
            .flat_map(|seg| seg.records(records).iter().rev())
            .find_map(|r| r.timestamp)
    }

    pub fn git_branch(&self) -> Option<&'s str> {
        let records = self.records;
        self.segments
            .iter()
            .rev()
            .flat_map(|seg| seg.records(records).iter().rev())
            .find_map(Record::git_branch)
    }
}

/// Every root-to-leaf path, leaves in segment-tree order (children in log order).
pub(crate) fn extract(session: &Session) -> Vec<Thread<'_>> {
    let mut out = Vec::new();
    let mut path: Vec<&Segment> = Vec::new();
    let mut stack = vec![(&session.root_segment, 0usize)];
    while let Some((seg, depth)) = stack.pop() {
        path.truncate(depth);
        path.push(seg);
        if seg.is_leaf() {
            out.push(Thread {
                summary: thread_summary(&path, session),
                segments: path.clone(),
                records: &session.records,
            });
        } else {
            stack.extend(seg.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }
    out
}

fn thread_summary<'s>(path: &[&'s Segment], session: &'s Session) -> Option<&'s Summary> {
    let leaf: &'s Segment = path.last().copied()?;
    if let Some(summary) = leaf.summary() {
        return Some(summary);
    }
    path.iter()
        .rev()
        .flat_map(|seg| seg.records(&session.records).iter().rev())
        .find_map(|r| session.summaries_for(&r.id).next())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{assistant, at, session, summary, user};

    fn ids(thread: &super::Thread<'_>) -> Vec<String> {
        thread.messages().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn one_thread_per_leaf_in_tree_order() {
        let s = session(&[
            user("1", None),
            assistant("2", "1"),
            user("3a", Some("2")),
            user("3b", Some("2")),
        ]);
        let threads = s.threads();
        assert_eq!(threads.len(), 2);
        assert_eq!(ids(&threads[0]), vec!["1", "2", "3a"]);
        assert_eq!(ids(&threads[1]), vec!["1", "2", "3b"]);
        assert_eq!(threads[0].id(), "3a");
        assert_eq!(s.primary_thread().map(|t| t.id()), Some("3a"));
    }

    #[test]
    fn nested_branches_yield_three_threads() {
        let s = session(&[
            user("1", None),
            assistant("2a", "1"),
            user("3", Some("2a")),
            assistant("4a", "3"),
            assistant("4b", "3"),
            assistant("2b", "1"),
        ]);
        let threads = s.threads();
        let all: Vec<Vec<String>> = threads.iter().map(ids).collect();
        assert_eq!(
            all,
            vec![
                vec!["1", "2a", "3", "4a"],
                vec!["1", "2a", "3", "4b"],
                vec!["1", "2b"],
            ]
        );
        assert_eq!(threads[2].len(), 2);
        assert_eq!(threads[0].segments.len(), 3);
    }

    #[test]
    fn summary_falls_back_to_latest_on_path() {
        let s = session(&[
            user("1", None),
            assistant("2", "1"),
            summary("2", "early"),
            user("3a", Some("2")),
            user("3b", Some("2")),
            summary("3b", "own"),
        ]);
        let threads = s.threads();
        assert_eq!(threads[0].summary().map(|x| x.text.as_str()), Some("early"));
        assert_eq!(threads[1].summary().map(|x| x.text.as_str()), Some("own"));
    }

    #[test]
    fn unsummarized_thread_has_no_summary() {
        let s = session(&[user("1", None), assistant("2", "1")]);
        assert!(s.threads()[0].summary().is_none());
    }

    #[test]
    fn recency_orders_newest_first_and_reads_branch() {
        let mut newer = user("3b", Some("2"));
        newer["gitBranch"] = "feature".into();
        let s = session(&[
            at(user("1", None), "2025-01-01T10:00:00Z"),
            at(assistant("2", "1"), "2025-01-01T10:01:00Z"),
            at(user("3a", Some("2")), "2025-01-01T10:02:00Z"),
            at(newer, "2025-01-02T09:00:00Z"),
            user("3c", Some("2")),
        ]);
        let ordered: Vec<&str> = s.threads_by_recency().iter().map(|t| t.id()).collect();
        assert_eq!(ordered, vec!["3b", "3a", "3c"]);

        let threads = s.threads();
        assert_eq!(threads[1].git_branch(), Some("feature"));
        assert_eq!(
            threads[2].last_updated_at().map(|t| t.to_rfc3339()),
            Some("2025-01-01T10:01:00+00:00".to_string())
        );
        assert_eq!(
            s.last_updated_at().map(|t| t.to_rfc3339()),
            Some("2025-01-02T09:00:00+00:00".to_string())
        );
    }

    #[test]
    fn threads_cover_every_record() {
        let s = session(&[
            user("1", None),
            assistant("2a", "1"),
            assistant("2b", "1"),
            user("3", Some("2b")),
        ]);
        let mut seen: Vec<String> = s.threads().iter().flat_map(ids).collect();
        seen.sort();
        seen.dedup();
        let mut all: Vec<String> = s.records.iter().map(|r| r.id.clone()).collect();
        all.sort();
        assert_eq!(seen, all);
    }
}
