//! Cross-file session assembly.
//!
//! Phase one flattens every file's output into one arena indexed by id
//! (first occurrence in scan order wins), pairs command records with their
//! stdout or expanded-prompt lines, and folds tool result lines into the
//! tool calls they answer. Phase two
//! resolves parents through hidden lines, discovers roots and walks each
//! root's reachable set into a [`Session`].

use std::collections::{BTreeSet, HashMap, HashSet};

use core_model::{
    HiddenReason, HiddenRecord, ParsedFile, Record, RecordKind, Summary, UserContent,
    UserDefinedCommand, UserMessage, Warning, WarningKind,
};
use serde_json::Value;

use crate::session::Session;

/// Builds every session of a project. `files` must be in scan order.
pub fn assemble(files: Vec<ParsedFile>) -> Vec<Session> {
    let mut arena = Arena::collect(files);
    arena.pair_commands();
    arena.attach_tool_results();
    arena.hide_tool_results();
    arena.into_sessions()
}

#[derive(Default)]
struct Arena {
    files: Vec<String>,
    file_warnings: Vec<Vec<Warning>>,
    records: Vec<Record>,
    index: HashMap<String, usize>,
    hidden: Vec<HiddenRecord>,
    hidden_index: HashMap<String, usize>,
    summaries: Vec<Summary>,
}

/// Where a parent reference ends up once hidden lines are skipped.
#[derive(Debug, Clone, PartialEq)]
enum Link {
    Root,
    Parent(usize),
    Missing(String),
}

impl Arena {
    fn collect(files: Vec<ParsedFile>) -> Self {
        let mut arena = Arena::default();
        let mut seen_summaries: HashSet<(String, String)> = HashSet::new();
        for file in files {
            for record in file.records {
                if arena.is_known(&record.id) {
                    tracing::trace!(id = %record.id, file = %file.file, "duplicate record skipped");
                    continue;
                }
                arena.index.insert(record.id.clone(), arena.records.len());
                arena.records.push(record);
            }
            for hidden in file.hidden {
                if arena.is_known(&hidden.id) {
                    continue;
                }
                arena
                    .hidden_index
                    .insert(hidden.id.clone(), arena.hidden.len());
                arena.hidden.push(hidden);
            }
            for summary in file.summaries {
                if seen_summaries.insert((summary.leaf_id.clone(), summary.text.clone())) {
                    arena.summaries.push(summary);
                }
            }
            arena.files.push(file.file);
            arena.file_warnings.push(file.warnings);
        }
        arena
    }

    fn is_known(&self, id: &str) -> bool {
        self.index.contains_key(id) || self.hidden_index.contains_key(id)
    }

    /// A command whose child is a meta line with a text block becomes a
    /// user-defined command. Remaining built-in commands take the stdout of a
    /// child stdout line, or failing that of a sibling one.
    fn pair_commands(&mut self) {
        for hidden in &self.hidden {
            let HiddenReason::Meta { text: Some(text) } = &hidden.reason else {
                continue;
            };
            let Some(&idx) = hidden.parent_id.as_ref().and_then(|p| self.index.get(p)) else {
                continue;
            };
            let record = &mut self.records[idx];
            let upgraded = match &record.kind {
                RecordKind::BuiltInCommand(cmd) => RecordKind::UserDefinedCommand(UserDefinedCommand {
                    command: cmd.command.clone(),
                    expanded_prompt: Some(text.clone()),
                }),
                _ => continue,
            };
            record.kind = upgraded;
        }

        let mut commands_by_parent: HashMap<Option<String>, Vec<usize>> = HashMap::new();
        for (idx, record) in self.records.iter().enumerate() {
            if matches!(record.kind, RecordKind::BuiltInCommand(_)) {
                commands_by_parent
                    .entry(record.parent_id.clone())
                    .or_default()
                    .push(idx);
            }
        }

        let mut paired: HashSet<usize> = HashSet::new();
        for hidden in &self.hidden {
            let HiddenReason::CommandStdout { text } = &hidden.reason else {
                continue;
            };
            let records = &self.records;
            let open = |idx: &usize| {
                !paired.contains(idx) && matches!(records[*idx].kind, RecordKind::BuiltInCommand(_))
            };
            let child_of = hidden
                .parent_id
                .as_ref()
                .and_then(|p| self.index.get(p))
                .copied()
                .filter(|idx| open(idx));
            let target = child_of.or_else(|| {
                commands_by_parent
                    .get(&hidden.parent_id)
                    .and_then(|siblings| siblings.iter().copied().find(|idx| open(idx)))
            });
            let Some(idx) = target else {
                continue;
            };
            if let RecordKind::BuiltInCommand(cmd) = &mut self.records[idx].kind {
                cmd.stdout = text.clone();
            }
            paired.insert(idx);
        }
    }

    /// Pairs each `tool_use` with the `toolUseResult` of the user line that
    /// answers it, by tool use id.
    fn attach_tool_results(&mut self) {
        let mut results: HashMap<String, Value> = HashMap::new();
        for record in &self.records {
            if let RecordKind::UserMessage(UserMessage {
                content: UserContent::ToolResult {
                    tool_use_id: Some(id),
                },
            }) = &record.kind
                && let Some(result) = record.raw.get("toolUseResult")
            {
                results.entry(id.clone()).or_insert_with(|| result.clone());
            }
        }
        if results.is_empty() {
            return;
        }
        for record in &mut self.records {
            if let RecordKind::AssistantMessage(msg) = &mut record.kind {
                for call in &mut msg.tool_calls {
                    call.result = results.get(&call.id).cloned();
                }
            }
        }
    }

    /// Moves tool result lines out of the record stream once their payloads
    /// sit on the matching tool calls. Their children relink past them.
    fn hide_tool_results(&mut self) {
        let records = std::mem::take(&mut self.records);
        self.index.clear();
        for record in records {
            if let RecordKind::UserMessage(UserMessage {
                content: UserContent::ToolResult { tool_use_id },
            }) = record.kind
            {
                self.hidden_index.insert(record.id.clone(), self.hidden.len());
                self.hidden.push(HiddenRecord {
                    id: record.id,
                    parent_id: record.parent_id,
                    origin: record.origin,
                    reason: HiddenReason::ToolResult { tool_use_id },
                });
                continue;
            }
            self.index.insert(record.id.clone(), self.records.len());
            self.records.push(record);
        }
    }

    fn resolve(&self, parent: Option<&str>) -> Link {
        let mut current = parent;
        // A hidden chain longer than the hidden set can only be a cycle.
        for _ in 0..=self.hidden.len() {
            let Some(id) = current else {
                return Link::Root;
            };
            if let Some(&idx) = self.index.get(id) {
                return Link::Parent(idx);
            }
            match self.hidden_index.get(id) {
                Some(&h) => current = self.hidden[h].parent_id.as_deref(),
                None => return Link::Missing(id.to_string()),
            }
        }
        Link::Missing(parent.unwrap_or_default().to_string())
    }

    /// Resolves an id that may name a hidden line to the nearest kept record.
    fn resolve_id(&self, id: &str) -> Link {
        if let Some(&idx) = self.index.get(id) {
            return Link::Parent(idx);
        }
        match self.hidden_index.get(id) {
            Some(&h) => self.resolve(self.hidden[h].parent_id.as_deref()),
            None => Link::Missing(id.to_string()),
        }
    }

    fn into_sessions(self) -> Vec<Session> {
        let file_pos: HashMap<String, usize> = self
            .files
            .iter()
            .enumerate()
            .rev()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        let links: Vec<Link> = self
            .records
            .iter()
            .map(|r| self.resolve(r.parent_id.as_deref()))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.records.len()];
        let mut roots = Vec::new();
        for (idx, link) in links.iter().enumerate() {
            match link {
                Link::Root => roots.push(idx),
                Link::Parent(p) if *p != idx => children[*p].push(idx),
                _ => {}
            }
        }

        let mut file_warnings = self.file_warnings.clone();
        let mut roots_by_file: Vec<Vec<usize>> = vec![Vec::new(); self.files.len()];
        for &root in &roots {
            if let Some(&f) = file_pos.get(&self.records[root].origin.file) {
                roots_by_file[f].push(root);
            }
        }
        for (f, file_roots) in roots_by_file.iter().enumerate() {
            if file_roots.len() < 2 {
                continue;
            }
            let ids: Vec<&str> = file_roots
                .iter()
                .map(|&r| self.records[r].id.as_str())
                .collect();
            tracing::debug!(file = %self.files[f], roots = ?ids, "multiple roots in one file");
            file_warnings[f].push(Warning {
                kind: WarningKind::MultipleRoots,
                message: format!("{} root records in one file: {}", ids.len(), ids.join(", ")),
                file: Some(self.files[f].clone()),
                line: Some(self.records[file_roots[1]].origin.line),
                raw: None,
            });
        }

        // Preorder walk per root. A chain of single children lands on
        // consecutive positions, which segments rely on.
        let mut owner: Vec<Option<usize>> = vec![None; self.records.len()];
        let mut walks: Vec<Vec<usize>> = Vec::with_capacity(roots.len());
        for (s, &root) in roots.iter().enumerate() {
            let mut order = Vec::new();
            let mut stack = vec![root];
            while let Some(idx) = stack.pop() {
                if owner[idx].is_some() {
                    continue;
                }
                owner[idx] = Some(s);
                order.push(idx);
                stack.extend(children[idx].iter().rev());
            }
            walks.push(order);
        }

        for (idx, record) in self.records.iter().enumerate() {
            if owner[idx].is_some() {
                continue;
            }
            let message = match &links[idx] {
                Link::Missing(parent) => {
                    format!("record {} references missing parent {parent}", record.id)
                }
                _ => format!("record {} is not reachable from any root", record.id),
            };
            tracing::debug!(id = %record.id, file = %record.origin.file, "orphaned record");
            if let Some(&f) = file_pos.get(&record.origin.file) {
                file_warnings[f].push(
                    Warning::at(WarningKind::OrphanedRecord, message, &record.origin)
                        .with_raw(Value::Object(record.raw.clone())),
                );
            }
        }

        let mut contributing: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); roots.len()];
        for (s, order) in walks.iter().enumerate() {
            for &idx in order {
                if let Some(&f) = file_pos.get(&self.records[idx].origin.file) {
                    contributing[s].insert(f);
                }
            }
        }
        for hidden in &self.hidden {
            if let Link::Parent(idx) = self.resolve(hidden.parent_id.as_deref())
                && let Some(s) = owner[idx]
                && let Some(&f) = file_pos.get(&hidden.origin.file)
            {
                contributing[s].insert(f);
            }
        }

        let mut matched: Vec<Vec<(String, Summary)>> = vec![Vec::new(); roots.len()];
        for summary in &self.summaries {
            let Link::Parent(idx) = self.resolve_id(&summary.leaf_id) else {
                continue;
            };
            let Some(s) = owner[idx] else {
                continue;
            };
            if let Some(&f) = file_pos.get(&summary.origin.file) {
                contributing[s].insert(f);
            }
            matched[s].push((self.records[idx].id.clone(), summary.clone()));
        }

        let effective_parent: Vec<Option<String>> = links
            .iter()
            .map(|link| match link {
                Link::Parent(p) => Some(self.records[*p].id.clone()),
                Link::Root => None,
                Link::Missing(id) => Some(id.clone()),
            })
            .collect();

        let mut slots: Vec<Option<Record>> = self.records.into_iter().map(Some).collect();
        let mut position: Vec<usize> = vec![0; slots.len()];
        let mut sessions = Vec::with_capacity(roots.len());
        for ((order, files), summaries) in walks.into_iter().zip(contributing).zip(matched) {
            for (pos, &idx) in order.iter().enumerate() {
                position[idx] = pos;
            }
            let local_children: Vec<Vec<usize>> = order
                .iter()
                .map(|&idx| children[idx].iter().map(|&c| position[c]).collect())
                .collect();
            let records: Vec<Record> = order
                .iter()
                .filter_map(|&idx| {
                    let mut record = slots[idx].take()?;
                    record.parent_id = effective_parent[idx].clone();
                    Some(record)
                })
                .collect();
            let id = adapter_common::file_stem(&records[0].origin.file).to_string();
            let warnings = files
                .iter()
                .flat_map(|&f| file_warnings[f].iter().cloned())
                .collect();
            let files = files.iter().map(|&f| self.files[f].clone()).collect();
            sessions.push(Session::build(
                id,
                records,
                &local_children,
                summaries,
                warnings,
                files,
            ));
        }
        tracing::debug!(sessions = sessions.len(), "assembled sessions");
        sessions
    }
}
