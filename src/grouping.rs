//! Clusters sibling workloads into collapsible groups by shared name prefix.
//!
//! Names are split on `-` to produce candidate prefixes. A workload joins the
//! group named by the longest candidate that at least one other ungrouped
//! workload's name also starts with (`app-1` and `apple-1` share `app`).
//! Workloads with no such sibling form a singleton keyed by their full name.
//! Workloads are visited deepest name first (then alphabetically), which makes
//! the outcome independent of input order.

use std::collections::HashMap;

use serde::Serialize;

pub const DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadGroup {
    pub prefix: String,
    /// Member workload ids, ordered by workload name.
    pub members: Vec<String>,
    /// Always `true` for singletons, which have nothing to collapse.
    pub expanded: bool,
}

impl WorkloadGroup {
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }
}

/// Candidate prefixes for `name`, longest first: all segments but the last,
/// then one segment fewer, down to the first segment. Empty candidates (from
/// leading delimiters) are skipped.
fn candidate_prefixes(name: &str) -> impl Iterator<Item = &str> {
    let cuts: Vec<usize> = name
        .match_indices(DELIMITER)
        .map(|(idx, _)| idx)
        .collect();
    cuts.into_iter()
        .rev()
        .map(move |idx| &name[..idx])
        .filter(|prefix| !prefix.is_empty())
}

struct Entry<'a> {
    id: &'a str,
    name: &'a str,
}

/// Partitions `workloads` (pairs of id and name) so that every workload lands
/// in exactly one group. Expanded flags of multi-member groups are carried
/// over from `previous` by prefix; new multi-member groups start collapsed.
/// The result is sorted by prefix.
pub fn group_workloads(workloads: &[(&str, &str)], previous: &[WorkloadGroup]) -> Vec<WorkloadGroup> {
    let prior: HashMap<&str, bool> = previous
        .iter()
        .filter(|g| !g.is_singleton())
        .map(|g| (g.prefix.as_str(), g.expanded))
        .collect();

    let mut entries: Vec<Entry<'_>> = workloads
        .iter()
        .map(|&(id, name)| Entry { id, name })
        .collect();
    entries.sort_by(|a, b| {
        let depth = |e: &Entry<'_>| e.name.matches(DELIMITER).count();
        depth(b)
            .cmp(&depth(a))
            .then_with(|| a.name.cmp(b.name))
            .then_with(|| a.id.cmp(b.id))
    });

    let mut assigned = vec![false; entries.len()];
    let mut groups = Vec::new();

    for i in 0..entries.len() {
        if assigned[i] {
            continue;
        }

        let shared = candidate_prefixes(entries[i].name).find_map(|prefix| {
            let members: Vec<usize> = (0..entries.len())
                .filter(|&j| !assigned[j] && entries[j].name.starts_with(prefix))
                .collect();
            (members.len() >= 2).then_some((prefix, members))
        });

        match shared {
            Some((prefix, mut members)) => {
                for &j in &members {
                    assigned[j] = true;
                }
                members.sort_by(|&a, &b| {
                    entries[a]
                        .name
                        .cmp(entries[b].name)
                        .then_with(|| entries[a].id.cmp(entries[b].id))
                });
                groups.push(WorkloadGroup {
                    prefix: prefix.to_string(),
                    members: members.iter().map(|&j| entries[j].id.to_string()).collect(),
                    expanded: prior.get(prefix).copied().unwrap_or(false),
                });
            }
            None => {
                assigned[i] = true;
                groups.push(WorkloadGroup {
                    prefix: entries[i].name.to_string(),
                    members: vec![entries[i].id.to_string()],
                    expanded: true,
                });
            }
        }
    }

    groups.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.members.cmp(&b.members)));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&'static str]) -> Vec<(&'static str, &'static str)> {
        names.iter().map(|&n| (n, n)).collect()
    }

    fn summary(groups: &[WorkloadGroup]) -> Vec<(String, usize)> {
        groups
            .iter()
            .map(|g| (g.prefix.clone(), g.members.len()))
            .collect()
    }

    #[test]
    fn siblings_share_the_longest_prefix() {
        let groups = group_workloads(&named(&["svc-a-1", "svc-a-2", "svc-b-1"]), &[]);
        assert_eq!(
            summary(&groups),
            vec![("svc-a".to_string(), 2), ("svc-b-1".to_string(), 1)]
        );
        assert!(!groups[0].expanded);
        assert!(groups[1].expanded);
    }

    #[test]
    fn shorter_prefix_used_when_longer_has_no_sibling() {
        let groups = group_workloads(&named(&["api-web-1", "api-worker-1"]), &[]);
        assert_eq!(summary(&groups), vec![("api".to_string(), 2)]);
    }

    #[test]
    fn names_without_delimiter_are_singletons() {
        let groups = group_workloads(&named(&["redis", "postgres"]), &[]);
        assert_eq!(
            summary(&groups),
            vec![("postgres".to_string(), 1), ("redis".to_string(), 1)]
        );
    }

    #[test]
    fn sibling_only_needs_to_start_with_the_prefix() {
        let groups = group_workloads(&named(&["app-1", "apple-1"]), &[]);
        assert_eq!(summary(&groups), vec![("app".to_string(), 2)]);
    }

    #[test]
    fn bare_prefix_name_joins_its_group() {
        let groups = group_workloads(&named(&["web", "web-1"]), &[]);
        assert_eq!(summary(&groups), vec![("web".to_string(), 2)]);
    }

    #[test]
    fn deeper_siblings_group_before_shallower_names() {
        let groups = group_workloads(&named(&["db", "db-replica-1", "db-replica-2"]), &[]);
        assert_eq!(
            summary(&groups),
            vec![("db".to_string(), 1), ("db-replica".to_string(), 2)]
        );
    }

    #[test]
    fn expanded_flag_carries_over_by_prefix() {
        let workloads = named(&["svc-a-1", "svc-a-2", "svc-b-1"]);
        let mut first = group_workloads(&workloads, &[]);
        first[0].expanded = true;

        let second = group_workloads(&workloads, &first);
        assert_eq!(second, first);

        let third = group_workloads(&workloads, &second);
        assert!(third[0].expanded);
    }

    #[test]
    fn singleton_flags_do_not_leak_into_new_groups() {
        let before = group_workloads(&named(&["web-1"]), &[]);
        assert!(before[0].expanded);
        let after = group_workloads(&named(&["web-1", "web-2"]), &before);
        assert_eq!(after[0].prefix, "web");
        assert!(!after[0].expanded);
    }

    #[test]
    fn grouping_ignores_input_order() {
        let a = group_workloads(&named(&["x-1", "y-2", "x-2", "y-1", "z"]), &[]);
        let b = group_workloads(&named(&["z", "y-1", "x-2", "y-2", "x-1"]), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn members_are_ids_ordered_by_name() {
        let workloads = [("id-b", "job-b"), ("id-a", "job-a")];
        let groups = group_workloads(&workloads, &[]);
        assert_eq!(groups[0].members, vec!["id-a", "id-b"]);
        assert!(groups[0].contains("id-b"));
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_workloads(&[], &[]).is_empty());
    }
}
