//! Pure helpers for bulk task submission: 100-item chunking with
//! shrink-on-`RequestBodyTooLarge`, and generic task-id renumbering on a
//! reused job (§4.2).

use std::collections::BTreeMap;

use cf_core::TaskNaming;

/// Default chunk size for a bulk task-add request (§4.2).
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Splits `tasks` (in stable key order) into chunks of at most `chunk_size`
/// entries each. Never yields an empty chunk, and always yields at least
/// one chunk (possibly empty) when `tasks` is empty.
pub fn chunk_tasks<T: Clone>(tasks: &BTreeMap<String, T>, chunk_size: usize) -> Vec<Vec<(String, T)>> {
    let chunk_size = chunk_size.max(1);
    let entries: Vec<(String, T)> = tasks.iter().map(|(id, task)| (id.clone(), task.clone())).collect();
    if entries.is_empty() {
        return Vec::new();
    }
    entries.chunks(chunk_size).map(<[(String, T)]>::to_vec).collect()
}

/// Halves `chunk_size`, flooring at 1 (§4.2 `RequestBodyTooLarge` response).
#[must_use]
pub const fn shrink_chunk_size(chunk_size: usize) -> usize {
    if chunk_size <= 1 { 1 } else { chunk_size / 2 }
}

/// Scans `existing_task_ids` (already filtered to `naming`'s prefix) for the
/// highest numeric suffix, and returns the next id in sequence
/// (§4.2 `regenerate_next_generic_task_id`).
#[must_use]
pub fn next_generic_task_id(naming: &TaskNaming, existing_task_ids: &[String]) -> String {
    let max = existing_task_ids
        .iter()
        .filter_map(|id| id.strip_prefix(naming.prefix.as_str()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max();
    naming.format(max.map_or(0, |value| value + 1))
}

/// Same as [`next_generic_task_id`] but for a job's designated merge task,
/// whose ids carry the `merge-<prefix>` prefix instead (§4.2).
#[must_use]
pub fn next_merge_task_id(naming: &TaskNaming, existing_task_ids: &[String]) -> String {
    let merge_prefix = naming.merge_prefix();
    let max = existing_task_ids
        .iter()
        .filter_map(|id| id.strip_prefix(merge_prefix.as_str()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max();
    format!("{merge_prefix}{:0width$}", max.map_or(0, |value| value + 1), width = naming.padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming() -> TaskNaming {
        TaskNaming {
            prefix: "task-".into(),
            padding: 5,
        }
    }

    #[test]
    fn chunk_tasks_splits_by_size() {
        let tasks: BTreeMap<String, i32> = (0..250).map(|i| (format!("task-{i:05}"), i)).collect();
        let chunks = chunk_tasks(&tasks, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn shrink_chunk_size_floors_at_one() {
        assert_eq!(shrink_chunk_size(100), 50);
        assert_eq!(shrink_chunk_size(1), 1);
    }

    #[test]
    fn next_generic_task_id_continues_from_max_suffix() {
        let existing = vec!["task-00001".to_string(), "task-00007".to_string(), "other".to_string()];
        assert_eq!(next_generic_task_id(&naming(), &existing), "task-00008");
    }

    #[test]
    fn next_generic_task_id_starts_at_zero_when_none_match() {
        assert_eq!(next_generic_task_id(&naming(), &[]), "task-00000");
    }

    #[test]
    fn next_merge_task_id_uses_merge_prefix() {
        let existing = vec!["merge-task-00002".to_string()];
        assert_eq!(next_merge_task_id(&naming(), &existing), "merge-task-00003");
    }
}
