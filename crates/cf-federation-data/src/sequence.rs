//! Sequence-id packing across the 15 `Sequence<N>` string properties, and
//! the bounded-append contract for `UniqueIds`/`AdditionTimestamps` (§4.3).

use serde_json::{Map, Value};

/// Number of `Sequence<N>` string properties on a sequence entity.
pub const MAX_SEQUENCE_ID_PROPERTIES: usize = 15;

/// Maximum ids packed into a single `Sequence<N>` property before it spills
/// into the next.
pub const MAX_SEQUENCE_IDS_PER_PROPERTY: usize = 975;

/// Service string-property length limit; `UniqueIds`/`AdditionTimestamps`
/// are truncated once concatenation would exceed it.
pub const MAX_STR_ENTITY_PROPERTY_LENGTH: usize = 32174;

/// Entries kept in `UniqueIds`/`AdditionTimestamps` once truncation triggers.
pub const TRUNCATED_ENTRY_COUNT: usize = 32;

fn sequence_property(index: usize) -> String {
    format!("Sequence{index}")
}

/// Unpacks every `Sequence<N>` property (in order) into one flat id list.
#[must_use]
pub fn unpack_sequence(properties: &Map<String, Value>) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..MAX_SEQUENCE_ID_PROPERTIES {
        if let Some(Value::String(packed)) = properties.get(&sequence_property(i)) {
            if !packed.is_empty() {
                ids.extend(packed.split(',').map(str::to_string));
            }
        }
    }
    ids
}

/// Returns the head of the sequence (`Sequence0`'s first id), if any (§4.3
/// `get_first_sequence_id_for_job`).
#[must_use]
pub fn first_sequence_id(properties: &Map<String, Value>) -> Option<String> {
    unpack_sequence(properties).into_iter().next()
}

/// Re-packs `ids` across the 15 `Sequence<N>` properties, 975 per property.
/// Properties beyond what's needed are set to `Value::Null`.
pub fn pack_sequence(properties: &mut Map<String, Value>, ids: &[String]) {
    for i in 0..MAX_SEQUENCE_ID_PROPERTIES {
        let start = i * MAX_SEQUENCE_IDS_PER_PROPERTY;
        let end = (start + MAX_SEQUENCE_IDS_PER_PROPERTY).min(ids.len());
        let value = if start < end {
            Value::String(ids[start..end].join(","))
        } else {
            Value::Null
        };
        properties.insert(sequence_property(i), value);
    }
}

/// Pops the head id off the packed sequence and repacks the remainder,
/// mutating `properties` in place. Returns `true` when the sequence is now
/// empty (§4.3 `pop_and_pack_sequence_ids_for_job`).
#[must_use]
pub fn pop_and_pack(properties: &mut Map<String, Value>) -> bool {
    let mut ids = unpack_sequence(properties);
    if !ids.is_empty() {
        ids.remove(0);
    }
    let empty = ids.is_empty();
    pack_sequence(properties, &ids);
    empty
}

/// Appends `entry` to a comma-joined string property, truncating to the
/// last [`TRUNCATED_ENTRY_COUNT`] entries once the joined length would
/// exceed [`MAX_STR_ENTITY_PROPERTY_LENGTH`] (§4.3).
#[must_use]
pub fn append_bounded(existing: Option<&str>, entry: &str) -> String {
    let mut joined = match existing {
        Some(value) if !value.is_empty() => format!("{value},{entry}"),
        _ => entry.to_string(),
    };
    if joined.len() > MAX_STR_ENTITY_PROPERTY_LENGTH {
        let entries: Vec<&str> = joined.split(',').collect();
        let kept = &entries[entries.len().saturating_sub(TRUNCATED_ENTRY_COUNT)..];
        joined = kept.join(",");
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[test]
    fn first_sequence_id_reads_head_of_sequence0() {
        let properties = props(&[("Sequence0", "a,b,c")]);
        assert_eq!(first_sequence_id(&properties).as_deref(), Some("a"));
    }

    #[test]
    fn pop_and_pack_removes_head_and_reports_emptiness() {
        let mut properties = props(&[("Sequence0", "a")]);
        assert!(pop_and_pack(&mut properties));
        assert_eq!(properties.get("Sequence0"), Some(&Value::Null));

        let mut properties = props(&[("Sequence0", "a,b")]);
        assert!(!pop_and_pack(&mut properties));
        assert_eq!(
            properties.get("Sequence0"),
            Some(&Value::String("b".to_string()))
        );
    }

    #[test]
    fn pack_sequence_spills_past_975_entries() {
        let ids: Vec<String> = (0..1000).map(|i| i.to_string()).collect();
        let mut properties = Map::new();
        pack_sequence(&mut properties, &ids);
        let first = properties["Sequence0"].as_str().unwrap();
        let second = properties["Sequence1"].as_str().unwrap();
        assert_eq!(first.split(',').count(), MAX_SEQUENCE_IDS_PER_PROPERTY);
        assert_eq!(second.split(',').count(), 25);
    }

    #[test]
    fn append_bounded_truncates_to_last_32_entries_past_length_limit() {
        let mut joined = String::new();
        for i in 0..200 {
            joined = append_bounded(Some(&joined), &format!("entry-{i:04}"));
        }
        let entries: Vec<&str> = joined.split(',').collect();
        assert_eq!(entries.len(), TRUNCATED_ENTRY_COUNT);
        assert_eq!(entries.last(), Some(&"entry-0199"));
    }
}
