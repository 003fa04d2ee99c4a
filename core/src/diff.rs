//! Aligning new child descriptors against existing records.
//!
//! The differ is pure: it sees `(key, tag)` pairs for both sides and decides, per
//! new entry, whether an old record is reused, copied or replaced by a new one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::warn;

use crate::config::DuplicateKeys;
use crate::element::Key;
use crate::error::RenderError;

/// Tag identity used for matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TagId {
    Host(Rc<str>),
    Text,
    Raw,
    Component(usize),
    Copy,
}

/// Decision for one new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Reuse(usize),
    Create,
    /// Keep the old entry untouched, or render nothing when there is none.
    Copy(Option<usize>),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Alignment {
    pub(crate) slots: Vec<Slot>,
    /// Old entries no new entry claimed, in order.
    pub(crate) removed: Vec<usize>,
}

/// Rejects repeated keys, or with [`DuplicateKeys::Warn`] strips them from every
/// repeat after the first.
pub(crate) fn check_keys(keys: &mut [Option<Key>], policy: DuplicateKeys) -> Result<(), RenderError> {
    let mut seen = HashSet::new();
    for slot in keys {
        let Some(key) = slot else { continue };
        if seen.insert(key.clone()) {
            continue;
        }
        match policy {
            DuplicateKeys::Error => return Err(RenderError::DuplicateKey { key: key.clone() }),
            DuplicateKeys::Warn => {
                warn!(%key, "duplicate key among siblings; treating repeat as unkeyed");
                *slot = None;
            }
        }
    }
    Ok(())
}

/// Aligns `new` against `old`. Keys in `new` must be unique.
pub(crate) fn align(old: &[(Option<Key>, TagId)], new: &[(Option<Key>, TagId)]) -> Alignment {
    let mut claimed = vec![false; old.len()];
    let mut slots = vec![Slot::Create; new.len()];

    let keyed: HashMap<&Key, usize> = old
        .iter()
        .enumerate()
        .filter_map(|(index, (key, _))| key.as_ref().map(|key| (key, index)))
        .collect();

    for (index, (key, tag)) in new.iter().enumerate() {
        let Some(key) = key else { continue };
        let found = keyed.get(key).copied().filter(|&old_index| !claimed[old_index]);
        slots[index] = match (tag, found) {
            (TagId::Copy, found) => {
                if let Some(old_index) = found {
                    claimed[old_index] = true;
                }
                Slot::Copy(found)
            }
            (tag, Some(old_index)) if old[old_index].1 == *tag => {
                claimed[old_index] = true;
                Slot::Reuse(old_index)
            }
            _ => Slot::Create,
        };
    }

    for (index, (key, tag)) in new.iter().enumerate() {
        if key.is_none() && *tag == TagId::Copy {
            let same = old
                .get(index)
                .filter(|(old_key, _)| old_key.is_none())
                .map(|_| index)
                .filter(|&old_index| !claimed[old_index]);
            if let Some(old_index) = same {
                claimed[old_index] = true;
            }
            slots[index] = Slot::Copy(same);
        }
    }

    let mut unkeyed: HashMap<&TagId, VecDeque<usize>> = HashMap::new();
    for (index, (key, tag)) in old.iter().enumerate() {
        if key.is_none() && !claimed[index] {
            unkeyed.entry(tag).or_default().push_back(index);
        }
    }
    for (index, (key, tag)) in new.iter().enumerate() {
        if key.is_some() || *tag == TagId::Copy {
            continue;
        }
        let Some(queue) = unkeyed.get_mut(tag) else { continue };
        while let Some(old_index) = queue.pop_front() {
            if !claimed[old_index] {
                claimed[old_index] = true;
                slots[index] = Slot::Reuse(old_index);
                break;
            }
        }
    }

    let removed = claimed
        .iter()
        .enumerate()
        .filter_map(|(index, claimed)| (!claimed).then_some(index))
        .collect();
    Alignment { slots, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> TagId {
        TagId::Host(Rc::from(name))
    }

    fn unkeyed(tags: &[TagId]) -> Vec<(Option<Key>, TagId)> {
        tags.iter().cloned().map(|tag| (None, tag)).collect()
    }

    fn keyed(entries: &[(&str, TagId)]) -> Vec<(Option<Key>, TagId)> {
        entries
            .iter()
            .map(|(key, tag)| (Some(Key::from(*key)), tag.clone()))
            .collect()
    }

    #[test]
    fn positional_matching_by_tag() {
        let old = unkeyed(&[host("div"), TagId::Text, host("span")]);
        let new = unkeyed(&[host("span"), host("div"), TagId::Text]);
        let alignment = align(&old, &new);
        assert_eq!(
            alignment.slots,
            vec![Slot::Reuse(2), Slot::Reuse(0), Slot::Reuse(1)]
        );
        assert!(alignment.removed.is_empty());
    }

    #[test]
    fn text_and_element_do_not_match() {
        let old = unkeyed(&[TagId::Text]);
        let new = unkeyed(&[host("span")]);
        let alignment = align(&old, &new);
        assert_eq!(alignment.slots, vec![Slot::Create]);
        assert_eq!(alignment.removed, vec![0]);
    }

    #[test]
    fn keys_survive_reordering() {
        let old = keyed(&[("a", host("li")), ("b", host("li")), ("c", host("li"))]);
        let new = keyed(&[("c", host("li")), ("a", host("li")), ("d", host("li"))]);
        let alignment = align(&old, &new);
        assert_eq!(
            alignment.slots,
            vec![Slot::Reuse(2), Slot::Reuse(0), Slot::Create]
        );
        assert_eq!(alignment.removed, vec![1]);
    }

    #[test]
    fn keyed_tag_change_replaces() {
        let old = keyed(&[("a", host("li"))]);
        let new = keyed(&[("a", host("p"))]);
        let alignment = align(&old, &new);
        assert_eq!(alignment.slots, vec![Slot::Create]);
        assert_eq!(alignment.removed, vec![0]);
    }

    #[test]
    fn keyed_and_unkeyed_never_match() {
        let old = keyed(&[("a", host("li"))]);
        let new = unkeyed(&[host("li")]);
        let alignment = align(&old, &new);
        assert_eq!(alignment.slots, vec![Slot::Create]);
        assert_eq!(alignment.removed, vec![0]);
    }

    #[test]
    fn copy_claims_same_position() {
        let old = unkeyed(&[host("div"), host("span")]);
        let new = unkeyed(&[host("div"), TagId::Copy, TagId::Copy]);
        let alignment = align(&old, &new);
        assert_eq!(
            alignment.slots,
            vec![Slot::Reuse(0), Slot::Copy(Some(1)), Slot::Copy(None)]
        );
        assert!(alignment.removed.is_empty());
    }

    #[test]
    fn keyed_copy_claims_by_key() {
        let old = keyed(&[("a", host("div")), ("b", host("span"))]);
        let new = keyed(&[("b", TagId::Copy), ("z", TagId::Copy)]);
        let alignment = align(&old, &new);
        assert_eq!(alignment.slots, vec![Slot::Copy(Some(1)), Slot::Copy(None)]);
        assert_eq!(alignment.removed, vec![0]);
    }

    #[test]
    fn duplicate_keys_error_or_warn() {
        let mut keys = vec![Some(Key::from("a")), None, Some(Key::from("a"))];
        let error = check_keys(&mut keys.clone(), DuplicateKeys::Error).unwrap_err();
        assert!(matches!(error, RenderError::DuplicateKey { key } if key == Key::from("a")));

        check_keys(&mut keys, DuplicateKeys::Warn).unwrap();
        assert_eq!(keys, vec![Some(Key::from("a")), None, None]);
    }

    #[test]
    fn component_identity_matters() {
        let old = unkeyed(&[TagId::Component(1)]);
        let new = unkeyed(&[TagId::Component(2)]);
        let alignment = align(&old, &new);
        assert_eq!(alignment.slots, vec![Slot::Create]);
        assert_eq!(alignment.removed, vec![0]);
    }
}
