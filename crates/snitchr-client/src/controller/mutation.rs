use snitchr_types::models::Confession;

/// One optimistic change to the list, carrying enough state to undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert { index: usize, entry: Confession },
    Replace { before: Confession, after: Confession },
    Remove { index: usize, entry: Confession },
}

impl Mutation {
    pub fn id(&self) -> &str {
        match self {
            Mutation::Insert { entry, .. } | Mutation::Remove { entry, .. } => &entry.id,
            Mutation::Replace { after, .. } => &after.id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Replace { .. } => "replace",
            Mutation::Remove { .. } => "remove",
        }
    }

    /// Applies the change. Returns false, leaving `entries` untouched, when
    /// it no longer makes sense (id already present for an insert, absent
    /// for a replace or remove).
    pub fn apply(&self, entries: &mut Vec<Confession>) -> bool {
        match self {
            Mutation::Insert { index, entry } => insert_at(entries, *index, entry),
            Mutation::Replace { after, .. } => replace(entries, after),
            Mutation::Remove { entry, .. } => remove(entries, &entry.id),
        }
    }

    /// Undoes the change, with the same id-based guards as `apply`.
    pub fn revert(&self, entries: &mut Vec<Confession>) -> bool {
        match self {
            Mutation::Insert { entry, .. } => remove(entries, &entry.id),
            Mutation::Replace { before, .. } => replace(entries, before),
            Mutation::Remove { index, entry } => insert_at(entries, *index, entry),
        }
    }
}

fn position(entries: &[Confession], id: &str) -> Option<usize> {
    entries.iter().position(|c| c.id == id)
}

fn insert_at(entries: &mut Vec<Confession>, index: usize, entry: &Confession) -> bool {
    if position(entries, &entry.id).is_some() {
        return false;
    }
    entries.insert(index.min(entries.len()), entry.clone());
    true
}

fn replace(entries: &mut [Confession], entry: &Confession) -> bool {
    match position(entries, &entry.id) {
        Some(i) => {
            entries[i] = entry.clone();
            true
        }
        None => false,
    }
}

fn remove(entries: &mut Vec<Confession>, id: &str) -> bool {
    match position(entries, id) {
        Some(i) => {
            entries.remove(i);
            true
        }
        None => false,
    }
}
