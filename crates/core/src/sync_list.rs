use std::rc::Rc;

use crate::entity::{Entity, EntityRef};
use crate::error::CoreError;

/// One recorded edit of a table section.
#[derive(Clone)]
pub enum SyncCommand {
    Insert { index: usize, item: EntityRef },
    Delete { index: usize },
    Move { from: usize, delta: isize },
    Update { index: usize, item: EntityRef },
}

impl PartialEq for SyncCommand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Insert { index: a, item: x }, Self::Insert { index: b, item: y })
            | (Self::Update { index: a, item: x }, Self::Update { index: b, item: y }) => {
                a == b && Rc::ptr_eq(x, y)
            }
            (Self::Delete { index: a }, Self::Delete { index: b }) => a == b,
            (Self::Move { from: a, delta: x }, Self::Move { from: b, delta: y }) => {
                a == b && x == y
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert { index, .. } => write!(f, "Insert({index})"),
            Self::Delete { index } => write!(f, "Delete({index})"),
            Self::Move { from, delta } => write!(f, "Move({from}, {delta})"),
            Self::Update { index, .. } => write!(f, "Update({index})"),
        }
    }
}

/// An ordered entity collection that logs every edit so a table section can
/// be synchronized row by row instead of being rewritten.
#[derive(Clone, Default)]
pub struct SyncList {
    items: Vec<EntityRef>,
    commands: Vec<SyncCommand>,
}

impl PartialEq for SyncList {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self.items.iter().zip(&other.items).all(|(a, b)| Rc::ptr_eq(a, b))
            && self.commands == other.commands
    }
}

impl std::fmt::Debug for SyncList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncList")
            .field("len", &self.items.len())
            .field("commands", &self.commands)
            .finish()
    }
}

impl SyncList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking edits on top of rows that already exist remotely.
    pub fn from_items(items: Vec<EntityRef>) -> Self {
        Self {
            items,
            commands: Vec::new(),
        }
    }

    pub fn items(&self) -> &[EntityRef] {
        &self.items
    }

    pub fn commands(&self) -> &[SyncCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, index: usize, item: EntityRef) -> Result<(), CoreError> {
        if index > self.items.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, item.clone());
        self.commands.push(SyncCommand::Insert { index, item });
        Ok(())
    }

    pub fn push(&mut self, item: EntityRef) {
        let index = self.items.len();
        self.items.push(item.clone());
        self.commands.push(SyncCommand::Insert { index, item });
    }

    pub fn remove(&mut self, index: usize) -> Result<EntityRef, CoreError> {
        self.check_index(index)?;
        let item = self.items.remove(index);
        self.commands.push(SyncCommand::Delete { index });
        Ok(item)
    }

    /// Shift the row at `from` by `delta` positions.
    pub fn move_item(&mut self, from: usize, delta: isize) -> Result<(), CoreError> {
        self.check_index(from)?;
        let to = from as isize + delta;
        if to < 0 || to as usize >= self.items.len() {
            return Err(CoreError::IndexOutOfRange {
                index: to.max(0) as usize,
                len: self.items.len(),
            });
        }
        let item = self.items.remove(from);
        self.items.insert(to as usize, item);
        self.commands.push(SyncCommand::Move { from, delta });
        Ok(())
    }

    /// Record that the row at `index` was modified in place.
    pub fn update(&mut self, index: usize) -> Result<(), CoreError> {
        self.check_index(index)?;
        let item = self.items[index].clone();
        self.commands.push(SyncCommand::Update { index, item });
        Ok(())
    }

    /// Replace the row at `index`; the new item is written into the existing row.
    pub fn set(&mut self, index: usize, item: EntityRef) -> Result<(), CoreError> {
        self.check_index(index)?;
        self.items[index] = item.clone();
        self.commands.push(SyncCommand::Update { index, item });
        Ok(())
    }

    /// Log an `Update` for every dirty row that no pending command writes
    /// yet. Returns whether anything was added.
    pub fn record_dirty_rows(&mut self) -> bool {
        let mut added = false;
        for (index, item) in self.items.iter().enumerate() {
            let covered = self.commands.iter().any(|command| match command {
                SyncCommand::Insert { item: logged, .. } | SyncCommand::Update { item: logged, .. } => {
                    Rc::ptr_eq(logged, item)
                }
                _ => false,
            });
            if covered || !item.borrow().controller().is_dirty() {
                continue;
            }
            self.commands.push(SyncCommand::Update {
                index,
                item: item.clone(),
            });
            added = true;
        }
        added
    }

    /// Forget the recorded edits, keeping the current rows.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    fn check_index(&self, index: usize) -> Result<(), CoreError> {
        if index >= self.items.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::Note;
    use crate::entity::EntityKind;
    use crate::value::Value;

    #[test]
    fn commands_are_logged_in_order() {
        let a = Note::new_ref();
        let b = Note::new_ref();
        let mut list = SyncList::new();
        list.insert(0, a.clone()).unwrap();
        list.insert(1, b.clone()).unwrap();
        list.remove(0).unwrap();

        assert_eq!(list.len(), 1);
        assert!(Rc::ptr_eq(&list.items()[0], &b));
        assert_eq!(
            list.commands(),
            &[
                SyncCommand::Insert { index: 0, item: a },
                SyncCommand::Insert { index: 1, item: b },
                SyncCommand::Delete { index: 0 },
            ]
        );
    }

    #[test]
    fn move_shifts_rows() {
        let a = Note::new_ref();
        let b = Note::new_ref();
        let c = Note::new_ref();
        let mut list = SyncList::from_items(vec![a.clone(), b.clone(), c.clone()]);
        list.move_item(0, 2).unwrap();
        assert!(Rc::ptr_eq(&list.items()[0], &b));
        assert!(Rc::ptr_eq(&list.items()[2], &a));
        assert!(list.move_item(2, 1).is_err());
        assert!(list.move_item(0, -1).is_err());
        assert_eq!(list.commands().len(), 1);
    }

    #[test]
    fn dirty_rows_without_commands_get_updates() {
        let a = Note::new_ref();
        let b = Note::new_ref();
        let c = Note::new_ref();
        let mut list = SyncList::from_items(vec![a.clone(), b.clone()]);
        list.push(c.clone());
        for row in [&b, &c] {
            row.borrow_mut().set_field("Text", Value::from("edited")).unwrap();
        }

        assert!(list.record_dirty_rows());
        assert_eq!(
            list.commands(),
            &[
                SyncCommand::Insert { index: 2, item: c },
                SyncCommand::Update { index: 1, item: b },
            ]
        );
        assert!(!list.record_dirty_rows());
    }

    #[test]
    fn out_of_range_edits_are_rejected() {
        let mut list = SyncList::new();
        assert!(list.insert(1, Note::new_ref()).is_err());
        assert!(list.remove(0).is_err());
        assert!(list.update(0).is_err());
        assert!(list.commands().is_empty());
    }
}
