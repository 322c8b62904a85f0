//! Undo/redo command protocol
//!
//! A [`Command`] carries only the before and after values it needs, and is
//! applied and reverted against a target it does not own. [`CommandStack`]
//! is the linear history: executing a new command discards the redo branch.

use crate::annotation::{AnnotationId, BalloonAttributes, BalloonRecord, Placement};
use crate::registry::{AnnotationRegistry, RegistryError};
use std::collections::VecDeque;

/// Commands kept by default before the oldest is dropped.
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// A reversible mutation.
///
/// `revert` must restore every field `apply` touched.
pub trait Command {
    type Target;
    type Error;

    fn apply(&self, target: &mut Self::Target) -> Result<(), Self::Error>;
    fn revert(&self, target: &mut Self::Target) -> Result<(), Self::Error>;

    /// Human readable name for undo/redo menus.
    fn label(&self) -> String;
}

/// Bounded linear undo history.
#[derive(Debug, Clone)]
pub struct CommandStack<C> {
    undo: VecDeque<C>,
    redo: Vec<C>,
    limit: usize,
}

impl<C> Default for CommandStack<C> {
    fn default() -> Self {
        Self::with_limit(DEFAULT_UNDO_LIMIT)
    }
}

impl<C: Command> CommandStack<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `command` and record it. Nothing is recorded if it fails.
    pub fn execute(&mut self, command: C, target: &mut C::Target) -> Result<(), C::Error> {
        command.apply(target)?;
        self.push(command);
        Ok(())
    }

    /// Revert the latest command. Returns `false` when there is nothing to undo.
    ///
    /// A command whose revert fails stays on the undo stack.
    pub fn undo(&mut self, target: &mut C::Target) -> Result<bool, C::Error> {
        let Some(command) = self.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(error) = command.revert(target) {
            self.undo.push_back(command);
            return Err(error);
        }
        self.redo.push(command);
        Ok(true)
    }

    /// Re-apply the latest undone command. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self, target: &mut C::Target) -> Result<bool, C::Error> {
        let Some(command) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(error) = command.apply(target) {
            self.redo.push(command);
            return Err(error);
        }
        self.undo.push_back(command);
        Ok(true)
    }

    pub fn undo_label(&self) -> Option<String> {
        self.undo.back().map(|command| command.label())
    }

    pub fn redo_label(&self) -> Option<String> {
        self.redo.last().map(|command| command.label())
    }
}

impl<C> CommandStack<C> {
    pub fn with_limit(limit: usize) -> Self {
        Self { undo: VecDeque::new(), redo: Vec::new(), limit: limit.max(1) }
    }

    /// Record an already applied command.
    pub fn push(&mut self, command: C) {
        self.undo.push_back(command);
        self.redo.clear();
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

/// Every undoable balloon edit.
#[derive(Debug, Clone, PartialEq)]
pub enum BalloonCommand {
    Place(BalloonRecord),
    Delete(BalloonRecord),
    Move {
        id: AnnotationId,
        before: Placement,
        after: Placement,
    },
    /// Number, description, diameter, style or font size change
    Edit {
        id: AnnotationId,
        before: BalloonAttributes,
        after: BalloonAttributes,
    },
    Renumber {
        before: Vec<(AnnotationId, u32)>,
        after: Vec<(AnnotationId, u32)>,
    },
}

impl BalloonCommand {
    /// Snapshot a move of `record` to `after`.
    pub fn moved(record: &BalloonRecord, after: Placement) -> Self {
        BalloonCommand::Move { id: record.id(), before: record.placement(), after }
    }

    /// Snapshot an attribute edit of `record`.
    pub fn edited(record: &BalloonRecord, edit: impl FnOnce(&mut BalloonAttributes)) -> Self {
        let before = record.attributes();
        let mut after = before.clone();
        edit(&mut after);
        BalloonCommand::Edit { id: record.id(), before, after }
    }

    /// Snapshot renumbering the whole registry into reading order.
    pub fn renumber(registry: &AnnotationRegistry) -> Self {
        BalloonCommand::Renumber {
            before: registry.numbering(),
            after: registry.canonical_numbering(),
        }
    }

    /// True when applying the command would change nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            BalloonCommand::Place(_) | BalloonCommand::Delete(_) => false,
            BalloonCommand::Move { before, after, .. } => before == after,
            BalloonCommand::Edit { before, after, .. } => before == after,
            BalloonCommand::Renumber { before, after } => before == after,
        }
    }
}

fn set_placement(registry: &mut AnnotationRegistry, id: AnnotationId, placement: Placement) {
    registry.update(id, |record| {
        record.center_point = placement.center;
        record.target_point = placement.target;
    });
}

impl Command for BalloonCommand {
    type Target = AnnotationRegistry;
    type Error = RegistryError;

    fn apply(&self, registry: &mut AnnotationRegistry) -> Result<(), RegistryError> {
        match self {
            BalloonCommand::Place(record) => registry.add(record.clone())?,
            BalloonCommand::Delete(record) => {
                registry
                    .remove(record.id())
                    .ok_or(RegistryError::NotFound(record.id()))?;
            }
            BalloonCommand::Move { id, after, .. } => set_placement(registry, *id, *after),
            BalloonCommand::Edit { id, after, .. } => {
                registry.update(*id, |record| record.set_attributes(after));
            }
            BalloonCommand::Renumber { after, .. } => registry.assign_numbers(after),
        }
        Ok(())
    }

    fn revert(&self, registry: &mut AnnotationRegistry) -> Result<(), RegistryError> {
        match self {
            BalloonCommand::Place(record) => {
                registry
                    .remove(record.id())
                    .ok_or(RegistryError::NotFound(record.id()))?;
            }
            BalloonCommand::Delete(record) => registry.add(record.clone())?,
            BalloonCommand::Move { id, before, .. } => set_placement(registry, *id, *before),
            BalloonCommand::Edit { id, before, .. } => {
                registry.update(*id, |record| record.set_attributes(before));
            }
            BalloonCommand::Renumber { before, .. } => registry.assign_numbers(before),
        }
        Ok(())
    }

    fn label(&self) -> String {
        match self {
            BalloonCommand::Place(record) => format!("Place balloon #{}", record.number),
            BalloonCommand::Delete(record) => format!("Delete balloon #{}", record.number),
            BalloonCommand::Move { .. } => "Move balloon".to_string(),
            BalloonCommand::Edit { before, after, .. } => edit_label(before, after).to_string(),
            BalloonCommand::Renumber { .. } => "Renumber balloons".to_string(),
        }
    }
}

fn edit_label(before: &BalloonAttributes, after: &BalloonAttributes) -> &'static str {
    let mut differences = [
        (before.number != after.number, "Change balloon number"),
        (before.description != after.description, "Edit description"),
        (before.diameter != after.diameter, "Resize balloon"),
        (before.style != after.style, "Change balloon style"),
        (before.font_size_override != after.font_size_override, "Change label size"),
    ]
    .into_iter()
    .filter(|(differs, _)| *differs);

    match (differences.next(), differences.next()) {
        (Some((_, label)), None) => label,
        _ => "Edit balloon",
    }
}
