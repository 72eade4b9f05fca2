// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Named simulation entities.
//!
//! The switch, its scheduler, the traffic generators and the input and output
//! policies each own an [`Entity`]. Entities form a tree rooted at the entity
//! returned by [`toplevel`]; an entity is known by the names on its path
//! joined with `::`, for example `top::traffic::gen3`.
//!
//! The full name is what tracker level filters match against, and what the
//! random streams of the models are derived from, so it must be stable
//! between runs.

use std::fmt;
use std::rc::Rc;

use crate::{Id, NO_ID, Tracker, create, destroy};

const SEPARATOR: &str = "::";

/// A node of the entity tree.
///
/// Logging macros take an entity so that each message carries its [`Id`] and
/// is filtered by the level configured for the entity.
pub struct Entity {
    /// Last component of the name.
    pub name: String,

    /// `None` only for the top-level entity.
    pub parent: Option<Rc<Entity>>,

    /// Identifies the entity in track events.
    pub id: Id,

    /// The [`Tracker`] shared by the whole tree.
    pub tracker: Tracker,

    full_name: String,
}

/// Access the [`Entity`] of a model.
pub trait GetEntity {
    /// The entity owned by this model.
    fn entity(&self) -> &Rc<Entity>;
}

impl Entity {
    fn register(parent: Option<&Rc<Entity>>, tracker: &Tracker, name: &str) -> Self {
        let full_name = match parent {
            Some(parent) => format!("{}{SEPARATOR}{name}", parent.full_name),
            None => name.to_string(),
        };
        let id = tracker.unique_id();
        tracker.add_entity(id, &full_name);
        Self {
            name: name.to_string(),
            parent: parent.cloned(),
            id,
            tracker: tracker.clone(),
            full_name,
        }
    }

    /// Create a child of `parent`.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Self::register(Some(parent), &parent.tracker, name);
        create!(entity);
        entity
    }

    /// The names from the top-level entity down to this one.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Id of the parent, or [`NO_ID`] for the top-level entity.
    #[must_use]
    pub fn parent_id(&self) -> Id {
        self.parent.as_ref().map_or(NO_ID, |parent| parent.id)
    }

    /// Number of ancestors.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("full_name", &self.full_name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Create the root of an entity tree.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    let top = Rc::new(Entity::register(None, tracker, name));
    create!(top);
    top
}
