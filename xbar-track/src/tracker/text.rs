// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::tracker::{EntityManager, Track};
use crate::{Id, SharedWriter, Writer};

/// Writes one human-readable line per event.
///
/// Lines start with the current tick and name entities by their full name,
/// for example `@120 INFO top::switch: admit ...`. Cells are shown by id.
pub struct TextTracker {
    entity_manager: EntityManager,
    names: RefCell<HashMap<Id, String>>,
    writer: SharedWriter,
}

impl TextTracker {
    /// Create a new [`TextTracker`] writing to `writer`.
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            names: RefCell::new(HashMap::new()),
            writer: Rc::new(RefCell::new(writer)),
        }
    }

    fn write_line(&self, id: Id, line: fmt::Arguments) {
        let tick = self.entity_manager.tick();
        let names = self.names.borrow();
        let mut writer = self.writer.borrow_mut();
        // A closed pipe must not stop the simulation
        let _ = match names.get(&id) {
            Some(name) => writeln!(writer, "@{tick} {name}{line}"),
            None => writeln!(writer, "@{tick} #{id}{line}"),
        };
    }
}

impl Track for TextTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_log_enabled_at_level(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
        self.names.borrow_mut().insert(id, entity_name.to_string());
    }

    fn enter(&self, id: Id, object: Id) {
        self.write_line(id, format_args!(": cell {object} enters"));
    }

    fn exit(&self, id: Id, object: Id) {
        self.write_line(id, format_args!(": cell {object} leaves"));
    }

    fn value(&self, id: Id, value: f64) {
        self.write_line(id, format_args!(" = {value}"));
    }

    fn create(&self, _created_by: Id, id: Id, _name: &str) {
        self.write_line(id, format_args!(": created"));
    }

    fn destroy(&self, _destroyed_by: Id, id: Id) {
        self.write_line(id, format_args!(": destroyed"));
        self.names.borrow_mut().remove(&id);
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.write_line(id, format_args!(" {level}: {msg}"));
    }

    fn tick(&self, _set_by: Id, tick: u64) {
        self.entity_manager.set_tick(tick);
    }

    fn shutdown(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::entity::{Entity, toplevel};
    use crate::{Tracker, info};

    /// A writer whose output the test can read back.
    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lines_name_entities() {
        let output = Shared::default();
        let tracker: Tracker = Rc::new(TextTracker::new(
            EntityManager::new(log::Level::Trace),
            Box::new(output.clone()),
        ));
        let top = toplevel(&tracker, "top");
        let switch = Entity::new(&top, "switch");
        tracker.tick(top.id, 7);
        info!(switch ; "admit {} cells", 2);
        tracker.exit(switch.id, Id(99));
        drop(switch);

        let text = String::from_utf8(output.0.borrow().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "@0 top: created",
                "@0 top::switch: created",
                "@7 top::switch INFO: admit 2 cells",
                "@7 top::switch: cell 99 leaves",
                "@7 top::switch: destroyed",
            ]
        );
    }
}
