//! Argument position resolver
//!
//! A stored row keeps the indexed arguments first and the data arguments
//! after them, each run in declared order. The slot of an argument is its
//! position in that flattened sequence.

use super::schema::EventSchema;

impl EventSchema {
    /// Physical slot of the argument called `name`, `None` when the schema
    /// has no such argument.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        let arguments = self.arguments();
        let declared = arguments.iter().position(|arg| arg.name == name)?;

        if arguments[declared].indexed {
            let data_before = arguments[..declared]
                .iter()
                .filter(|arg| !arg.indexed)
                .count();
            Some(declared - data_before)
        } else {
            let data_rank = arguments
                .iter()
                .filter(|arg| !arg.indexed)
                .position(|arg| arg.name == name)?;
            Some(self.indexed_count() + data_rank)
        }
    }

    /// Inverse of [`EventSchema::slot_of`].
    pub fn argument_at(&self, slot: usize) -> Option<&str> {
        let indexed = self.indexed_count();
        let (want_indexed, rank) = if slot < indexed {
            (true, slot)
        } else {
            (false, slot - indexed)
        };
        self.arguments()
            .iter()
            .filter(|arg| arg.indexed == want_indexed)
            .nth(rank)
            .map(|arg| arg.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::query::schema::{EventArgument, EventSchema};

    fn interleaved() -> EventSchema {
        EventSchema::new(
            "Mixed",
            "0x01",
            vec![
                EventArgument::data("a"),
                EventArgument::indexed("b"),
                EventArgument::data("c"),
                EventArgument::indexed("d"),
                EventArgument::indexed("e"),
                EventArgument::data("f"),
            ],
        )
    }

    #[test]
    fn test_transfer_slots() {
        let schema = EventSchema::transfer();
        assert_eq!(schema.slot_of("from"), Some(0));
        assert_eq!(schema.slot_of("to"), Some(1));
        assert_eq!(schema.slot_of("value"), Some(2));
        assert_eq!(schema.slot_of("spender"), None);
    }

    #[test]
    fn test_interleaved_slots_keep_runs_contiguous() {
        let schema = interleaved();
        // indexed run: b, d, e
        assert_eq!(schema.slot_of("b"), Some(0));
        assert_eq!(schema.slot_of("d"), Some(1));
        assert_eq!(schema.slot_of("e"), Some(2));
        // data run: a, c, f
        assert_eq!(schema.slot_of("a"), Some(3));
        assert_eq!(schema.slot_of("c"), Some(4));
        assert_eq!(schema.slot_of("f"), Some(5));
    }

    #[test]
    fn test_slot_ranges_and_order() {
        let schema = interleaved();
        let k = schema.indexed_count();
        let m = schema.data_count();

        let mut last_indexed = None;
        let mut last_data = None;
        for arg in schema.arguments() {
            let slot = schema.slot_of(&arg.name).unwrap();
            if arg.indexed {
                assert!(slot < k);
                assert!(last_indexed.map_or(true, |prev| prev < slot));
                last_indexed = Some(slot);
            } else {
                assert!((k..k + m).contains(&slot));
                assert!(last_data.map_or(true, |prev| prev < slot));
                last_data = Some(slot);
            }
        }
    }

    #[test]
    fn test_argument_at_inverts_slot_of() {
        let schema = interleaved();
        for arg in schema.arguments() {
            let slot = schema.slot_of(&arg.name).unwrap();
            assert_eq!(schema.argument_at(slot), Some(arg.name.as_str()));
        }
        assert_eq!(schema.argument_at(6), None);
    }
}
