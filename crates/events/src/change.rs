use serde::{Deserialize, Serialize};

/// Tri-state field delta for batched update events.
///
/// A plain `Option` cannot distinguish "leave the field alone" from "set the
/// field to nothing", so update events carry one `Change` per optional
/// field:
///
/// - `Unchanged` — the field was not touched; replay leaves current state.
/// - `Changed(Some(v))` — the field was set to `v`; replay overwrites.
/// - `Changed(None)` — the field was cleared; replay overwrites with absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Change<T> {
    #[default]
    Unchanged,
    Changed(Option<T>),
}

impl<T> Change<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Change::Changed(_))
    }

    /// The new value, if this delta touches the field.
    pub fn changed(&self) -> Option<&Option<T>> {
        match self {
            Change::Unchanged => None,
            Change::Changed(value) => Some(value),
        }
    }

    /// Overwrite `target` iff this delta touches the field.
    pub fn apply_to(&self, target: &mut Option<T>)
    where
        T: Clone,
    {
        if let Change::Changed(value) = self {
            target.clone_from(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_leaves_target_alone() {
        let mut target = Some(1);
        Change::<i32>::Unchanged.apply_to(&mut target);
        assert_eq!(target, Some(1));
    }

    #[test]
    fn changed_overwrites_target() {
        let mut target = Some(1);
        Change::Changed(Some(2)).apply_to(&mut target);
        assert_eq!(target, Some(2));
    }

    #[test]
    fn changed_none_clears_target() {
        let mut target = Some(1);
        Change::<i32>::Changed(None).apply_to(&mut target);
        assert_eq!(target, None);
    }

    #[test]
    fn serde_keeps_the_three_states_distinct() {
        let unchanged: Change<String> = Change::Unchanged;
        let cleared: Change<String> = Change::Changed(None);
        let set: Change<String> = Change::Changed(Some("v".into()));

        let json_unchanged = serde_json::to_string(&unchanged).unwrap();
        let json_cleared = serde_json::to_string(&cleared).unwrap();
        let json_set = serde_json::to_string(&set).unwrap();

        assert_ne!(json_unchanged, json_cleared);
        assert_ne!(json_cleared, json_set);

        assert_eq!(serde_json::from_str::<Change<String>>(&json_unchanged).unwrap(), unchanged);
        assert_eq!(serde_json::from_str::<Change<String>>(&json_cleared).unwrap(), cleared);
        assert_eq!(serde_json::from_str::<Change<String>>(&json_set).unwrap(), set);
    }
}
