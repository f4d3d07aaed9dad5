//! Asset-type registry: the selectable result categories and their flags.

use tracing::debug;

use crate::types::{AssetType, AssetTypeGroup};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetTypeRegistry {
    entries: Vec<AssetType>,
}

impl AssetTypeRegistry {
    /// Build from the `/asset-types` feed (or an injected static list),
    /// seeding `display` from `display_default`.
    pub fn from_feed(mut entries: Vec<AssetType>) -> Self {
        for at in &mut entries { at.display = at.display_default; }
        Self { entries }
    }

    /// Apply an explicit selection, e.g. from a shared link. An empty
    /// selection keeps the defaults.
    pub fn with_selection<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        if names.is_empty() { return self; }
        for at in &mut self.entries {
            at.display = names.iter().any(|n| n.as_ref() == at.name);
        }
        self
    }

    pub fn entries(&self) -> &[AssetType] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AssetType> {
        self.entries.iter().find(|at| at.name == name)
    }

    /// Flip the members of `group`, or every entry when `group` is `None`.
    ///
    /// The new state is the inverse of the first matching entry and is applied
    /// to all matches, so a mixed group converges instead of flipping per item.
    pub fn toggle_group(&mut self, group: Option<&str>) {
        let matches = |at: &AssetType| group.map_or(true, |g| at.group == g);
        let Some(behavior) = self.entries.iter().find(|at| matches(at)).map(|at| !at.display) else {
            return;
        };
        for at in self.entries.iter_mut().filter(|at| matches(at)) {
            at.display = behavior;
        }
        debug!(group = group.unwrap_or("<all>"), display = behavior, "toggled asset types");
    }

    /// Hide the first entry named `name`. Returns whether one was found.
    pub fn hide(&mut self, name: &str) -> bool {
        match self.entries.iter_mut().find(|at| at.name == name) {
            Some(at) => { at.display = false; true }
            None => false,
        }
    }

    /// Names of the displayed entries, in registry order.
    pub fn selected_names(&self) -> Vec<String> {
        self.entries.iter().filter(|at| at.display).map(|at| at.name.clone()).collect()
    }

    /// Group consecutive entries with the same `group`.
    ///
    /// Positional, not a sort: a group that reappears after another group
    /// produces a second entry. The feed is expected to arrive sorted.
    pub fn grouped_view(&self) -> Vec<AssetTypeGroup<'_>> {
        let mut groups: Vec<AssetTypeGroup<'_>> = Vec::new();
        for at in &self.entries {
            match groups.last_mut() {
                Some(last) if last.group == at.group => last.members.push(at),
                _ => groups.push(AssetTypeGroup {
                    group: &at.group,
                    group_sort_order: at.group_sort_order,
                    members: vec![at],
                }),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AssetTypeRegistry {
        AssetTypeRegistry::from_feed(vec![
            AssetType::new("blogs", "Written", true),
            AssetType::new("docs", "Written", false),
            AssetType::new("videos", "Media", true),
        ])
    }

    #[test]
    fn toggle_uses_first_member_state() {
        let mut r = registry();
        r.toggle_group(Some("Written"));
        assert_eq!(r.selected_names(), vec!["videos"]);
        r.toggle_group(Some("Written"));
        assert_eq!(r.selected_names(), vec!["blogs", "docs", "videos"]);
    }

    #[test]
    fn toggle_all_and_unknown_group() {
        let mut r = registry();
        r.toggle_group(None);
        assert!(r.selected_names().is_empty());
        let before = r.clone();
        r.toggle_group(Some("Nope"));
        assert_eq!(r, before);
    }

    #[test]
    fn selection_overrides_defaults() {
        let r = registry().with_selection(&["docs"]);
        assert_eq!(r.selected_names(), vec!["docs"]);
        let r = registry().with_selection::<&str>(&[]);
        assert_eq!(r.selected_names(), vec!["blogs", "videos"]);
    }

    #[test]
    fn unsorted_feed_splits_groups() {
        let r = AssetTypeRegistry::from_feed(vec![
            AssetType::new("a", "X", true),
            AssetType::new("b", "Y", true),
            AssetType::new("c", "X", true),
        ]);
        let groups: Vec<&str> = r.grouped_view().iter().map(|g| g.group).collect();
        assert_eq!(groups, vec!["X", "Y", "X"]);
    }
}
