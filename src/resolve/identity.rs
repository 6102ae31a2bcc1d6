use std::collections::{BTreeMap, BTreeSet};

use crate::github::Identity;

/// Login to display name mapping for the authors in a report.
///
/// Logins without a display name map to themselves. The first insert of a
/// login wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    names: BTreeMap<String, String>,
}

impl IdentityMap {
    pub fn insert(&mut self, identity: Identity) {
        let name = identity
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| identity.login.clone());
        self.names.entry(identity.login).or_insert(name);
    }

    /// Display name for `login`, or `login` itself when it is not mapped.
    pub fn display_name<'a>(&'a self, login: &'a str) -> &'a str {
        self.names.get(login).map(String::as_str).unwrap_or(login)
    }

    /// Remove every login in `excluded`, returning how many were present.
    pub fn remove_all(&mut self, excluded: &BTreeSet<String>) -> usize {
        let before = self.names.len();
        self.names.retain(|login, _| !excluded.contains(login));
        before - self.names.len()
    }

    /// Logins in sorted order.
    pub fn logins(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Extend<Identity> for IdentityMap {
    fn extend<I: IntoIterator<Item = Identity>>(&mut self, iter: I) {
        for identity in iter {
            self.insert(identity);
        }
    }
}

impl FromIterator<Identity> for IdentityMap {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        let mut map = IdentityMap::default();
        map.extend(iter);
        map
    }
}
