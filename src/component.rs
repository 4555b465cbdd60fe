// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared identity for everything that lives inside a fragment.

use crate::args::{Arg, ArgList};
use crate::errors::{ArgError, ConfigError};

/// Id carried by components that have not joined a fragment yet.
pub const UNREGISTERED_ID: i64 = -1;

/// Name, owning fragment, numeric id, and arguments of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBase {
    name: String,
    fragment: Option<String>,
    id: i64,
    args: ArgList,
}

impl ComponentBase {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            args: ArgList::named(name.clone()),
            name,
            fragment: None,
            id: UNREGISTERED_ID,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the component; only allowed before registration.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), ConfigError> {
        if self.is_registered() {
            return Err(ConfigError::AlreadyRegistered {
                name: self.name.clone(),
            });
        }
        self.name = name.into();
        Ok(())
    }

    /// Id assigned by the owning fragment, or [`UNREGISTERED_ID`].
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn fragment_name(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.fragment.is_some()
    }

    pub fn args(&self) -> &ArgList {
        &self.args
    }

    pub fn add_arg(&mut self, arg: Arg) -> Result<(), ArgError> {
        self.args.add(arg)
    }

    pub fn add_args(&mut self, args: ArgList) {
        self.args.extend(args);
    }

    pub(crate) fn register(&mut self, fragment: &str, id: i64) {
        self.fragment = Some(fragment.to_string());
        self.id = id;
    }

    /// Fails unless the component belongs to a fragment.
    pub fn ensure_registered(&self) -> Result<(), ConfigError> {
        if self.is_registered() {
            Ok(())
        } else {
            Err(ConfigError::NotRegistered {
                name: self.name.clone(),
            })
        }
    }

    pub fn description(&self) -> String {
        let mut text = format!(
            "id: {}\nname: {}\nfragment: {}",
            self.id,
            self.name,
            self.fragment.as_deref().unwrap_or("~")
        );
        if !self.args.is_empty() {
            text.push_str("\nargs:\n");
            for line in self.args.description().lines() {
                text.push_str("  ");
                text.push_str(line);
                text.push('\n');
            }
        }
        text
    }
}

/// Common accessors for components built on [`ComponentBase`].
pub trait Component {
    fn base(&self) -> &ComponentBase;

    fn base_mut(&mut self) -> &mut ComponentBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn id(&self) -> i64 {
        self.base().id()
    }

    fn fragment_name(&self) -> Option<&str> {
        self.base().fragment_name()
    }

    fn args(&self) -> &ArgList {
        self.base().args()
    }

    fn add_arg(&mut self, arg: Arg) -> Result<(), ArgError> {
        self.base_mut().add_arg(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_component_defaults() {
        let base = ComponentBase::new("tx");
        assert_eq!(base.id(), UNREGISTERED_ID);
        assert_eq!(base.fragment_name(), None);
        assert_eq!(
            base.ensure_registered(),
            Err(ConfigError::NotRegistered {
                name: "tx".to_string()
            })
        );
    }

    #[test]
    fn test_rename_only_before_registration() {
        let mut base = ComponentBase::new("tx");
        base.rename("sender").unwrap();
        assert_eq!(base.name(), "sender");

        base.register("frag", 3);
        assert_eq!(base.id(), 3);
        assert_eq!(base.fragment_name(), Some("frag"));
        assert!(matches!(
            base.rename("other"),
            Err(ConfigError::AlreadyRegistered { .. })
        ));
        assert!(base.ensure_registered().is_ok());
    }

    #[test]
    fn test_description_includes_args() {
        let mut base = ComponentBase::new("rx");
        base.add_arg(Arg::new("count", 2i64)).unwrap();
        let text = base.description();
        assert!(text.contains("name: rx"));
        assert!(text.contains("id: -1"));
        assert!(text.contains("name: count"));
    }
}
