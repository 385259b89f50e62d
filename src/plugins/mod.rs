//! # Plugin Protocol
//!
//! A plugin is a named bundle of behavior registered on a Context before
//! `prepare` runs. Its `init` receives the Context ahead of resolution and
//! may contribute options, attach hook handlers, replace the resolve/parse
//! functions, or annotate its own metadata. After `init` returns, the
//! plugin's [`PluginInfo`] is frozen: `is_ready` flips to `true` exactly
//! once and the info is only handed out by shared reference.

pub mod help;
pub mod logger;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::context::Context;
use crate::models::Value;

/// The initialization body of a plugin.
#[derive(Clone)]
pub struct PluginInit(Rc<dyn Fn(&mut Context) -> anyhow::Result<()>>);

impl PluginInit {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> anyhow::Result<()> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, context: &mut Context) -> anyhow::Result<()> {
        (self.0)(context)
    }
}

impl fmt::Debug for PluginInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PluginInit(..)")
    }
}

/// A plugin definition. Names must be unique per Context.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub meta: HashMap<String, Value>,
    pub init: Option<PluginInit>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            meta: HashMap::new(),
            init: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context) -> anyhow::Result<()> + 'static,
    {
        self.init = Some(PluginInit::new(f));
        self
    }
}

/// The frozen, observable side of a registered plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub meta: HashMap<String, Value>,
    /// `false` until `init` has completed; flips to `true` exactly once.
    pub is_ready: bool,
}

impl PluginInfo {
    pub(crate) fn from_plugin(plugin: &Plugin) -> Self {
        Self {
            name: plugin.name.clone(),
            version: plugin.version.clone(),
            description: plugin.description.clone(),
            meta: plugin.meta.clone(),
            is_ready: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::errors::CliError;
    use crate::models::{CommandModule, OptionDecl};
    use crate::system::client::ScriptedClient;
    use crate::system::loader::StaticLoader;

    fn context() -> Context {
        let loader = StaticLoader::new().module("noop", CommandModule::new(|_| Ok(())));
        Context::new(
            "noop",
            "commands",
            Rc::new(ScriptedClient::new()),
            Rc::new(loader),
        )
    }

    #[test]
    fn test_duplicate_plugin_names_are_rejected() {
        let mut context = context();
        context.register_plugin(Plugin::new("twice")).unwrap();
        let err = context.register_plugin(Plugin::new("twice")).unwrap_err();
        assert!(matches!(err, CliError::Plugin { .. }));
    }

    #[test]
    fn test_init_runs_exactly_once_and_freezes_info() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let plugin = Plugin::new("counter")
            .version("1.0.0")
            .init(move |_| {
                *counter.borrow_mut() += 1;
                Ok(())
            });

        let mut context = context();
        context.register_plugin(plugin).unwrap();
        assert!(!context.plugins()[0].is_ready);

        context.prepare().unwrap();
        assert!(context.plugins()[0].is_ready);
        assert_eq!(context.plugins()[0].version.as_deref(), Some("1.0.0"));

        // Preparing again must not re-run init.
        context.prepare().unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_init_can_contribute_options_merged_before_commands() {
        let plugin = Plugin::new("opts").init(|context| {
            context.add_option("verbose", OptionDecl::bool().alias("v"));
            Ok(())
        });

        let mut context = context();
        context.register_plugin(plugin).unwrap();
        context.prepare().unwrap();
        assert!(context.options().resolve("v").is_some());
    }

    #[test]
    fn test_meta_can_be_annotated_during_init_only() {
        let plugin = Plugin::new("meta")
            .meta("seeded", true)
            .init(|context| {
                context.annotate_plugin("meta", "computed", 42i64)?;
                Ok(())
            });

        let mut context = context();
        context.register_plugin(plugin).unwrap();
        context.prepare().unwrap();

        let info = &context.plugins()[0];
        assert_eq!(info.meta.get("seeded"), Some(&crate::models::Value::Bool(true)));
        assert_eq!(
            info.meta.get("computed"),
            Some(&crate::models::Value::Number(42.0))
        );
        // Frozen afterwards.
        assert!(context.annotate_plugin("meta", "late", "x").is_err());
    }

    #[test]
    fn test_failing_init_surfaces_as_plugin_error() {
        let plugin = Plugin::new("broken").init(|_| Err(anyhow::anyhow!("nope")));
        let mut context = context();
        context.register_plugin(plugin).unwrap();

        let err = context.prepare().unwrap_err();
        match err {
            CliError::Plugin { name, message } => {
                assert_eq!(name, "broken");
                assert!(message.contains("nope"));
            }
            other => panic!("expected plugin error, got {other}"),
        }
    }
}
