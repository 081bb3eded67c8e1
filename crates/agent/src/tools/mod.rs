use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use chatrelay_core::domain::schema::{ParameterSchema, ToolArgs};
use chatrelay_core::domain::tool::ToolDescriptor;

pub mod image;

pub use image::{ImageGenerationResult, ImageGenerationTool, IMAGE_TOOL_NAME};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> ParameterSchema;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters())
    }

    /// Arguments have already been validated against `parameters()`.
    async fn execute(&self, args: &ToolArgs) -> Result<Value>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolLookupError {
    #[error("tool `{0}` not found")]
    NotFound(String),
}

#[derive(Clone)]
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn tool(&self) -> Arc<dyn Tool> {
        self.tool.clone()
    }
}

/// Tools the completion service may call, in registration order.
///
/// Built once at startup and shared behind an `Arc` afterwards.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T) -> Option<ToolDescriptor>
    where
        T: Tool + 'static,
    {
        let descriptor = tool.descriptor();
        self.register_entry(descriptor, Arc::new(tool))
    }

    /// Last write wins. A replaced entry keeps its original position and the
    /// previous descriptor is returned.
    pub fn register_entry(
        &mut self,
        descriptor: ToolDescriptor,
        tool: Arc<dyn Tool>,
    ) -> Option<ToolDescriptor> {
        let entry = RegisteredTool { descriptor, tool };
        match self.index.get(&entry.descriptor.name) {
            Some(&position) => {
                let previous = std::mem::replace(&mut self.entries[position], entry);
                Some(previous.descriptor)
            }
            None => {
                self.index.insert(entry.descriptor.name.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, ToolLookupError> {
        self.index
            .get(name)
            .and_then(|&position| self.entries.get(position))
            .ok_or_else(|| ToolLookupError::NotFound(name.to_string()))
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|entry| entry.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use chatrelay_core::domain::schema::{ParameterSchema, ToolArgs};
    use chatrelay_core::domain::tool::ToolDescriptor;

    use super::{Tool, ToolLookupError, ToolRegistry};

    struct EchoTool {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Echo a fixed reply"
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::object()
        }

        async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
            Ok(json!(self.reply))
        }
    }

    #[test]
    fn descriptors_follow_registration_order() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool { name: "b_tool", reply: "b" });
        registry.register(EchoTool { name: "a_tool", reply: "a" });

        let names: Vec<String> =
            registry.descriptors().into_iter().map(|descriptor| descriptor.name).collect();
        assert_eq!(names, vec!["b_tool".to_string(), "a_tool".to_string()]);
    }

    #[tokio::test]
    async fn re_registration_replaces_in_place() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool { name: "first", reply: "old" });
        registry.register(EchoTool { name: "second", reply: "2" });

        let replaced = registry.register_entry(
            ToolDescriptor::new("first", "Newer description", ParameterSchema::object()),
            Arc::new(EchoTool { name: "first", reply: "new" }),
        );

        assert_eq!(replaced.map(|descriptor| descriptor.description), Some("Echo a fixed reply".to_string()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.descriptors()[0].description, "Newer description");

        let entry = registry.lookup("first").expect("registered");
        let output = entry.tool().execute(&ToolArgs::default()).await.expect("execute");
        assert_eq!(output, json!("new"));
    }

    #[test]
    fn unknown_tool_lookup_is_not_found() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(
            registry.lookup("missing").err(),
            Some(ToolLookupError::NotFound("missing".to_string()))
        );
    }
}
